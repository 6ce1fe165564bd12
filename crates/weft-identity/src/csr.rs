//! Certificate signing request generation and introspection.
//!
//! A [`SigningRequest`] is a PKCS#10 structure self-signed by the requesting
//! key pair to prove possession. Requests are generated locally by
//! [`crate::credential::Credential::create_request`] and reviewed by an
//! [`crate::authority::IssuingAuthority`] before signing; the transport in
//! between is external to this crate.

use crate::name::CommonName;
use crate::{Error, Result};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose,
};
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::prelude::FromDer;

/// A PEM-encoded PKCS#10 certificate signing request.
#[derive(Debug, Clone)]
pub struct SigningRequest {
    pem: String,
    common_name: String,
}

impl SigningRequest {
    /// Wraps a received PEM request, extracting its subject Common Name.
    pub fn from_pem(pem: impl Into<String>) -> Result<Self> {
        let pem = pem.into();
        let der = Self::pem_to_der(&pem)?;
        let (_, csr) = X509CertificationRequest::from_der(&der)
            .map_err(|e| Error::Certificate(format!("failed to parse request: {e}")))?;
        let common_name = csr
            .certification_request_info
            .subject
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::MalformedSubject {
                reason: "no common name attribute".to_string(),
            })?;
        Ok(Self { pem, common_name })
    }

    /// Generates a request for `common_name` signed by `key_pair`.
    ///
    /// The subject-alternative-name list is `[common_name] + extra_sans`.
    /// Authority roles request certificate-signing key usage; leaf roles
    /// request TLS client/server usage. Either way the issuing authority's
    /// policy table has the final say over what is granted.
    pub(crate) fn generate(
        key_pair: &KeyPair,
        common_name: &CommonName,
        extra_sans: &[String],
    ) -> Result<Self> {
        let mut sans = vec![common_name.as_str().to_string()];
        sans.extend(extra_sans.iter().cloned());

        let mut params = CertificateParams::new(sans)
            .map_err(|e| Error::Crypto(format!("failed to create request params: {e}")))?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name.as_str());
        params.distinguished_name = dn;

        // Basic-Constraints stay out of the request: the issuing authority's
        // policy table decides the CA flag, not the requester.
        if common_name.role().is_authority() {
            params.key_usages = vec![
                KeyUsagePurpose::KeyCertSign,
                KeyUsagePurpose::CrlSign,
                KeyUsagePurpose::DigitalSignature,
            ];
        } else {
            params.key_usages = vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
            ];
            params.extended_key_usages = vec![
                ExtendedKeyUsagePurpose::ServerAuth,
                ExtendedKeyUsagePurpose::ClientAuth,
            ];
        }

        let csr = params
            .serialize_request(key_pair)
            .map_err(|e| Error::Crypto(format!("request serialization failed: {e}")))?;
        let pem = csr
            .pem()
            .map_err(|e| Error::Crypto(format!("request PEM encoding failed: {e}")))?;

        Ok(Self {
            pem,
            common_name: common_name.as_str().to_string(),
        })
    }

    /// Returns the PEM-encoded request.
    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// Returns the DER-encoded request bytes.
    pub fn der(&self) -> Result<Vec<u8>> {
        Self::pem_to_der(&self.pem)
    }

    /// The subject Common Name the request claims.
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// Runs `f` over the parsed form of this request.
    pub(crate) fn with_parsed<T>(
        &self,
        f: impl FnOnce(&X509CertificationRequest<'_>) -> Result<T>,
    ) -> Result<T> {
        let der = self.der()?;
        let (_, csr) = X509CertificationRequest::from_der(&der)
            .map_err(|e| Error::Certificate(format!("failed to parse request: {e}")))?;
        f(&csr)
    }

    fn pem_to_der(pem_str: &str) -> Result<Vec<u8>> {
        let block = pem::parse(pem_str)
            .map_err(|e| Error::Certificate(format!("failed to parse request PEM: {e}")))?;
        if block.tag() != "CERTIFICATE REQUEST" {
            return Err(Error::Certificate(format!(
                "expected CERTIFICATE REQUEST PEM block, got {}",
                block.tag()
            )));
        }
        Ok(block.into_contents())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::EntityRole;
    use uuid::Uuid;

    fn account_name() -> CommonName {
        CommonName::encode(
            EntityRole::Account,
            Some(Uuid::new_v4()),
            None,
            "example.test",
        )
        .unwrap()
    }

    #[test]
    fn test_generate_and_reparse() {
        let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let cn = account_name();
        let request = SigningRequest::generate(&key, &cn, &[]).unwrap();

        assert!(request.pem().contains("BEGIN CERTIFICATE REQUEST"));
        assert_eq!(request.common_name(), cn.as_str());

        let reparsed = SigningRequest::from_pem(request.pem()).unwrap();
        assert_eq!(reparsed.common_name(), cn.as_str());
    }

    #[test]
    fn test_self_signature_verifies() {
        let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let request = SigningRequest::generate(&key, &account_name(), &[]).unwrap();
        request
            .with_parsed(|csr| {
                csr.verify_signature()
                    .map_err(|_| Error::InvalidRequestSignature)
            })
            .unwrap();
    }

    #[test]
    fn test_rejects_non_request_pem() {
        let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        assert!(matches!(
            SigningRequest::from_pem(key.serialize_pem()),
            Err(Error::Certificate(_))
        ));
    }

    #[test]
    fn test_distinct_keys_give_distinct_requests() {
        let cn = account_name();
        let k1 = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let k2 = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let r1 = SigningRequest::generate(&k1, &cn, &[]).unwrap();
        let r2 = SigningRequest::generate(&k2, &cn, &[]).unwrap();
        assert_ne!(r1.pem(), r2.pem());
    }
}
