//! X.509 certificate handling.
//!
//! Certificates are kept as DER bytes with a cached PEM rendering; all
//! inspection goes through `x509-parser`. Nothing here trusts the
//! certificate's content; trust decisions live in [`crate::chain`] and
//! [`crate::authority`].

use crate::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use x509_parser::prelude::{FromDer, GeneralName, ParsedExtension, X509Certificate};

/// An X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// DER-encoded certificate data.
    der: Vec<u8>,
    /// PEM representation (cached).
    pem: String,
}

impl Certificate {
    /// Creates a certificate from DER-encoded bytes.
    pub fn from_der(der: Vec<u8>) -> Self {
        let pem = pem::encode(&pem::Pem::new("CERTIFICATE", der.clone()));
        Self { der, pem }
    }

    /// Creates a certificate from PEM-encoded data.
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let parsed = pem::parse(pem_str)
            .map_err(|e| Error::Certificate(format!("failed to parse PEM: {e}")))?;
        if parsed.tag() != "CERTIFICATE" {
            return Err(Error::Certificate(format!(
                "expected CERTIFICATE PEM block, got {}",
                parsed.tag()
            )));
        }
        Ok(Self::from_der(parsed.into_contents()))
    }

    /// Returns the DER-encoded certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the PEM-encoded certificate.
    pub fn to_pem(&self) -> &str {
        &self.pem
    }

    /// Runs `f` over the parsed form of this certificate.
    pub(crate) fn with_parsed<T>(&self, f: impl FnOnce(&X509Certificate<'_>) -> Result<T>) -> Result<T> {
        let (_, cert) = X509Certificate::from_der(&self.der)
            .map_err(|e| Error::Certificate(format!("failed to parse certificate: {e}")))?;
        f(&cert)
    }

    /// Returns the subject Common Name attribute.
    pub fn subject_common_name(&self) -> Result<String> {
        self.with_parsed(|cert| {
            cert.subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_string)
                .ok_or_else(|| Error::Certificate("certificate has no common name".to_string()))
        })
    }

    /// Returns the issuer Common Name attribute.
    pub fn issuer_common_name(&self) -> Result<String> {
        self.with_parsed(|cert| {
            cert.issuer()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_string)
                .ok_or_else(|| Error::Certificate("certificate issuer has no common name".to_string()))
        })
    }

    /// Returns the subject-alternative DNS names.
    pub fn san_dns_names(&self) -> Result<Vec<String>> {
        self.with_parsed(|cert| {
            let mut names = Vec::new();
            for ext in cert.extensions() {
                if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
                    for name in &san.general_names {
                        if let GeneralName::DNSName(dns) = name {
                            names.push((*dns).to_string());
                        }
                    }
                }
            }
            Ok(names)
        })
    }

    /// Whether the Basic-Constraints extension marks this as a CA certificate.
    pub fn is_ca(&self) -> Result<bool> {
        self.with_parsed(|cert| Ok(cert.is_ca()))
    }

    /// The path-length constraint of the Basic-Constraints extension, if any.
    pub fn path_len_constraint(&self) -> Result<Option<u32>> {
        self.with_parsed(|cert| {
            for ext in cert.extensions() {
                if let ParsedExtension::BasicConstraints(bc) = ext.parsed_extension() {
                    return Ok(bc.path_len_constraint);
                }
            }
            Ok(None)
        })
    }

    /// Returns the certificate's not-before time.
    pub fn not_before(&self) -> Result<DateTime<Utc>> {
        self.with_parsed(|cert| {
            DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
                .ok_or_else(|| Error::Certificate("invalid not_before timestamp".to_string()))
        })
    }

    /// Returns the certificate's not-after (expiry) time.
    pub fn not_after(&self) -> Result<DateTime<Utc>> {
        self.with_parsed(|cert| {
            DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
                .ok_or_else(|| Error::Certificate("invalid not_after timestamp".to_string()))
        })
    }

    /// Whether `at` falls inside the certificate's validity window.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> Result<bool> {
        self.with_parsed(|cert| {
            let ts = at.timestamp();
            let v = cert.validity();
            Ok(v.not_before.timestamp() <= ts && ts <= v.not_after.timestamp())
        })
    }

    /// SHA-256 fingerprint of the DER encoding, `SHA256:<base64url>`.
    pub fn fingerprint(&self) -> String {
        let hash = Sha256::digest(&self.der);
        format!("SHA256:{}", URL_SAFE_NO_PAD.encode(hash))
    }

    /// One human-readable line describing this certificate, written above
    /// its PEM block in stored bundles.
    pub fn annotation(&self) -> String {
        let subject = self.subject_common_name().unwrap_or_else(|_| "?".to_string());
        let issuer = self.issuer_common_name().unwrap_or_else(|_| "?".to_string());
        let not_after = self
            .not_after()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|_| "?".to_string());
        format!("subject={subject} issuer={issuer} not-after={not_after}")
    }
}

/// Parses every CERTIFICATE block out of a PEM bundle, in order.
///
/// Text outside the PEM armor (such as the annotation lines written by
/// [`bundle_to_pem`]) is ignored.
pub fn parse_cert_bundle(pem_str: &str) -> Result<Vec<Certificate>> {
    let blocks = pem::parse_many(pem_str)
        .map_err(|e| Error::Certificate(format!("failed to parse PEM bundle: {e}")))?;
    let certs: Vec<Certificate> = blocks
        .into_iter()
        .filter(|b| b.tag() == "CERTIFICATE")
        .map(|b| Certificate::from_der(b.into_contents()))
        .collect();
    if certs.is_empty() {
        return Err(Error::Certificate("no certificates in PEM bundle".to_string()));
    }
    Ok(certs)
}

/// Renders a leaf certificate and its chain as one PEM bundle, each block
/// preceded by an annotation line.
pub fn bundle_to_pem(leaf: &Certificate, chain: &[Certificate]) -> String {
    let mut out = String::new();
    for cert in std::iter::once(leaf).chain(chain.iter()) {
        out.push_str(&cert.annotation());
        out.push('\n');
        out.push_str(cert.to_pem());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    fn self_signed(cn: &str) -> Certificate {
        let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let mut params = CertificateParams::new(vec![cn.to_string()]).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;
        let cert = params.self_signed(&key).unwrap();
        Certificate::from_der(cert.der().to_vec())
    }

    #[test]
    fn test_pem_der_roundtrip() {
        let cert = self_signed("ca.example.test");
        let reparsed = Certificate::from_pem(cert.to_pem()).unwrap();
        assert_eq!(cert.der(), reparsed.der());
    }

    #[test]
    fn test_subject_and_san() {
        let cert = self_signed("accounts-ca.example.test");
        assert_eq!(cert.subject_common_name().unwrap(), "accounts-ca.example.test");
        assert_eq!(cert.san_dns_names().unwrap(), vec!["accounts-ca.example.test"]);
    }

    #[test]
    fn test_rejects_non_certificate_pem() {
        let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        assert!(matches!(
            Certificate::from_pem(&key.serialize_pem()),
            Err(Error::Certificate(_))
        ));
    }

    #[test]
    fn test_bundle_roundtrip_ignores_annotations() {
        let a = self_signed("ca.example.test");
        let b = self_signed("accounts-ca.example.test");
        let bundle = bundle_to_pem(&a, std::slice::from_ref(&b));
        assert!(bundle.contains("subject=ca.example.test"));

        let parsed = parse_cert_bundle(&bundle).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], a);
        assert_eq!(parsed[1], b);
    }

    #[test]
    fn test_fingerprint_is_stable_and_distinct() {
        let a = self_signed("ca.example.test");
        let b = self_signed("ca.example.test");
        assert_eq!(a.fingerprint(), a.fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert!(a.fingerprint().starts_with("SHA256:"));
    }
}
