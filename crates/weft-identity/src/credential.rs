//! Credential lifecycle: key pair, certificate, and trust chain.
//!
//! A [`Credential`] is the secret an actor holds: a key pair, the
//! certificate naming it, and the non-root portion of its trust chain. It is
//! constructed empty and then either self-signed (network root only), turned
//! into a signing request and completed with the authority's response, or
//! loaded from the storage abstraction.
//!
//! Mutating operations take `&mut self`; a credential is single-writer by
//! construction and instances can be handed out per logical owner.

use crate::certificate::{bundle_to_pem, parse_cert_bundle, Certificate};
use crate::csr::SigningRequest;
use crate::keywrap;
use crate::name::CommonName;
use crate::role::EntityRole;
use crate::storage::Storage;
use crate::{Error, Result};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber,
};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

/// Advisory renewal thresholds, in days of remaining certificate lifetime.
///
/// Crossing `wanted` logs an "expires soon" advisory, crossing `needed` an
/// "expires very soon" one. Neither blocks any operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryThresholds {
    /// Remaining days below which renewal is wanted.
    pub wanted: i64,
    /// Remaining days below which renewal is needed.
    pub needed: i64,
}

impl ExpiryThresholds {
    /// Thresholds for authority credentials (six months / three months).
    pub fn authority() -> Self {
        Self {
            wanted: 180,
            needed: 90,
        }
    }
}

impl Default for ExpiryThresholds {
    fn default() -> Self {
        Self {
            wanted: 90,
            needed: 30,
        }
    }
}

/// Storage locations for a credential's certificate bundle and private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    /// Path of the PEM certificate bundle (leaf + non-root chain).
    pub certificate: String,
    /// Path of the PEM private key.
    pub private_key: String,
}

impl StorePaths {
    /// Conventional `ca/<label>.crt` / `ca/<label>.key` layout.
    pub fn for_label(label: &str) -> Self {
        Self {
            certificate: format!("ca/{label}.crt"),
            private_key: format!("ca/{label}.key"),
        }
    }
}

/// A key pair, its certificate, and the non-root portion of its trust chain.
pub struct Credential {
    common_name: CommonName,
    paths: StorePaths,
    thresholds: ExpiryThresholds,
    key: Option<KeyPair>,
    certificate: Option<Certificate>,
    chain: Vec<Certificate>,
    is_ca: bool,
    is_self_signed: bool,
}

impl Credential {
    /// Creates an empty credential for the given identity.
    pub fn new(common_name: CommonName, paths: StorePaths, thresholds: ExpiryThresholds) -> Self {
        Self {
            common_name,
            paths,
            thresholds,
            key: None,
            certificate: None,
            chain: Vec::new(),
            is_ca: false,
            is_self_signed: false,
        }
    }

    /// Generates a key pair and a self-signed certificate.
    ///
    /// Only the network trust root may self-sign; everything else obtains
    /// its certificate from its parent authority.
    ///
    /// # Errors
    ///
    /// [`Error::RoleNotPermittedHere`] off the root,
    /// [`Error::AlreadyInitialized`] when key or certificate material exists.
    pub fn create_self_signed(&mut self, validity_days: u32, is_ca: bool) -> Result<()> {
        if self.common_name.role() != EntityRole::NetworkCa {
            return Err(Error::RoleNotPermittedHere {
                role: self.common_name.role(),
                name: self.common_name.as_str().to_string(),
            });
        }
        if self.key.is_some() || self.certificate.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)
            .map_err(|e| Error::Crypto(format!("key generation failed: {e}")))?;

        let mut params = CertificateParams::new(vec![self.common_name.as_str().to_string()])
            .map_err(|e| Error::Crypto(format!("failed to create params: {e}")))?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, self.common_name.as_str());
        params.distinguished_name = dn;

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + Duration::days(i64::from(validity_days));
        params.serial_number = Some(random_serial()?);

        if is_ca {
            let depth = self
                .common_name
                .role()
                .authority_depth()
                .unwrap_or(0)
                .min(u32::from(u8::MAX)) as u8;
            params.is_ca = IsCa::Ca(BasicConstraints::Constrained(depth));
            params.key_usages = vec![
                KeyUsagePurpose::KeyCertSign,
                KeyUsagePurpose::CrlSign,
                KeyUsagePurpose::DigitalSignature,
            ];
        } else {
            params.is_ca = IsCa::ExplicitNoCa;
            params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        }

        let cert = params
            .self_signed(&key)
            .map_err(|e| Error::Crypto(format!("self-signing failed: {e}")))?;

        self.certificate = Some(Certificate::from_der(cert.der().to_vec()));
        self.key = Some(key);
        self.chain.clear();
        self.is_ca = is_ca;
        self.is_self_signed = true;
        debug!(name = %self.common_name, "created self-signed credential");
        Ok(())
    }

    /// Generates (or, with `renew`, reuses) the key pair and produces a
    /// signing request for this credential's Common Name.
    ///
    /// The request's subject-alternative names are
    /// `[common_name] + subject_alt_names`.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyInitialized`] when material exists and `renew` is not
    /// set.
    pub fn create_request(
        &mut self,
        subject_alt_names: &[String],
        renew: bool,
    ) -> Result<SigningRequest> {
        if !renew && (self.key.is_some() || self.certificate.is_some()) {
            return Err(Error::AlreadyInitialized);
        }

        if self.key.is_none() {
            let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)
                .map_err(|e| Error::Crypto(format!("key generation failed: {e}")))?;
            self.key = Some(key);
        }

        let key = self.key.as_ref().expect("key generated above");
        SigningRequest::generate(key, &self.common_name, subject_alt_names)
    }

    /// Stores the certificate and intermediate chain returned by an
    /// authority. The chain excludes the root.
    ///
    /// # Errors
    ///
    /// [`Error::IdentityMismatch`] when the certificate names someone else.
    pub fn absorb_signed(&mut self, certificate: Certificate, chain: Vec<Certificate>) -> Result<()> {
        let subject = certificate.subject_common_name()?;
        if subject != self.common_name.as_str() {
            return Err(Error::IdentityMismatch {
                expected: self.common_name.as_str().to_string(),
                actual: subject,
            });
        }
        self.is_ca = certificate.is_ca()?;
        self.is_self_signed = false;
        self.certificate = Some(certificate);
        self.chain = chain;
        debug!(name = %self.common_name, chain_len = self.chain.len(), "absorbed signed certificate");
        Ok(())
    }

    /// Loads the certificate bundle (and optionally the private key) from
    /// storage.
    ///
    /// `is_ca` is taken from the loaded certificate's Basic-Constraints
    /// extension. Remaining lifetime below the configured thresholds logs a
    /// non-fatal advisory.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when absent, [`Error::AlreadyInitialized`] when
    /// material is already loaded, [`Error::DecryptionFailed`] on a bad
    /// password.
    pub fn load(
        &mut self,
        storage: &dyn Storage,
        with_private_key: bool,
        password: Option<&str>,
    ) -> Result<()> {
        if self.certificate.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let bundle = storage.read(&self.paths.certificate)?;
        let bundle = String::from_utf8(bundle)
            .map_err(|_| Error::Certificate("certificate bundle is not UTF-8".to_string()))?;
        let mut certs = parse_cert_bundle(&bundle)?;
        let leaf = certs.remove(0);

        let subject = leaf.subject_common_name()?;
        if subject != self.common_name.as_str() {
            return Err(Error::IdentityMismatch {
                expected: self.common_name.as_str().to_string(),
                actual: subject,
            });
        }

        self.is_ca = leaf.is_ca()?;
        self.is_self_signed = leaf.issuer_common_name()? == subject;
        self.log_expiry_advisories(&leaf);
        self.certificate = Some(leaf);
        self.chain = certs;

        if with_private_key {
            if self.key.is_some() {
                return Err(Error::AlreadyInitialized);
            }
            let key_pem = storage.read(&self.paths.private_key)?;
            let key_pem = String::from_utf8(key_pem)
                .map_err(|_| Error::Certificate("private key is not UTF-8".to_string()))?;

            let key = if keywrap::is_encrypted(&key_pem) {
                let password = password.ok_or(Error::DecryptionFailed)?;
                let der = keywrap::decrypt_private_key(&key_pem, password)?;
                KeyPair::try_from(der.as_slice())
                    .map_err(|e| Error::Crypto(format!("failed to load private key: {e}")))?
            } else {
                KeyPair::from_pem(&key_pem)
                    .map_err(|e| Error::Crypto(format!("failed to load private key: {e}")))?
            };
            self.key = Some(key);
        }

        debug!(name = %self.common_name, is_ca = self.is_ca, "loaded credential");
        Ok(())
    }

    /// Persists the certificate bundle and, when a key is held, the private
    /// key (passphrase-encrypted when `password` is given).
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyExists`] when stored material is present and
    /// `overwrite` is not set.
    pub fn save(
        &self,
        storage: &dyn Storage,
        password: Option<&str>,
        overwrite: bool,
    ) -> Result<()> {
        let certificate = self
            .certificate
            .as_ref()
            .ok_or_else(|| Error::Certificate("credential holds no certificate".to_string()))?;

        if !overwrite && storage.exists(&self.paths.certificate)? {
            return Err(Error::AlreadyExists {
                path: self.paths.certificate.clone(),
            });
        }

        let bundle = bundle_to_pem(certificate, &self.chain);
        storage.write(&self.paths.certificate, bundle.as_bytes())?;

        if self.key.is_some() {
            let key_bytes = self.private_key_as_bytes(password)?;
            storage.write(&self.paths.private_key, &key_bytes)?;
        }
        Ok(())
    }

    /// The non-root chain as concatenated PEM text.
    pub fn chain_as_text(&self) -> String {
        self.chain.iter().map(|c| c.to_pem().to_string()).collect()
    }

    /// The certificate as PEM bytes.
    pub fn certificate_as_bytes(&self) -> Result<Vec<u8>> {
        self.certificate
            .as_ref()
            .map(|c| c.to_pem().as_bytes().to_vec())
            .ok_or_else(|| Error::Certificate("credential holds no certificate".to_string()))
    }

    /// The private key as PEM bytes, passphrase-encrypted when `password`
    /// is given.
    pub fn private_key_as_bytes(&self, password: Option<&str>) -> Result<Vec<u8>> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| Error::Crypto("credential holds no private key".to_string()))?;
        match password {
            Some(pw) => {
                let armored = keywrap::encrypt_private_key(&key.serialize_der(), pw)?;
                Ok(armored.into_bytes())
            }
            None => Ok(key.serialize_pem().into_bytes()),
        }
    }

    /// The credential's Common Name.
    pub fn common_name(&self) -> &CommonName {
        &self.common_name
    }

    /// The credential's role.
    pub fn role(&self) -> EntityRole {
        self.common_name.role()
    }

    /// The owning service id, when the role carries one.
    pub fn service_id(&self) -> Option<u32> {
        self.common_name.service_id()
    }

    /// The certificate, when present.
    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    /// The non-root chain.
    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// Whether the certificate's Basic-Constraints mark this as a CA.
    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// Whether the certificate is self-signed (issuer equals subject).
    pub fn is_self_signed(&self) -> bool {
        self.is_self_signed
    }

    /// Whether private key material is held.
    pub fn has_private_key(&self) -> bool {
        self.key.is_some()
    }

    /// The configured storage paths.
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Re-creates the held key pair for signing use.
    ///
    /// `rcgen` key pairs are not clonable, so authority signing rebuilds one
    /// from the serialized form per operation.
    pub(crate) fn signing_key(&self) -> Result<KeyPair> {
        let key = self
            .key
            .as_ref()
            .ok_or(Error::NotACertifyingAuthority)?;
        KeyPair::try_from(key.serialize_der().as_slice())
            .map_err(|e| Error::Crypto(format!("failed to rebuild signing key: {e}")))
    }

    fn log_expiry_advisories(&self, certificate: &Certificate) {
        let Ok(not_after) = certificate.not_after() else {
            return;
        };
        let remaining = not_after - chrono::Utc::now();
        let days = remaining.num_days();
        if days < self.thresholds.needed {
            warn!(name = %self.common_name, days, "certificate expires very soon");
        } else if days < self.thresholds.wanted {
            warn!(name = %self.common_name, days, "certificate expires soon");
        }
    }

    /// Remaining certificate lifetime in whole days, when a certificate is
    /// held.
    pub fn remaining_days(&self) -> Option<i64> {
        let not_after = self.certificate.as_ref()?.not_after().ok()?;
        Some((not_after - chrono::Utc::now()).num_days())
    }

    /// Whether the remaining lifetime has crossed the renewal-wanted
    /// threshold.
    pub fn needs_renewal(&self) -> bool {
        self.remaining_days()
            .is_some_and(|days| days < self.thresholds.wanted)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("common_name", &self.common_name.as_str())
            .field("is_ca", &self.is_ca)
            .field("is_self_signed", &self.is_self_signed)
            .field("has_certificate", &self.certificate.is_some())
            .field("has_private_key", &"[REDACTED]")
            .finish()
    }
}

/// A fresh random serial number (128 bits, high bit cleared).
pub(crate) fn random_serial() -> Result<SerialNumber> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes)
        .map_err(|_| Error::Crypto("random generator failure".to_string()))?;
    bytes[0] &= 0x7f;
    Ok(SerialNumber::from(bytes.to_vec()))
}
