//! Issuing authority: request review and certificate signing.
//!
//! An [`IssuingAuthority`] is a CA [`Credential`] paired with an
//! [`AuthorityPolicy`] naming exactly which identity roles it signs and for
//! how long. [`IssuingAuthority::review_request`] is the security gate every
//! request passes before [`IssuingAuthority::sign`] issues a certificate;
//! each check has its own failure mode so the audit log can tell a malformed
//! request from a malicious one.

use crate::certificate::Certificate;
use crate::credential::{random_serial, Credential};
use crate::csr::SigningRequest;
use crate::name::{CommonName, EntityIdentity};
use crate::role::EntityRole;
use crate::{Error, Result};
use rcgen::{
    BasicConstraints, CertificateSigningRequestParams, ExtendedKeyUsagePurpose, IsCa, Issuer,
    KeyUsagePurpose,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use x509_parser::oid_registry::{
    OID_PKCS1_SHA256WITHRSA, OID_SIG_ECDSA_WITH_SHA256, OID_SIG_ED25519, OID_X509_COMMON_NAME,
    OID_X509_COUNTRY_NAME, OID_X509_LOCALITY_NAME, OID_X509_ORGANIZATION_NAME,
    OID_X509_STATE_OR_PROVINCE_NAME,
};
use x509_parser::prelude::{GeneralName, ParsedExtension};

/// Which roles an authority signs, and for how long.
///
/// Anything absent from the table is rejected with
/// [`Error::RoleNotAccepted`]. The numbers are deployment configuration;
/// the defaults in [`crate::hierarchy`] are the interoperability contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityPolicy {
    /// Accepted roles mapped to the validity period (days) granted.
    accepted: HashMap<EntityRole, u32>,
    /// How many tiers of authorities may exist below this one.
    max_chain_depth_below: u32,
    /// Whether this authority may issue CA certificates at all.
    signs_ca_certificates: bool,
}

impl AuthorityPolicy {
    /// Creates an empty policy.
    pub fn new(max_chain_depth_below: u32, signs_ca_certificates: bool) -> Self {
        Self {
            accepted: HashMap::new(),
            max_chain_depth_below,
            signs_ca_certificates,
        }
    }

    /// Adds an accepted role with its validity period in days.
    pub fn accept(mut self, role: EntityRole, validity_days: u32) -> Self {
        self.accepted.insert(role, validity_days);
        self
    }

    /// The validity period granted to `role`, when accepted.
    pub fn validity_days(&self, role: EntityRole) -> Option<u32> {
        self.accepted.get(&role).copied()
    }

    /// How many tiers of authorities may exist below this one.
    pub fn max_chain_depth_below(&self) -> u32 {
        self.max_chain_depth_below
    }

    /// Whether this authority may issue CA certificates.
    pub fn signs_ca_certificates(&self) -> bool {
        self.signs_ca_certificates
    }
}

/// How long an issued certificate should live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// A number of days from now.
    Days(u32),
    /// An absolute expiry instant.
    At(OffsetDateTime),
    /// A duration from now.
    In(Duration),
}

impl Expiration {
    fn not_after(&self, now: OffsetDateTime) -> OffsetDateTime {
        match self {
            Expiration::Days(days) => now + Duration::days(i64::from(*days)),
            Expiration::At(at) => *at,
            Expiration::In(duration) => now + *duration,
        }
    }
}

/// The certificate and intermediate chain returned from a signing operation.
///
/// The chain is ordered closest-to-leaf first and never includes the root.
#[derive(Debug, Clone)]
pub struct SignedCertificate {
    certificate: Certificate,
    chain: Vec<Certificate>,
}

impl SignedCertificate {
    /// The issued certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// The issuing authority's certificate and its own chain, root excluded.
    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// The chain as concatenated PEM text.
    pub fn chain_as_text(&self) -> String {
        self.chain.iter().map(|c| c.to_pem().to_string()).collect()
    }

    /// Splits into certificate and chain.
    pub fn into_parts(self) -> (Certificate, Vec<Certificate>) {
        (self.certificate, self.chain)
    }
}

/// What review extracted from a request; consumed by [`IssuingAuthority::sign`].
struct ReviewedRequest {
    identity: EntityIdentity,
    key_usages: Vec<KeyUsagePurpose>,
    extended_key_usages: Vec<ExtendedKeyUsagePurpose>,
}

/// A credential that reviews and signs certificate requests.
pub struct IssuingAuthority {
    credential: Credential,
    policy: AuthorityPolicy,
}

impl IssuingAuthority {
    /// Pairs a CA credential with its policy table.
    pub fn new(credential: Credential, policy: AuthorityPolicy) -> Self {
        Self { credential, policy }
    }

    /// The underlying credential.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Mutable access to the underlying credential (for lifecycle
    /// operations such as loading and renewal).
    pub fn credential_mut(&mut self) -> &mut Credential {
        &mut self.credential
    }

    /// The policy table.
    pub fn policy(&self) -> &AuthorityPolicy {
        &self.policy
    }

    /// Validates an incoming request without signing it.
    ///
    /// Runs the full gate: authority state, request self-signature,
    /// algorithm set, subject shape, Common Name decoding, subject
    /// alternative names, and the policy table. Returns the decoded identity
    /// for the caller's authorization decision (renewal-vs-registration is
    /// outside this crate).
    pub fn review_request(&self, request: &SigningRequest) -> Result<EntityIdentity> {
        self.review(request).map(|reviewed| reviewed.identity)
    }

    fn review(&self, request: &SigningRequest) -> Result<ReviewedRequest> {
        if !self.credential.is_ca() || !self.credential.has_private_key() {
            return Err(Error::NotACertifyingAuthority);
        }
        let network = self.credential.common_name().network().to_string();

        let reviewed = request.with_parsed(|csr| {
            csr.verify_signature().map_err(|_| {
                warn!(request = request.common_name(), "request self-signature failed");
                Error::InvalidRequestSignature
            })?;

            let algorithm = &csr.signature_algorithm.algorithm;
            let accepted = *algorithm == OID_PKCS1_SHA256WITHRSA
                || *algorithm == OID_SIG_ED25519
                || *algorithm == OID_SIG_ECDSA_WITH_SHA256;
            if !accepted {
                return Err(Error::UnsupportedAlgorithm {
                    oid: algorithm.to_id_string(),
                });
            }

            let mut common_name = None;
            for attr in csr.certification_request_info.subject.iter_attributes() {
                let oid = attr.attr_type();
                if *oid == OID_X509_COMMON_NAME {
                    let value = attr.as_str().map_err(|_| Error::MalformedSubject {
                        reason: "common name is not a string".to_string(),
                    })?;
                    common_name = Some(value.to_string());
                } else if *oid != OID_X509_COUNTRY_NAME
                    && *oid != OID_X509_STATE_OR_PROVINCE_NAME
                    && *oid != OID_X509_LOCALITY_NAME
                    && *oid != OID_X509_ORGANIZATION_NAME
                {
                    return Err(Error::MalformedSubject {
                        reason: format!("forbidden attribute {}", oid.to_id_string()),
                    });
                }
            }
            let common_name = common_name.ok_or_else(|| Error::MalformedSubject {
                reason: "no common name attribute".to_string(),
            })?;

            let identity = *CommonName::parse(&common_name, &network)?.identity();

            let mut sans = Vec::new();
            let mut key_usages = Vec::new();
            let mut extended_key_usages = Vec::new();
            if let Some(extensions) = csr.requested_extensions() {
                for ext in extensions {
                    match ext {
                        ParsedExtension::SubjectAlternativeName(san) => {
                            for name in &san.general_names {
                                if let GeneralName::DNSName(dns) = name {
                                    sans.push((*dns).to_string());
                                }
                            }
                        }
                        ParsedExtension::KeyUsage(ku) => {
                            key_usages = declared_key_usages(ku);
                        }
                        ParsedExtension::ExtendedKeyUsage(eku) => {
                            if eku.server_auth {
                                extended_key_usages.push(ExtendedKeyUsagePurpose::ServerAuth);
                            }
                            if eku.client_auth {
                                extended_key_usages.push(ExtendedKeyUsagePurpose::ClientAuth);
                            }
                        }
                        _ => {}
                    }
                }
            }

            if sans.is_empty() {
                return Err(Error::MissingSubjectAltName);
            }
            if sans.len() > 1 {
                return Err(Error::TooManySubjectAltNames { count: sans.len() });
            }
            if sans[0] != common_name {
                return Err(Error::SubjectAltNameMismatch {
                    expected: common_name,
                    actual: sans[0].clone(),
                });
            }

            Ok(ReviewedRequest {
                identity,
                key_usages,
                extended_key_usages,
            })
        })?;

        if self.policy.validity_days(reviewed.identity.role).is_none() {
            return Err(Error::RoleNotAccepted {
                role: reviewed.identity.role,
            });
        }

        Ok(reviewed)
    }

    /// Reviews and signs a request into a certificate.
    ///
    /// With `expire` omitted the validity period comes from the policy
    /// table. The request's public key and declared Key-Usage/Extended-
    /// Key-Usage travel into the certificate; the policy table's role
    /// classification decides the Basic-Constraints CA flag, regardless of
    /// what the request asked for.
    ///
    /// # Errors
    ///
    /// Everything [`Self::review_request`] raises, plus
    /// [`Error::MissingKeyUsageExtension`] for a request declaring no key
    /// usage.
    pub fn sign(
        &self,
        request: &SigningRequest,
        expire: Option<Expiration>,
    ) -> Result<SignedCertificate> {
        let reviewed = self.review(request)?;
        let role = reviewed.identity.role;

        let validity_days = self
            .policy
            .validity_days(role)
            .ok_or(Error::RoleNotAccepted { role })?;
        if reviewed.key_usages.is_empty() {
            return Err(Error::MissingKeyUsageExtension);
        }

        let mut csr = CertificateSigningRequestParams::from_pem(request.pem())
            .map_err(|e| Error::Certificate(format!("failed to parse request: {e}")))?;

        let now = OffsetDateTime::now_utc();
        csr.params.not_before = now;
        csr.params.not_after = expire
            .unwrap_or(Expiration::Days(validity_days))
            .not_after(now);
        csr.params.serial_number = Some(random_serial()?);

        // The policy table is authoritative: a leaf role is issued ca=false
        // no matter what the request's Basic-Constraints asked for.
        csr.params.is_ca = match role.authority_depth() {
            Some(depth) if self.policy.signs_ca_certificates() => {
                IsCa::Ca(BasicConstraints::Constrained(depth.min(u32::from(u8::MAX)) as u8))
            }
            _ => IsCa::ExplicitNoCa,
        };
        csr.params.key_usages = reviewed.key_usages;
        csr.params.extended_key_usages = reviewed.extended_key_usages;
        csr.params.use_authority_key_identifier_extension = !self.credential.is_self_signed();

        let own_certificate = self
            .credential
            .certificate()
            .ok_or(Error::NotACertifyingAuthority)?;
        let signing_key = self.credential.signing_key()?;
        let issuer = Issuer::from_ca_cert_pem(own_certificate.to_pem(), signing_key)
            .map_err(|e| Error::Crypto(format!("failed to build issuer: {e}")))?;

        let signed = csr
            .signed_by(&issuer)
            .map_err(|e| Error::Crypto(format!("certificate signing failed: {e}")))?;
        let certificate = Certificate::from_der(signed.der().to_vec());

        // The chain handed back never includes the root certificate.
        let chain = if self.credential.is_self_signed() {
            Vec::new()
        } else {
            let mut chain = vec![own_certificate.clone()];
            chain.extend_from_slice(self.credential.chain());
            chain
        };

        info!(
            issuer = %self.credential.common_name(),
            subject = request.common_name(),
            role = %role,
            serial = %certificate.fingerprint(),
            "issued certificate"
        );

        Ok(SignedCertificate { certificate, chain })
    }
}

fn declared_key_usages(ku: &x509_parser::extensions::KeyUsage) -> Vec<KeyUsagePurpose> {
    let mut usages = Vec::new();
    if ku.digital_signature() {
        usages.push(KeyUsagePurpose::DigitalSignature);
    }
    if ku.non_repudiation() {
        usages.push(KeyUsagePurpose::ContentCommitment);
    }
    if ku.key_encipherment() {
        usages.push(KeyUsagePurpose::KeyEncipherment);
    }
    if ku.data_encipherment() {
        usages.push(KeyUsagePurpose::DataEncipherment);
    }
    if ku.key_agreement() {
        usages.push(KeyUsagePurpose::KeyAgreement);
    }
    if ku.key_cert_sign() {
        usages.push(KeyUsagePurpose::KeyCertSign);
    }
    if ku.crl_sign() {
        usages.push(KeyUsagePurpose::CrlSign);
    }
    usages
}
