//! Identity and trust fabric for the weft network.
//!
//! Every actor in a weft network (accounts, members of a service, services,
//! and applications) is identified by an X.509 certificate whose Common Name
//! encodes its role, identifier, and position in the network. This crate is
//! the certificate-authority core: the identity codec, the credential
//! lifecycle, the multi-tier authority hierarchy, request review and signing,
//! and chain-of-trust verification.
//!
//! # Components
//!
//! - [`role`] - Entity roles and the Common Name token table
//! - [`name`] - Encoding/decoding identities into certificate Common Names
//! - [`certificate`] - X.509 certificate handling
//! - [`csr`] - Signing request generation and introspection
//! - [`credential`] - Key pair + certificate + chain lifecycle
//! - [`authority`] - Request review and certificate signing
//! - [`hierarchy`] - The fixed authority graph and its policy tables
//! - [`chain`] - Offline chain-of-trust validation
//! - [`verifier`] - Authentication boundary for proxy-fronted services
//! - [`storage`] - Byte-blob storage abstraction (disk, in-memory)

pub mod authority;
pub mod certificate;
pub mod chain;
pub mod credential;
pub mod csr;
pub mod hierarchy;
mod keywrap;
pub mod name;
pub mod role;
pub mod storage;
pub mod verifier;

pub use authority::{AuthorityPolicy, Expiration, IssuingAuthority, SignedCertificate};
pub use certificate::Certificate;
pub use chain::validate_chain;
pub use credential::{Credential, ExpiryThresholds};
pub use csr::SigningRequest;
pub use hierarchy::{AuthorityHierarchy, AuthorityKind};
pub use name::{CommonName, EntityIdentity};
pub use role::EntityRole;
pub use storage::{DiskStorage, MemoryStorage, Storage};
pub use verifier::{decode_identity, verify_role_chain};

/// Errors that can occur in weft-identity operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // -- structural: the request/name can never succeed, reject without retry

    /// A Common Name that does not satisfy the identity grammar.
    #[error("malformed common name {name:?}: {reason}")]
    MalformedName {
        /// The offending name.
        name: String,
        /// What the grammar check tripped over.
        reason: String,
    },

    /// No role token matched the role label of a Common Name.
    #[error("unknown role label {label:?}")]
    UnknownRole {
        /// The label that matched no role token.
        label: String,
    },

    /// A service id outside `0..=u32::MAX`.
    #[error("service id {value} out of range")]
    ServiceIdOutOfRange {
        /// The decimal value as parsed.
        value: u64,
    },

    /// A CA role where a leaf role was expected, or vice versa.
    #[error("role {role} not permitted in {name:?}")]
    RoleNotPermittedHere {
        /// The decoded role.
        role: role::EntityRole,
        /// The Common Name it was decoded from.
        name: String,
    },

    /// An identity that cannot be encoded (missing identifier or service id).
    #[error("invalid identity: {reason}")]
    InvalidIdentity {
        /// Why the identity cannot be encoded.
        reason: String,
    },

    /// A request subject with forbidden attributes or no Common Name.
    #[error("malformed request subject: {reason}")]
    MalformedSubject {
        /// The offending attribute or omission.
        reason: String,
    },

    /// A subject-alternative-name extension is absent from the request.
    #[error("request carries no subject alternative name")]
    MissingSubjectAltName,

    /// More subject-alternative names than the single one this system uses.
    #[error("request carries {count} subject alternative names, expected 1")]
    TooManySubjectAltNames {
        /// How many names were present.
        count: usize,
    },

    /// The subject-alternative name differs from the Common Name.
    #[error("subject alternative name {actual:?} does not match common name {expected:?}")]
    SubjectAltNameMismatch {
        /// The Common Name the SAN must equal.
        expected: String,
        /// The SAN value found.
        actual: String,
    },

    // -- cryptographic: misbehaving or malicious requester, log distinctly

    /// The request's self-signature does not verify against its own key.
    #[error("request self-signature does not verify")]
    InvalidRequestSignature,

    /// A signature or digest algorithm outside the accepted set.
    #[error("unsupported signature algorithm {oid}")]
    UnsupportedAlgorithm {
        /// Dotted OID of the rejected algorithm.
        oid: String,
    },

    /// A request without a Key-Usage extension.
    #[error("request declares no key usage")]
    MissingKeyUsageExtension,

    // -- policy: well-formed request sent to the wrong authority

    /// The decoded role is not in this authority's policy table.
    #[error("role {role} not accepted by this authority")]
    RoleNotAccepted {
        /// The role the request asked for.
        role: role::EntityRole,
    },

    /// A signing operation on a credential that is not a CA.
    #[error("credential is not a certifying authority")]
    NotACertifyingAuthority,

    /// A certificate presenting a different identity than required.
    #[error("identity mismatch: expected {expected}, got {actual}")]
    IdentityMismatch {
        /// The identity the caller required.
        expected: String,
        /// The identity actually presented.
        actual: String,
    },

    /// A certificate issued by a different authority than its role demands.
    #[error("issuer mismatch: expected {expected:?}, got {actual:?}")]
    IssuerMismatch {
        /// The issuer Common Name the role demands.
        expected: String,
        /// The issuer Common Name presented.
        actual: String,
    },

    // -- state: caller-sequencing mistakes

    /// Key or certificate material is already present.
    #[error("credential already initialized")]
    AlreadyInitialized,

    /// A save without `overwrite` onto existing stored material.
    #[error("stored material already exists at {path:?}")]
    AlreadyExists {
        /// The storage path that is occupied.
        path: String,
    },

    /// Stored material that is absent.
    #[error("not found: {path:?}")]
    NotFound {
        /// The storage path that was read.
        path: String,
    },

    /// An encrypted private key that does not open with the given password.
    #[error("private key decryption failed")]
    DecryptionFailed,

    // -- chain validation: retain context for the audit log

    /// A signature or issuer/subject linkage failure inside the path.
    #[error("chain broken at {link:?}: {detail}")]
    ChainBroken {
        /// Subject of the certificate whose link failed.
        link: String,
        /// Which check failed.
        detail: String,
    },

    /// A certificate in the path outside its validity window.
    #[error("certificate {subject:?} outside its validity window")]
    ExpiredCertificate {
        /// Subject of the expired certificate.
        subject: String,
    },

    /// A path that does not terminate at the trusted root.
    #[error("path does not terminate at the trusted root (last issuer {subject:?})")]
    UntrustedRoot {
        /// Subject of the certificate that failed to chain to the root.
        subject: String,
    },

    // -- wrapped lower layers

    /// Certificate or request parsing/serialization error.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Key generation or signing failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// I/O error from the storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for weft-identity operations.
pub type Result<T> = std::result::Result<T, Error>;
