//! Authentication boundary for proxy-fronted services.
//!
//! Reverse-proxy-fronted services receive a peer's Common Name and issuer
//! Common Name as TLS metadata. These helpers turn that metadata into a
//! trusted [`EntityIdentity`] without re-deriving PKI logic at every call
//! site: the expected issuer for a role is reconstructed from the role and
//! service id alone and compared against what the proxy saw.

use crate::name::{CommonName, EntityIdentity};
use crate::role::EntityRole;
use crate::{Error, Result};

/// Decodes a peer's Common Name into an identity.
///
/// Validation is role-intrinsic: the name must satisfy the grammar for
/// whatever role its label names. Callers with positional expectations use
/// [`CommonName::decode`] directly.
pub fn decode_identity(common_name: &str, network: &str) -> Result<EntityIdentity> {
    Ok(*CommonName::parse(common_name, network)?.identity())
}

/// Verifies that a peer's certificate names the required role and was
/// issued by the authority that role demands.
///
/// `role` and `service_id` are what the call site requires (the "check
/// member cert" style operations); `issuer_common_name` is what the TLS
/// layer actually saw. Returns the decoded identity on success.
///
/// # Errors
///
/// - [`Error::RoleNotPermittedHere`] when the name decodes to a different
///   role.
/// - [`Error::IdentityMismatch`] when the service id differs.
/// - [`Error::IssuerMismatch`] when the issuer is not the one the role's
///   position in the hierarchy demands.
pub fn verify_role_chain(
    common_name: &str,
    issuer_common_name: &str,
    role: EntityRole,
    service_id: Option<u32>,
    network: &str,
) -> Result<EntityIdentity> {
    let name = CommonName::parse(common_name, network)?;
    let identity = *name.identity();

    if identity.role != role {
        return Err(Error::RoleNotPermittedHere {
            role: identity.role,
            name: common_name.to_string(),
        });
    }
    if identity.service_id != service_id {
        return Err(Error::IdentityMismatch {
            expected: format!("{role} of service {service_id:?}"),
            actual: identity.to_string(),
        });
    }

    let expected_issuer = name
        .issuer_common_name()
        .ok_or_else(|| Error::RoleNotPermittedHere {
            role: identity.role,
            name: common_name.to_string(),
        })?;
    if issuer_common_name != expected_issuer.as_str() {
        return Err(Error::IssuerMismatch {
            expected: expected_issuer.as_str().to_string(),
            actual: issuer_common_name.to_string(),
        });
    }

    Ok(identity)
}
