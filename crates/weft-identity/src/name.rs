//! Encoding and decoding identities into certificate Common Names.
//!
//! The wire format every certificate name in a weft network must satisfy is
//!
//! ```text
//! <identifier>.<role-token>[-<service_id>].<network-domain>   (identified roles)
//! <role-token>[-<service_id>].<network-domain>                (authority roles)
//! ```
//!
//! where `identifier` is a UUID and `service_id` is a decimal in
//! `0..=u32::MAX`. The network domain is the trailing suffix; after stripping
//! it there are exactly one or two labels left, and the label immediately
//! preceding the domain is the role label.
//!
//! # Example
//!
//! ```
//! use weft_identity::name::CommonName;
//! use weft_identity::role::EntityRole;
//! use uuid::Uuid;
//!
//! let id = Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap();
//! let cn = CommonName::encode(EntityRole::Account, Some(id), None, "example.test").unwrap();
//! assert_eq!(
//!     cn.as_str(),
//!     "11111111-1111-1111-1111-111111111111.account.example.test"
//! );
//!
//! let decoded = CommonName::decode(cn.as_str(), "example.test", true, false).unwrap();
//! assert_eq!(decoded.role, EntityRole::Account);
//! assert_eq!(decoded.identifier, Some(id));
//! assert_eq!(decoded.service_id, None);
//! ```

use crate::role::EntityRole;
use crate::{Error, Result};
use std::fmt;
use uuid::Uuid;

/// The structured identity decoded from (or encoded into) a Common Name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityIdentity {
    /// The actor's role.
    pub role: EntityRole,
    /// UUID identifier; present for all roles except the authorities.
    pub identifier: Option<Uuid>,
    /// Owning service id; present for every per-service role.
    pub service_id: Option<u32>,
}

impl EntityIdentity {
    /// Builds the Common Name for this identity on the given network.
    pub fn common_name(&self, network: &str) -> Result<CommonName> {
        CommonName::encode(self.role, self.identifier, self.service_id, network)
    }
}

impl fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.role)?;
        if let Some(sid) = self.service_id {
            write!(f, "@{sid}")?;
        }
        if let Some(id) = self.identifier {
            write!(f, ":{id}")?;
        }
        Ok(())
    }
}

/// A validated Common Name together with its decoded identity and network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonName {
    name: String,
    identity: EntityIdentity,
    network: String,
}

impl CommonName {
    /// Encodes an identity into a Common Name string.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidIdentity`] if the role requires an identifier or a
    /// service id that is missing, or carries one it must not.
    pub fn encode(
        role: EntityRole,
        identifier: Option<Uuid>,
        service_id: Option<u32>,
        network: &str,
    ) -> Result<CommonName> {
        if role == EntityRole::Anonymous {
            return Err(Error::InvalidIdentity {
                reason: "anonymous has no certificate form".to_string(),
            });
        }
        if network.is_empty() {
            return Err(Error::InvalidIdentity {
                reason: "empty network domain".to_string(),
            });
        }
        if role.requires_identifier() != identifier.is_some() {
            return Err(Error::InvalidIdentity {
                reason: format!(
                    "role {role} {} an identifier",
                    if role.requires_identifier() { "requires" } else { "does not take" }
                ),
            });
        }
        if role.requires_service_id() != service_id.is_some() {
            return Err(Error::InvalidIdentity {
                reason: format!(
                    "role {role} {} a service id",
                    if role.requires_service_id() { "requires" } else { "does not take" }
                ),
            });
        }

        let role_label = match service_id {
            Some(sid) => format!("{}-{sid}", role.token()),
            None => role.token().to_string(),
        };
        let name = match identifier {
            Some(id) => format!("{id}.{role_label}.{network}"),
            None => format!("{role_label}.{network}"),
        };

        Ok(CommonName {
            name,
            identity: EntityIdentity {
                role,
                identifier,
                service_id,
            },
            network: network.to_string(),
        })
    }

    /// Decodes and validates a Common Name against the network domain.
    ///
    /// `expect_identifier` / `expect_service_id` express the caller's
    /// position: an authority reviewing leaf requests expects an identifier,
    /// the root reviewing authority requests does not. A decoded role whose
    /// shape disagrees with the expectation fails with
    /// [`Error::RoleNotPermittedHere`].
    ///
    /// # Errors
    ///
    /// [`Error::MalformedName`] when the domain suffix or label structure is
    /// wrong or the identifier is not a UUID; [`Error::UnknownRole`] /
    /// [`Error::ServiceIdOutOfRange`] from role-label matching.
    pub fn decode(
        common_name: &str,
        network: &str,
        expect_identifier: bool,
        expect_service_id: bool,
    ) -> Result<EntityIdentity> {
        let identity = Self::parse(common_name, network)?.identity;

        if identity.role.requires_identifier() != expect_identifier
            || identity.role.requires_service_id() != expect_service_id
        {
            return Err(Error::RoleNotPermittedHere {
                role: identity.role,
                name: common_name.to_string(),
            });
        }

        Ok(identity)
    }

    /// Parses a Common Name with role-intrinsic validation only.
    pub fn parse(common_name: &str, network: &str) -> Result<CommonName> {
        let malformed = |reason: &str| Error::MalformedName {
            name: common_name.to_string(),
            reason: reason.to_string(),
        };

        let prefix = common_name
            .strip_suffix(network)
            .and_then(|rest| rest.strip_suffix('.'))
            .ok_or_else(|| malformed("does not end with the network domain"))?;
        if prefix.is_empty() {
            return Err(malformed("no labels before the network domain"));
        }

        let labels: Vec<&str> = prefix.split('.').collect();
        if labels.len() > 2 || labels.iter().any(|l| l.is_empty()) {
            return Err(malformed("expected one or two labels before the network domain"));
        }

        let role_label = *labels.last().expect("at least one label");
        let (role, service_id) = EntityRole::match_label(role_label)?;

        let identifier = if labels.len() == 2 {
            let id = Uuid::parse_str(labels[0])
                .map_err(|_| malformed("identifier label is not a UUID"))?;
            Some(id)
        } else {
            None
        };

        if role.requires_identifier() != identifier.is_some() {
            return Err(malformed(if role.requires_identifier() {
                "role requires an identifier label"
            } else {
                "role does not take an identifier label"
            }));
        }

        Ok(CommonName {
            name: common_name.to_string(),
            identity: EntityIdentity {
                role,
                identifier,
                service_id,
            },
            network: network.to_string(),
        })
    }

    /// The Common Name string.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The decoded identity.
    pub fn identity(&self) -> &EntityIdentity {
        &self.identity
    }

    /// The actor's role.
    pub fn role(&self) -> EntityRole {
        self.identity.role
    }

    /// The owning service id, when the role carries one.
    pub fn service_id(&self) -> Option<u32> {
        self.identity.service_id
    }

    /// The network domain this name belongs to.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// The Common Name of the authority that issues certificates for this
    /// name's role, reconstructed from the role and service id alone.
    ///
    /// Returns `None` for the self-signed network root.
    pub fn issuer_common_name(&self) -> Option<CommonName> {
        let issuer_role = self.identity.role.issuing_role()?;
        let sid = issuer_role.requires_service_id().then(|| {
            self.identity
                .service_id
                .expect("per-service roles carry a service id")
        });
        Some(
            CommonName::encode(issuer_role, None, sid, &self.network)
                .expect("authority names always encode"),
        )
    }
}

impl fmt::Display for CommonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
