//! Entity roles and the Common Name token table.
//!
//! Every certificate in a weft network carries one role, encoded as a fixed
//! textual token in the role label of its Common Name. Matching a label back
//! to a role is done against an explicit ordered table, longest token first,
//! so that roles sharing a textual prefix (`member` / `members-ca`,
//! `account` / `account-data`) are never cross-matched.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed category of actor encoded in a certificate's Common Name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRole {
    /// A user account, network-wide.
    Account,
    /// Data store belonging to an account.
    AccountData,
    /// A member of one service.
    Member,
    /// Data store belonging to a member.
    MemberData,
    /// A service node.
    Service,
    /// Data store belonging to a service.
    ServiceData,
    /// The certifying authority of one service.
    ServiceCa,
    /// An application registered with a service.
    App,
    /// Data store belonging to an application.
    AppData,
    /// The network-level authority for accounts.
    AccountsCa,
    /// The network-level authority for services.
    ServicesCa,
    /// The per-service authority for members.
    MembersCa,
    /// The per-service authority for applications.
    AppsCa,
    /// Network-level data store.
    NetworkData,
    /// The network trust root.
    NetworkCa,
    /// Unauthenticated marker used at the API boundary only; never appears
    /// on a certificate.
    Anonymous,
}

/// One row of the role token table.
struct RoleSpec {
    role: EntityRole,
    token: &'static str,
    requires_identifier: bool,
    requires_service_id: bool,
}

/// The role token table. Matching walks this table and keeps the longest
/// token that fits, so table order itself carries no meaning.
const ROLE_TABLE: &[RoleSpec] = &[
    row(EntityRole::Account, "account", true, false),
    row(EntityRole::AccountData, "account-data", true, false),
    row(EntityRole::Member, "member", true, true),
    row(EntityRole::MemberData, "member-data", true, true),
    row(EntityRole::Service, "service", true, true),
    row(EntityRole::ServiceData, "service-data", true, true),
    row(EntityRole::ServiceCa, "service-ca", false, true),
    row(EntityRole::App, "app", true, true),
    row(EntityRole::AppData, "app-data", true, true),
    row(EntityRole::AccountsCa, "accounts-ca", false, false),
    row(EntityRole::ServicesCa, "services-ca", false, false),
    row(EntityRole::MembersCa, "members-ca", false, true),
    row(EntityRole::AppsCa, "apps-ca", false, true),
    row(EntityRole::NetworkData, "network-data", true, false),
    row(EntityRole::NetworkCa, "ca", false, false),
];

const fn row(
    role: EntityRole,
    token: &'static str,
    requires_identifier: bool,
    requires_service_id: bool,
) -> RoleSpec {
    RoleSpec {
        role,
        token,
        requires_identifier,
        requires_service_id,
    }
}

impl EntityRole {
    /// Returns the fixed Common Name token for this role.
    ///
    /// # Panics
    ///
    /// Panics for [`EntityRole::Anonymous`], which has no certificate form.
    pub fn token(&self) -> &'static str {
        ROLE_TABLE
            .iter()
            .find(|s| s.role == *self)
            .map(|s| s.token)
            .expect("anonymous role has no token")
    }

    /// Whether a Common Name of this role carries a UUID identifier label.
    pub fn requires_identifier(&self) -> bool {
        ROLE_TABLE
            .iter()
            .find(|s| s.role == *self)
            .is_some_and(|s| s.requires_identifier)
    }

    /// Whether the role label of this role carries a `-<service_id>` suffix.
    pub fn requires_service_id(&self) -> bool {
        ROLE_TABLE
            .iter()
            .find(|s| s.role == *self)
            .is_some_and(|s| s.requires_service_id)
    }

    /// Whether this role names a certifying authority.
    pub fn is_authority(&self) -> bool {
        matches!(
            self,
            EntityRole::NetworkCa
                | EntityRole::AccountsCa
                | EntityRole::ServicesCa
                | EntityRole::ServiceCa
                | EntityRole::MembersCa
                | EntityRole::AppsCa
        )
    }

    /// The role of the authority that issues certificates for this role.
    ///
    /// Returns `None` for the network root (self-signed) and for
    /// [`EntityRole::Anonymous`].
    pub fn issuing_role(&self) -> Option<EntityRole> {
        match self {
            EntityRole::Account | EntityRole::AccountData => Some(EntityRole::AccountsCa),
            EntityRole::NetworkData | EntityRole::ServiceCa => Some(EntityRole::ServicesCa),
            EntityRole::Service
            | EntityRole::ServiceData
            | EntityRole::MembersCa
            | EntityRole::AppsCa => Some(EntityRole::ServiceCa),
            EntityRole::Member | EntityRole::MemberData => Some(EntityRole::MembersCa),
            EntityRole::App | EntityRole::AppData => Some(EntityRole::AppsCa),
            EntityRole::AccountsCa | EntityRole::ServicesCa => Some(EntityRole::NetworkCa),
            EntityRole::NetworkCa | EntityRole::Anonymous => None,
        }
    }

    /// How many tiers of authorities may exist below this authority role.
    ///
    /// Strictly decreases moving away from the root: the root may carry
    /// three tiers (services → per-service → members/apps), the members,
    /// apps, and accounts authorities sign leaves only. `None` for leaf
    /// roles.
    pub fn authority_depth(&self) -> Option<u32> {
        match self {
            EntityRole::NetworkCa => Some(3),
            EntityRole::ServicesCa => Some(2),
            EntityRole::ServiceCa => Some(1),
            EntityRole::AccountsCa | EntityRole::MembersCa | EntityRole::AppsCa => Some(0),
            _ => None,
        }
    }

    /// Matches a role label (the Common Name label preceding the network
    /// domain) against the token table.
    ///
    /// Keeps the longest token for which the label is either the token
    /// itself or `<token>-<decimal>`; the decimal part becomes the service
    /// id. A structurally matching decimal above `u32::MAX` is
    /// [`Error::ServiceIdOutOfRange`]; a label matching no token is
    /// [`Error::UnknownRole`].
    pub fn match_label(label: &str) -> Result<(EntityRole, Option<u32>)> {
        let mut best: Option<(&RoleSpec, Option<&str>)> = None;

        for row in ROLE_TABLE {
            let suffix = if label == row.token {
                Some(None)
            } else {
                label
                    .strip_prefix(row.token)
                    .and_then(|rest| rest.strip_prefix('-'))
                    .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                    .map(Some)
            };

            if let Some(sid) = suffix {
                let longer = best.is_none_or(|(prev, _)| row.token.len() > prev.token.len());
                if longer {
                    best = Some((row, sid));
                }
            }
        }

        let (row, sid_digits) = best.ok_or_else(|| Error::UnknownRole {
            label: label.to_string(),
        })?;

        let service_id = match sid_digits {
            None => None,
            Some(digits) => {
                let value: u64 = digits
                    .parse()
                    .map_err(|_| Error::ServiceIdOutOfRange { value: u64::MAX })?;
                if value > u64::from(u32::MAX) {
                    return Err(Error::ServiceIdOutOfRange { value });
                }
                Some(value as u32)
            }
        };

        // A service id on a role that takes none (or the reverse) means the
        // label belongs to no known role.
        if service_id.is_some() != row.requires_service_id {
            return Err(Error::UnknownRole {
                label: label.to_string(),
            });
        }

        Ok((row.role, service_id))
    }
}

impl fmt::Display for EntityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRole::Anonymous => write!(f, "anonymous"),
            _ => write!(f, "{}", self.token()),
        }
    }
}
