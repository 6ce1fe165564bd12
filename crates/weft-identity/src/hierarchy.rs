//! The fixed authority graph of a weft network.
//!
//! ```text
//! network root (ca.<network>)
//!   ├── accounts authority (accounts-ca.<network>)
//!   └── services authority (services-ca.<network>)
//!         └── service authority (service-ca-<sid>.<network>)
//!               ├── members authority (members-ca-<sid>.<network>)
//!               └── apps authority (apps-ca-<sid>.<network>)
//! ```
//!
//! Everything here is resolved purely from the network name and a service
//! id; there is no runtime discovery. The default policy tables and validity
//! periods are the interoperability contract existing deployments rely on:
//! they are configuration, and overridable, but the defaults must not drift.

use crate::authority::{AuthorityPolicy, IssuingAuthority};
use crate::credential::{Credential, ExpiryThresholds, StorePaths};
use crate::name::CommonName;
use crate::role::EntityRole;
use crate::storage::Storage;
use crate::Result;

/// Self-signed lifetime of the network root, in days (~30 years, never
/// renewed).
pub const ROOT_VALIDITY_DAYS: u32 = 10_950;

/// Validity granted to intermediate authority certificates, in days.
pub const AUTHORITY_VALIDITY_DAYS: u32 = 730;

/// Validity granted to leaf certificates, in days.
pub const LEAF_VALIDITY_DAYS: u32 = 365;

/// One of the concrete authorities of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorityKind {
    /// The self-signed trust root.
    NetworkRoot,
    /// Network-level authority for accounts.
    Accounts,
    /// Network-level authority for services.
    Services,
    /// The authority of one service.
    Service(u32),
    /// The members authority of one service.
    Members(u32),
    /// The apps authority of one service.
    Apps(u32),
}

impl AuthorityKind {
    /// The role this authority presents on its own certificate.
    pub fn role(&self) -> EntityRole {
        match self {
            AuthorityKind::NetworkRoot => EntityRole::NetworkCa,
            AuthorityKind::Accounts => EntityRole::AccountsCa,
            AuthorityKind::Services => EntityRole::ServicesCa,
            AuthorityKind::Service(_) => EntityRole::ServiceCa,
            AuthorityKind::Members(_) => EntityRole::MembersCa,
            AuthorityKind::Apps(_) => EntityRole::AppsCa,
        }
    }

    /// The service id this authority is scoped to, when per-service.
    pub fn service_id(&self) -> Option<u32> {
        match self {
            AuthorityKind::Service(sid) | AuthorityKind::Members(sid) | AuthorityKind::Apps(sid) => {
                Some(*sid)
            }
            _ => None,
        }
    }

    /// The authority this one requests its own certificate from.
    pub fn parent(&self) -> Option<AuthorityKind> {
        match self {
            AuthorityKind::NetworkRoot => None,
            AuthorityKind::Accounts | AuthorityKind::Services => Some(AuthorityKind::NetworkRoot),
            AuthorityKind::Service(_) => Some(AuthorityKind::Services),
            AuthorityKind::Members(sid) | AuthorityKind::Apps(sid) => {
                Some(AuthorityKind::Service(*sid))
            }
        }
    }

    /// Storage label, used in `ca/<label>.crt` / `ca/<label>.key` paths.
    pub fn label(&self) -> String {
        match self {
            AuthorityKind::NetworkRoot => "root".to_string(),
            AuthorityKind::Accounts => "accounts".to_string(),
            AuthorityKind::Services => "services".to_string(),
            AuthorityKind::Service(sid) => format!("service-{sid}"),
            AuthorityKind::Members(sid) => format!("members-{sid}"),
            AuthorityKind::Apps(sid) => format!("apps-{sid}"),
        }
    }

    /// The roles this authority signs and the validity granted to each.
    pub fn default_policy(&self) -> AuthorityPolicy {
        match self {
            AuthorityKind::NetworkRoot => AuthorityPolicy::new(3, true)
                .accept(EntityRole::AccountsCa, AUTHORITY_VALIDITY_DAYS)
                .accept(EntityRole::ServicesCa, AUTHORITY_VALIDITY_DAYS),
            AuthorityKind::Accounts => AuthorityPolicy::new(0, false)
                .accept(EntityRole::Account, LEAF_VALIDITY_DAYS)
                .accept(EntityRole::AccountData, LEAF_VALIDITY_DAYS),
            AuthorityKind::Services => AuthorityPolicy::new(2, true)
                .accept(EntityRole::ServiceCa, AUTHORITY_VALIDITY_DAYS)
                .accept(EntityRole::NetworkData, LEAF_VALIDITY_DAYS),
            AuthorityKind::Service(_) => AuthorityPolicy::new(1, true)
                .accept(EntityRole::MembersCa, AUTHORITY_VALIDITY_DAYS)
                .accept(EntityRole::AppsCa, AUTHORITY_VALIDITY_DAYS)
                .accept(EntityRole::Service, LEAF_VALIDITY_DAYS)
                .accept(EntityRole::ServiceData, LEAF_VALIDITY_DAYS),
            AuthorityKind::Members(_) => AuthorityPolicy::new(0, false)
                .accept(EntityRole::Member, LEAF_VALIDITY_DAYS)
                .accept(EntityRole::MemberData, LEAF_VALIDITY_DAYS),
            AuthorityKind::Apps(_) => AuthorityPolicy::new(0, false)
                .accept(EntityRole::App, LEAF_VALIDITY_DAYS)
                .accept(EntityRole::AppData, LEAF_VALIDITY_DAYS),
        }
    }
}

/// Resolves the concrete authorities of one network.
#[derive(Debug, Clone)]
pub struct AuthorityHierarchy {
    network: String,
}

impl AuthorityHierarchy {
    /// Creates the hierarchy for a network domain.
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
        }
    }

    /// The network domain.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// The Common Name of an authority in this network.
    pub fn common_name(&self, kind: AuthorityKind) -> CommonName {
        CommonName::encode(kind.role(), None, kind.service_id(), &self.network)
            .expect("authority names always encode")
    }

    /// An empty credential for an authority, with its conventional storage
    /// paths and authority renewal thresholds.
    pub fn credential(&self, kind: AuthorityKind) -> Credential {
        Credential::new(
            self.common_name(kind),
            StorePaths::for_label(&kind.label()),
            ExpiryThresholds::authority(),
        )
    }

    /// Loads an authority's credential from storage and pairs it with its
    /// default policy table.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotFound`] when the authority has not been
    /// provisioned, plus everything [`Credential::load`] raises.
    pub fn open(
        &self,
        kind: AuthorityKind,
        storage: &dyn Storage,
        password: Option<&str>,
    ) -> Result<IssuingAuthority> {
        let mut credential = self.credential(kind);
        credential.load(storage, true, password)?;
        Ok(IssuingAuthority::new(credential, kind.default_policy()))
    }

    /// Creates and persists the self-signed network root, returning it as
    /// an issuing authority.
    ///
    /// # Errors
    ///
    /// [`crate::Error::AlreadyExists`] when a root is already stored and
    /// `overwrite` is not set.
    pub fn create_root(
        &self,
        storage: &dyn Storage,
        password: Option<&str>,
        overwrite: bool,
    ) -> Result<IssuingAuthority> {
        let mut credential = self.credential(AuthorityKind::NetworkRoot);
        credential.create_self_signed(ROOT_VALIDITY_DAYS, true)?;
        credential.save(storage, password, overwrite)?;
        Ok(IssuingAuthority::new(
            credential,
            AuthorityKind::NetworkRoot.default_policy(),
        ))
    }

    /// Requests and persists the credential for a non-root authority,
    /// signed by its parent.
    ///
    /// The parent must already be open. This is the provisioning edge of
    /// the hierarchy: each authority may only present the role its position
    /// allows, which the parent's policy table enforces.
    pub fn provision(
        &self,
        kind: AuthorityKind,
        parent: &IssuingAuthority,
        storage: &dyn Storage,
        password: Option<&str>,
        overwrite: bool,
    ) -> Result<IssuingAuthority> {
        let mut credential = self.credential(kind);
        let request = credential.create_request(&[], false)?;
        let (certificate, chain) = parent.sign(&request, None)?.into_parts();
        credential.absorb_signed(certificate, chain)?;
        credential.save(storage, password, overwrite)?;
        Ok(IssuingAuthority::new(credential, kind.default_policy()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    const NET: &str = "example.test";

    #[test]
    fn test_common_names() {
        let hierarchy = AuthorityHierarchy::new(NET);
        assert_eq!(
            hierarchy.common_name(AuthorityKind::NetworkRoot).as_str(),
            "ca.example.test"
        );
        assert_eq!(
            hierarchy.common_name(AuthorityKind::Accounts).as_str(),
            "accounts-ca.example.test"
        );
        assert_eq!(
            hierarchy.common_name(AuthorityKind::Members(9)).as_str(),
            "members-ca-9.example.test"
        );
    }

    #[test]
    fn test_parent_edges() {
        assert_eq!(AuthorityKind::NetworkRoot.parent(), None);
        assert_eq!(
            AuthorityKind::Accounts.parent(),
            Some(AuthorityKind::NetworkRoot)
        );
        assert_eq!(
            AuthorityKind::Service(4).parent(),
            Some(AuthorityKind::Services)
        );
        assert_eq!(
            AuthorityKind::Apps(4).parent(),
            Some(AuthorityKind::Service(4))
        );
    }

    #[test]
    fn test_depth_strictly_decreases() {
        for kind in [
            AuthorityKind::Accounts,
            AuthorityKind::Services,
            AuthorityKind::Service(1),
            AuthorityKind::Members(1),
            AuthorityKind::Apps(1),
        ] {
            let parent = kind.parent().unwrap();
            assert!(
                kind.default_policy().max_chain_depth_below()
                    < parent.default_policy().max_chain_depth_below(),
                "{kind:?} does not sit below {parent:?}"
            );
        }
    }

    #[test]
    fn test_provision_full_hierarchy() {
        let storage = MemoryStorage::new();
        let hierarchy = AuthorityHierarchy::new(NET);

        let root = hierarchy.create_root(&storage, None, false).unwrap();
        let accounts = hierarchy
            .provision(AuthorityKind::Accounts, &root, &storage, None, false)
            .unwrap();
        let services = hierarchy
            .provision(AuthorityKind::Services, &root, &storage, None, false)
            .unwrap();
        let service = hierarchy
            .provision(AuthorityKind::Service(7), &services, &storage, None, false)
            .unwrap();
        let members = hierarchy
            .provision(AuthorityKind::Members(7), &service, &storage, None, false)
            .unwrap();

        assert!(accounts.credential().is_ca());
        assert!(members.credential().is_ca());

        // The members authority chain reaches up to, but excludes, the root.
        let chain = members.credential().chain();
        assert_eq!(chain.len(), 2);
        assert_eq!(
            chain[0].subject_common_name().unwrap(),
            "service-ca-7.example.test"
        );
        assert_eq!(
            chain[1].subject_common_name().unwrap(),
            "services-ca.example.test"
        );

        // Reopen from storage.
        let reopened = hierarchy
            .open(AuthorityKind::Members(7), &storage, None)
            .unwrap();
        assert!(reopened.credential().is_ca());
        assert_eq!(reopened.credential().chain().len(), 2);
    }

    #[test]
    fn test_wrong_role_is_refused_by_parent() {
        let storage = MemoryStorage::new();
        let hierarchy = AuthorityHierarchy::new(NET);
        let root = hierarchy.create_root(&storage, None, false).unwrap();

        // A members authority cannot be provisioned directly under the root.
        assert!(matches!(
            hierarchy.provision(AuthorityKind::Members(1), &root, &storage, None, false),
            Err(crate::Error::RoleNotAccepted { .. })
        ));
    }
}
