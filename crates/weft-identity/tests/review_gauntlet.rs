//! Adversarial review gauntlet: hand-crafted requests probing every gate of
//! the issuing authority, plus property tests for the identity codec.

use proptest::prelude::*;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose,
};
use uuid::Uuid;
use weft_identity::{
    AuthorityHierarchy, AuthorityKind, CommonName, EntityRole, Error, IssuingAuthority,
    MemoryStorage, SigningRequest,
};

const NET: &str = "example.test";

fn accounts_authority() -> IssuingAuthority {
    let storage = MemoryStorage::new();
    let hierarchy = AuthorityHierarchy::new(NET);
    let root = hierarchy.create_root(&storage, None, false).unwrap();
    hierarchy
        .provision(AuthorityKind::Accounts, &root, &storage, None, false)
        .unwrap()
}

fn account_cn() -> String {
    format!("{}.account.{NET}", Uuid::new_v4())
}

/// Crafts a request with full control over SANs, DN attributes, and key
/// usage declarations.
fn craft(
    key: &KeyPair,
    common_name: &str,
    sans: &[&str],
    extra_dn: &[(DnType, &str)],
    declare_key_usage: bool,
) -> SigningRequest {
    let mut params =
        CertificateParams::new(sans.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    for (kind, value) in extra_dn {
        dn.push(kind.clone(), *value);
    }
    params.distinguished_name = dn;

    if declare_key_usage {
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
    }

    let csr = params.serialize_request(key).unwrap();
    SigningRequest::from_pem(csr.pem().unwrap()).unwrap()
}

fn p256() -> KeyPair {
    KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap()
}

#[test]
fn well_formed_request_passes_review() {
    let authority = accounts_authority();
    let cn = account_cn();
    let request = craft(&p256(), &cn, &[&cn], &[], true);

    let identity = authority.review_request(&request).unwrap();
    assert_eq!(identity.role, EntityRole::Account);
}

#[test]
fn missing_san_is_rejected() {
    let authority = accounts_authority();
    let cn = account_cn();
    let request = craft(&p256(), &cn, &[], &[], true);

    assert!(matches!(
        authority.review_request(&request),
        Err(Error::MissingSubjectAltName)
    ));
}

#[test]
fn two_sans_are_rejected() {
    let authority = accounts_authority();
    let cn = account_cn();
    let other = account_cn();
    let request = craft(&p256(), &cn, &[&cn, &other], &[], true);

    assert!(matches!(
        authority.review_request(&request),
        Err(Error::TooManySubjectAltNames { count: 2 })
    ));
}

#[test]
fn san_mismatch_is_rejected() {
    let authority = accounts_authority();
    let cn = account_cn();
    let other = account_cn();
    let request = craft(&p256(), &cn, &[&other], &[], true);

    assert!(matches!(
        authority.review_request(&request),
        Err(Error::SubjectAltNameMismatch { .. })
    ));
}

#[test]
fn ignorable_dn_attributes_are_allowed() {
    let authority = accounts_authority();
    let cn = account_cn();
    let request = craft(
        &p256(),
        &cn,
        &[&cn],
        &[
            (DnType::CountryName, "DE"),
            (DnType::StateOrProvinceName, "Berlin"),
            (DnType::LocalityName, "Berlin"),
            (DnType::OrganizationName, "weft"),
        ],
        true,
    );

    authority.review_request(&request).unwrap();
}

#[test]
fn forbidden_dn_attribute_is_rejected() {
    let authority = accounts_authority();
    let cn = account_cn();
    let request = craft(
        &p256(),
        &cn,
        &[&cn],
        &[(DnType::OrganizationalUnitName, "intruders")],
        true,
    );

    assert!(matches!(
        authority.review_request(&request),
        Err(Error::MalformedSubject { .. })
    ));
}

#[test]
fn missing_key_usage_fails_at_signing() {
    let authority = accounts_authority();
    let cn = account_cn();
    let request = craft(&p256(), &cn, &[&cn], &[], false);

    // Review does not require a key usage declaration...
    authority.review_request(&request).unwrap();
    // ...but signing does: every issued certificate declares its usage.
    assert!(matches!(
        authority.sign(&request, None),
        Err(Error::MissingKeyUsageExtension)
    ));
}

#[test]
fn unknown_role_is_rejected() {
    let authority = accounts_authority();
    let cn = format!("{}.gateway.{NET}", Uuid::new_v4());
    let request = craft(&p256(), &cn, &[&cn], &[], true);

    assert!(matches!(
        authority.review_request(&request),
        Err(Error::UnknownRole { .. })
    ));
}

#[test]
fn authority_role_snuck_into_leaf_request_is_rejected() {
    // "members-ca-5" shares a prefix with "member"; the codec must classify
    // it as the authority role, which the accounts table then refuses.
    let authority = accounts_authority();
    let cn = format!("members-ca-5.{NET}");
    let request = craft(&p256(), &cn, &[&cn], &[], true);

    assert!(matches!(
        authority.review_request(&request),
        Err(Error::RoleNotAccepted {
            role: EntityRole::MembersCa
        })
    ));
}

#[test]
fn unsupported_signature_algorithm_is_rejected() {
    let authority = accounts_authority();
    let cn = account_cn();
    let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).unwrap();
    let request = craft(&key, &cn, &[&cn], &[], true);

    assert!(matches!(
        authority.review_request(&request),
        Err(Error::UnsupportedAlgorithm { .. })
    ));
}

#[test]
fn ed25519_requests_are_accepted() {
    let authority = accounts_authority();
    let cn = account_cn();
    let key = KeyPair::generate_for(&rcgen::PKCS_ED25519).unwrap();
    let request = craft(&key, &cn, &[&cn], &[], true);

    let identity = authority.review_request(&request).unwrap();
    assert_eq!(identity.role, EntityRole::Account);

    let signed = authority.sign(&request, None).unwrap();
    assert_eq!(signed.certificate().subject_common_name().unwrap(), cn);
}

#[test]
fn every_role_off_the_table_is_refused() {
    let authority = accounts_authority();
    for role in [
        EntityRole::Member,
        EntityRole::MemberData,
        EntityRole::Service,
        EntityRole::ServiceData,
        EntityRole::App,
        EntityRole::AppData,
        EntityRole::NetworkData,
    ] {
        let identifier = Some(Uuid::new_v4());
        let service_id = role.requires_service_id().then_some(3);
        let cn = CommonName::encode(role, identifier, service_id, NET).unwrap();
        let request = craft(&p256(), cn.as_str(), &[cn.as_str()], &[], true);

        assert!(
            matches!(
                authority.review_request(&request),
                Err(Error::RoleNotAccepted { role: r }) if r == role
            ),
            "{role} must be refused by the accounts authority"
        );
    }
}

fn all_roles() -> Vec<EntityRole> {
    vec![
        EntityRole::Account,
        EntityRole::AccountData,
        EntityRole::Member,
        EntityRole::MemberData,
        EntityRole::Service,
        EntityRole::ServiceData,
        EntityRole::ServiceCa,
        EntityRole::App,
        EntityRole::AppData,
        EntityRole::AccountsCa,
        EntityRole::ServicesCa,
        EntityRole::MembersCa,
        EntityRole::AppsCa,
        EntityRole::NetworkData,
        EntityRole::NetworkCa,
    ]
}

proptest! {
    /// Round-trip law: decode(encode(x)) == x for every valid tuple.
    #[test]
    fn encode_decode_roundtrip(
        role in prop::sample::select(all_roles()),
        bytes in any::<[u8; 16]>(),
        sid in any::<u32>(),
    ) {
        let identifier = role.requires_identifier().then(|| Uuid::from_bytes(bytes));
        let service_id = role.requires_service_id().then_some(sid);

        let cn = CommonName::encode(role, identifier, service_id, NET).unwrap();
        let decoded = CommonName::decode(
            cn.as_str(),
            NET,
            role.requires_identifier(),
            role.requires_service_id(),
        )
        .unwrap();

        prop_assert_eq!(decoded.role, role);
        prop_assert_eq!(decoded.identifier, identifier);
        prop_assert_eq!(decoded.service_id, service_id);
    }

    /// Every name not ending in the network domain is malformed, whatever
    /// the role.
    #[test]
    fn wrong_domain_is_always_malformed(
        role in prop::sample::select(all_roles()),
        bytes in any::<[u8; 16]>(),
        sid in any::<u32>(),
    ) {
        let identifier = role.requires_identifier().then(|| Uuid::from_bytes(bytes));
        let service_id = role.requires_service_id().then_some(sid);
        let cn = CommonName::encode(role, identifier, service_id, NET).unwrap();

        let is_malformed = matches!(
            weft_identity::decode_identity(cn.as_str(), "elsewhere.test"),
            Err(Error::MalformedName { .. })
        );
        prop_assert!(is_malformed);
    }

    /// Decoding arbitrary input returns an error or an identity; it never
    /// panics.
    #[test]
    fn decode_is_total(input in "\\PC{0,80}") {
        let _ = weft_identity::decode_identity(&input, NET);
    }
}
