//! Offline chain-of-trust validation.
//!
//! Given a leaf certificate, its intermediate chain (closest-to-leaf first,
//! as returned by signing), and a trusted root, proves the leaf is reachable
//! from the root through valid signatures and issuer/subject linkage.
//! Revocation is not evaluated.

use crate::certificate::Certificate;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use x509_parser::prelude::{FromDer, X509Certificate};

/// Validates the path `leaf -> chain[0] -> .. -> chain[n-1] -> trusted_root`
/// at the given instant.
///
/// # Errors
///
/// - [`Error::ChainBroken`] when a signature inside the path does not verify
///   or issuer/subject names do not chain; the failing link is retained.
/// - [`Error::ExpiredCertificate`] when any certificate in the path is
///   outside its validity window at `at`.
/// - [`Error::UntrustedRoot`] when the path does not terminate at
///   `trusted_root`.
pub fn validate_chain(
    leaf: &Certificate,
    chain: &[Certificate],
    trusted_root: &Certificate,
    at: DateTime<Utc>,
) -> Result<()> {
    let mut path = Vec::with_capacity(chain.len() + 1);
    path.push(parse(leaf)?);
    for cert in chain {
        path.push(parse(cert)?);
    }
    let root = parse(trusted_root)?;

    for cert in path.iter().chain(std::iter::once(&root)) {
        let ts = at.timestamp();
        let validity = cert.validity();
        if ts < validity.not_before.timestamp() || ts > validity.not_after.timestamp() {
            return Err(Error::ExpiredCertificate {
                subject: cert.subject().to_string(),
            });
        }
    }

    for index in 0..path.len() {
        let child = &path[index];
        let terminal = index + 1 == path.len();
        let parent = if terminal { &root } else { &path[index + 1] };

        let linked = child.issuer().as_raw() == parent.subject().as_raw();
        let verified = linked
            && child
                .verify_signature(Some(parent.public_key()))
                .is_ok();

        if !verified {
            if terminal {
                return Err(Error::UntrustedRoot {
                    subject: child.subject().to_string(),
                });
            }
            return Err(Error::ChainBroken {
                link: child.subject().to_string(),
                detail: if linked {
                    format!("signature does not verify against {}", parent.subject())
                } else {
                    format!(
                        "issuer {} does not match next subject {}",
                        child.issuer(),
                        parent.subject()
                    )
                },
            });
        }
    }

    Ok(())
}

fn parse(cert: &Certificate) -> Result<X509Certificate<'_>> {
    let (_, parsed) = X509Certificate::from_der(cert.der())
        .map_err(|e| Error::Certificate(format!("failed to parse certificate: {e}")))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{AuthorityPolicy, Expiration, IssuingAuthority};
    use crate::credential::{Credential, ExpiryThresholds, StorePaths};
    use crate::name::CommonName;
    use crate::role::EntityRole;
    use uuid::Uuid;

    const NET: &str = "example.test";

    fn root_authority() -> IssuingAuthority {
        let cn = CommonName::encode(EntityRole::NetworkCa, None, None, NET).unwrap();
        let mut credential = Credential::new(
            cn,
            StorePaths::for_label("root"),
            ExpiryThresholds::authority(),
        );
        credential.create_self_signed(10_950, true).unwrap();
        IssuingAuthority::new(
            credential,
            AuthorityPolicy::new(3, true).accept(EntityRole::AccountsCa, 730),
        )
    }

    fn signed_leaf(root: &IssuingAuthority) -> (Certificate, Vec<Certificate>) {
        let cn = CommonName::encode(EntityRole::AccountsCa, None, None, NET).unwrap();
        let mut accounts = Credential::new(
            cn,
            StorePaths::for_label("accounts"),
            ExpiryThresholds::authority(),
        );
        let request = accounts.create_request(&[], false).unwrap();
        root.sign(&request, None).unwrap().into_parts()
    }

    #[test]
    fn test_direct_root_signature_validates() {
        let root = root_authority();
        let root_cert = root.credential().certificate().unwrap().clone();
        let (leaf, chain) = signed_leaf(&root);
        assert!(chain.is_empty());

        validate_chain(&leaf, &chain, &root_cert, chrono::Utc::now()).unwrap();
    }

    #[test]
    fn test_foreign_root_is_untrusted() {
        let root = root_authority();
        let (leaf, chain) = signed_leaf(&root);

        // A different self-signed root with the very same name.
        let foreign = root_authority();
        let foreign_cert = foreign.credential().certificate().unwrap().clone();

        assert!(matches!(
            validate_chain(&leaf, &chain, &foreign_cert, chrono::Utc::now()),
            Err(Error::UntrustedRoot { .. })
        ));
    }

    #[test]
    fn test_unrelated_intermediate_breaks_the_chain() {
        let root = root_authority();
        let root_cert = root.credential().certificate().unwrap().clone();
        let (leaf, _) = signed_leaf(&root);

        // Splice a certificate that has nothing to do with the leaf.
        let other = root_authority();
        let splice = other.credential().certificate().unwrap().clone();

        assert!(matches!(
            validate_chain(&leaf, &[splice], &root_cert, chrono::Utc::now()),
            Err(Error::ChainBroken { .. })
        ));
    }

    #[test]
    fn test_expired_leaf_is_rejected() {
        let root = root_authority();
        let root_cert = root.credential().certificate().unwrap().clone();

        let cn = CommonName::encode(EntityRole::AccountsCa, None, None, NET).unwrap();
        let mut accounts = Credential::new(
            cn,
            StorePaths::for_label("accounts"),
            ExpiryThresholds::authority(),
        );
        let request = accounts.create_request(&[], false).unwrap();
        let (leaf, chain) = root
            .sign(&request, Some(Expiration::Days(1)))
            .unwrap()
            .into_parts();

        let future = chrono::Utc::now() + chrono::Duration::days(3);
        assert!(matches!(
            validate_chain(&leaf, &chain, &root_cert, future),
            Err(Error::ExpiredCertificate { .. })
        ));
    }
}
