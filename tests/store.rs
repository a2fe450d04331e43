mod util;

use std::sync::Arc;
use std::thread;

use pkikit::cert::extensions::ExtensionSet;
use pkikit::cert::params::{DistinguishedName, Serial, Validity};
use pkikit::issuer::{CertificateAuthority, Issuer};
use pkikit::key::KeyPair;
use pkikit::store::CaStore;
use pkikit::{PkiKitError, Result};

fn issue_leaf(ca: &CertificateAuthority, common_name: &str, serial: u64) -> Result<pkikit::cert::SignedCertificate> {
    let key = KeyPair::generate_ed25519();
    ca.issue(
        DistinguishedName::build([("CN", common_name)])?,
        key.public_key(),
        Serial::from_u64(serial),
        Validity::for_days(1),
        ExtensionSet::empty(),
    )
}

/// Adding the same certificate twice succeeds and leaves one entry.
#[test]
fn add_is_idempotent() -> Result<()> {
    let ca = util::generate_ecdsa_ca("Idempotent Root");
    let store = CaStore::new();

    store.add(ca.certificate().clone())?;
    let before = store.snapshot();
    store.add(ca.certificate().clone())?;

    assert_eq!(store.len(), 1);
    assert!(Arc::ptr_eq(&before, &store.snapshot()));
    let found = store
        .lookup(ca.certificate().issuer(), ca.certificate().serial())
        .unwrap();
    assert_eq!(found.as_ref(), ca.certificate());
    Ok(())
}

/// A different certificate under an existing issuer and serial is refused.
#[test]
fn add_conflicting_entry_fails() -> Result<()> {
    let ca = util::generate_ecdsa_ca("Conflict Root");
    let store = CaStore::new();

    store.add(issue_leaf(&ca, "first.example", 42)?)?;
    let err = store.add(issue_leaf(&ca, "second.example", 42)?).unwrap_err();

    assert!(matches!(err, PkiKitError::ConflictingEntry(_)));
    assert_eq!(store.len(), 1);
    assert_eq!(
        store
            .lookup(ca.issuer_name(), &Serial::from_u64(42))
            .unwrap()
            .subject()
            .common_name(),
        Some("first.example")
    );
    Ok(())
}

/// A two-level chain verifies while the anchor is present and not after removal.
#[test]
fn chain_breaks_when_anchor_removed() -> Result<()> {
    let ca = util::generate_ecdsa_ca("Removable Root");
    let leaf = issue_leaf(&ca, "leaf.example", 7)?;
    let store = CaStore::new();
    store.add(ca.certificate().clone())?;

    assert_eq!(store.verify_chain(&leaf)?.len(), 2);

    let removed = store.remove(ca.certificate().issuer(), ca.certificate().serial());
    assert!(removed.is_some());
    assert!(matches!(
        store.verify_chain(&leaf),
        Err(PkiKitError::ChainIncomplete(_))
    ));
    Ok(())
}

/// A leaf claiming a stored root as issuer but signed by another key fails verification.
#[test]
fn chain_rejects_foreign_signature() -> Result<()> {
    let trusted = util::generate_ecdsa_ca("Shared Name");
    let impostor = util::generate_ecdsa_ca("Shared Name");
    let store = CaStore::new();
    store.add(trusted.certificate().clone())?;

    let forged = issue_leaf(&impostor, "victim.example", 5)?;
    assert!(matches!(
        store.verify_chain(&forged),
        Err(PkiKitError::SignatureInvalid(_))
    ));
    Ok(())
}

/// Readers verifying chains never observe a half-written store.
#[test]
fn concurrent_adds_and_verification() -> Result<()> {
    let ca = Arc::new(util::generate_ecdsa_ca("Concurrent Root"));
    let store = Arc::new(CaStore::new());
    store.add(ca.certificate().clone())?;

    let writers: Vec<_> = (0..4u64)
        .map(|worker| {
            let ca = Arc::clone(&ca);
            let store = Arc::clone(&store);
            thread::spawn(move || -> Result<()> {
                for i in 0..8u64 {
                    let serial = 100 + worker * 8 + i;
                    let leaf = issue_leaf(&ca, &format!("leaf-{serial}.example"), serial)?;
                    store.add(leaf.clone())?;
                    assert_eq!(store.verify_chain(&leaf)?.len(), 2);
                }
                Ok(())
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap()?;
    }
    assert_eq!(store.len(), 1 + 4 * 8);
    Ok(())
}
