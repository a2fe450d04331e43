mod util;

use pkikit::cert::SignedCertificate;
use pkikit::cert::extensions::{AltName, Extension, ExtensionSet, NsCertType};
use pkikit::cert::params::{AttributeType, DistinguishedName, Serial, Validity};
use pkikit::csr::{CsrAttributeType, SignedCsr};
use pkikit::issuer::Issuer;
use pkikit::key::{KeyAlgorithm, KeyPair};
use pkikit::signer::Signer;
use pkikit::store::CaStore;
use pkikit::tbs_certificate::CertificateTemplate;
use pkikit::{PemEncodable, PkiKitError, Result};
use x509_cert::der::Decode;

/// Builds the BlacklightOps root and checks it is a valid self-signed CA.
#[test]
fn generate_self_signed_ca() -> Result<()> {
    let ca = util::generate_ca();
    let cert = ca.certificate();

    cert.verify_self_signed()?;
    assert_eq!(cert.issuer(), cert.subject());
    assert_eq!(cert.subject(), &util::blacklightops_subject());
    assert_eq!(cert.public_key().algorithm(), KeyAlgorithm::Rsa { bits: 2048 });
    assert!(cert.is_ca());
    assert_eq!(cert.authority_key_id(), cert.subject_key_id());
    assert!(cert.subject_key_id().is_some());

    let pem = cert.to_pem()?;
    util::write_debug_pem("ca_cert", &pem);

    let decoded = SignedCertificate::from_pem(&pem)?;
    assert_eq!(&decoded, cert);
    assert_eq!(decoded.extensions(), cert.extensions());
    decoded.verify_self_signed()?;

    // Parse with x509-cert to make sure the structure is standard.
    let parsed = x509_cert::Certificate::from_der(&cert.to_der()?).unwrap();
    assert_eq!(parsed.tbs_certificate.issuer, parsed.tbs_certificate.subject);
    assert_eq!(parsed.tbs_certificate.extensions.unwrap().len(), 7);
    Ok(())
}

/// The reference flow's minimal CA subject, built exactly as listed.
#[test]
fn minimal_ca_subject_is_preserved() -> Result<()> {
    let subject = DistinguishedName::build([
        ("commonName", "blacklightops.com"),
        ("countryName", "US"),
        ("organizationName", "BlacklightOps"),
    ])?;
    let key = KeyPair::generate_rsa(2048)?;
    let template = CertificateTemplate::new(
        subject.clone(),
        subject.clone(),
        key.public_key(),
        Serial::from_u64(1),
        Validity::for_years(1),
        ExtensionSet::build([Extension::BasicConstraints(
            pkikit::cert::extensions::BasicConstraints {
                is_ca: true,
                max_path_length: None,
            },
        )])?,
    )?;
    let cert = Signer::default().sign_default(template, &key)?;

    cert.verify_self_signed()?;
    assert_eq!(cert.issuer(), &subject);
    assert_eq!(cert.subject().get(AttributeType::Organization), Some("BlacklightOps"));
    assert_eq!(cert.subject().to_string(), "CN=blacklightops.com, C=US, O=BlacklightOps");
    Ok(())
}

/// Builds the example.org request and checks its proof of possession.
#[test]
fn generate_csr() -> Result<()> {
    let client_key = KeyPair::generate_rsa(1024)?;
    let csr = util::example_org_csr(&client_key);

    csr.verify()?;
    let template = csr.template();
    assert_eq!(
        template.attributes().get(CsrAttributeType::ChallengePassword),
        Some("password")
    );
    assert_eq!(
        template.attributes().get(CsrAttributeType::UnstructuredName),
        Some("My Company, Inc.")
    );
    let san = template.requested_extensions().subject_alt_name().unwrap();
    assert_eq!(san.names[0], AltName::Dns("test.domain.com".to_string()));
    assert_eq!(san.names[1], AltName::Dns("other.domain.com".to_string()));

    let pem = csr.to_pem()?;
    util::write_debug_pem("client_csr", &pem);
    let decoded = SignedCsr::from_pem(&pem)?;
    assert_eq!(decoded, csr);
    decoded.verify()?;
    Ok(())
}

/// Issues the client certificate from the request and verifies it up to the root.
#[test]
fn issue_client_cert_from_csr() -> Result<()> {
    let ca = util::generate_ca();
    let client_key = KeyPair::generate_ecdsa_p256();
    let csr = util::example_org_csr(&client_key);

    let client = ca.issue_from_csr(
        &csr,
        Serial::from_hex("02")?,
        Validity::for_years(1),
        util::client_extensions(),
    )?;
    util::write_debug_pem("client_cert", &client.to_pem()?);

    assert_eq!(client.subject(), csr.subject());
    assert_eq!(client.issuer(), ca.issuer_name());
    assert_eq!(client.public_key(), csr.public_key());
    assert_eq!(
        client.extensions().subject_alt_name(),
        csr.template().requested_extensions().subject_alt_name()
    );
    assert_eq!(client.authority_key_id(), ca.certificate().subject_key_id());
    client.verify_signature(ca.certificate().public_key())?;
    assert!(client.verify_self_signed().is_err());

    let store = CaStore::new();
    store.add(ca.certificate().clone())?;
    store.add(client.clone())?;
    let path = store.verify_chain(&client)?;
    assert_eq!(path.len(), 2);
    assert_eq!(&path[0], &client);
    assert_eq!(&path[1], ca.certificate());
    Ok(())
}

/// A client certificate reusing the CA's serial verifies, but cannot be stored next to it.
#[test]
fn client_cert_with_ca_serial() -> Result<()> {
    let ca = util::generate_ca();
    let client_key = KeyPair::generate_ecdsa_p256();
    let csr = util::example_org_csr(&client_key);
    let client = ca.issue_from_csr(
        &csr,
        Serial::from_hex("01")?,
        Validity::for_years(1),
        util::client_extensions(),
    )?;
    assert_eq!(client.id(), ca.certificate().id());

    let store = CaStore::new();
    store.add(ca.certificate().clone())?;
    let path = store.verify_chain(&client)?;
    assert_eq!(path, vec![client.clone(), ca.certificate().clone()]);

    let err = store.add(client).unwrap_err();
    assert!(matches!(err, PkiKitError::ConflictingEntry(_)));
    assert_eq!(store.len(), 1);
    Ok(())
}

/// Signs the same template shape with every supported key type.
#[test]
fn sign_and_verify_all_key_types() -> Result<()> {
    let keys = [
        KeyPair::generate_rsa(1024)?,
        KeyPair::generate_ecdsa_p256(),
        KeyPair::generate_ecdsa_p384(),
        KeyPair::generate_ed25519(),
    ];
    for issuer_key in &keys {
        let subject_key = KeyPair::generate_ed25519();
        let template = CertificateTemplate::new(
            DistinguishedName::build([("CN", "leaf.example")])?,
            DistinguishedName::build([("CN", "issuer.example")])?,
            subject_key.public_key(),
            Serial::random(),
            Validity::for_days(7),
            ExtensionSet::empty(),
        )?;
        let cert = Signer::default().sign_default(template, issuer_key)?;
        cert.verify_signature(&issuer_key.public_key())?;

        let decoded = SignedCertificate::from_der(&cert.to_der()?)?;
        decoded.verify_signature(&issuer_key.public_key())?;
        assert_eq!(decoded.signature_algorithm(), cert.signature_algorithm());
    }
    Ok(())
}

/// A signature copied onto a template with any one field changed no longer verifies.
#[test]
fn signatures_are_field_sensitive() -> Result<()> {
    let ca = util::generate_ecdsa_ca("Field Root");
    let subject_key = KeyPair::generate_ecdsa_p256();
    let original = ca.issue(
        DistinguishedName::build([("CN", "leaf.example")])?,
        subject_key.public_key(),
        Serial::from_u64(10),
        Validity::for_days(7),
        ExtensionSet::empty(),
    )?;
    let base = original.template();
    let other_key = KeyPair::generate_ecdsa_p256();

    let variants = [
        CertificateTemplate::new(
            DistinguishedName::build([("CN", "evil.example")])?,
            base.issuer().clone(),
            base.public_key().clone(),
            base.serial().clone(),
            base.validity().clone(),
            base.extensions().clone(),
        )?,
        CertificateTemplate::new(
            base.subject().clone(),
            base.issuer().clone(),
            other_key.public_key(),
            base.serial().clone(),
            base.validity().clone(),
            base.extensions().clone(),
        )?,
        CertificateTemplate::new(
            base.subject().clone(),
            base.issuer().clone(),
            base.public_key().clone(),
            Serial::from_u64(11),
            base.validity().clone(),
            base.extensions().clone(),
        )?,
        CertificateTemplate::new(
            base.subject().clone(),
            base.issuer().clone(),
            base.public_key().clone(),
            base.serial().clone(),
            Validity::for_days(3650),
            base.extensions().clone(),
        )?,
        CertificateTemplate::new(
            base.subject().clone(),
            base.issuer().clone(),
            base.public_key().clone(),
            base.serial().clone(),
            base.validity().clone(),
            base.extensions()
                .clone()
                .extend_with([Extension::NsCertType(NsCertType(
                    pkikit::cert::extensions::NsCertTypes::Server.into(),
                ))])?,
        )?,
    ];

    for template in variants {
        let forged = SignedCertificate::from_parts(
            template,
            original.signature_algorithm(),
            original.signature().to_vec(),
        )?;
        assert!(forged.verify_signature(ca.certificate().public_key()).is_err());
    }
    original.verify_signature(ca.certificate().public_key())?;
    Ok(())
}

/// Private keys survive a PKCS#8 PEM round trip and still sign for their certificate.
#[test]
fn private_key_pem_round_trip() -> Result<()> {
    let ca = util::generate_ecdsa_ca("Key Root");
    let pem = ca.key().to_pem()?;
    let restored = KeyPair::from_pem(&pem)?;
    let reloaded = pkikit::issuer::CertificateAuthority::new(
        SignedCertificate::from_pem(&ca.certificate().to_pem()?)?,
        restored,
    )?;

    let leaf_key = KeyPair::generate_ed25519();
    let leaf = reloaded.issue(
        DistinguishedName::build([("CN", "reloaded.example")])?,
        leaf_key.public_key(),
        Serial::from_u64(3),
        Validity::for_days(1),
        ExtensionSet::empty(),
    )?;
    leaf.verify_signature(ca.certificate().public_key())?;
    Ok(())
}
