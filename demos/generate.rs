//! Builds a self-signed root, a certification request and a client
//! certificate issued from it, then prints every artifact as PEM.
//!
//! Run with `RUST_LOG=debug cargo run --example generate` to see the log.

use pkikit::cert::extensions::{
    AltName, AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption,
    Extension, ExtensionSet, KeyUsage, KeyUsages, NsCertType, NsCertTypes, SubjectAltName,
    SubjectKeyIdentifier,
};
use pkikit::cert::params::{DistinguishedName, Serial, Validity};
use pkikit::csr::{AttributeUpdate, CsrAttributeType, CsrAttributes, CsrTemplate};
use pkikit::issuer::{CertificateAuthority, Issuer};
use pkikit::key::{KeyPair, RsaKeyParams};
use pkikit::signer::Signer;
use pkikit::store::CaStore;
use pkikit::{PemEncodable, Result};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let usages = KeyUsage(
        KeyUsages::KeyCertSign
            | KeyUsages::DigitalSignature
            | KeyUsages::NonRepudiation
            | KeyUsages::KeyEncipherment
            | KeyUsages::DataEncipherment,
    );

    // Root
    let ca_key = KeyPair::generate_rsa_with(&RsaKeyParams::builder().bits(2048).build())?;
    let ca_subject = DistinguishedName::build([
        ("commonName", "blacklightops.com"),
        ("countryName", "US"),
        ("ST", "California"),
        ("localityName", "Union City"),
        ("organizationName", "BlacklightOps"),
        ("OU", "TechOps"),
    ])?;
    let ca_extensions = ExtensionSet::build([
        Extension::BasicConstraints(BasicConstraints {
            is_ca: true,
            max_path_length: None,
        }),
        Extension::KeyUsage(usages),
        Extension::ExtendedKeyUsage(ExtendedKeyUsage {
            usage: vec![
                ExtendedKeyUsageOption::ServerAuth,
                ExtendedKeyUsageOption::ClientAuth,
                ExtendedKeyUsageOption::CodeSigning,
                ExtendedKeyUsageOption::EmailProtection,
                ExtendedKeyUsageOption::TimeStamping,
            ],
        }),
        Extension::NsCertType(NsCertType(
            NsCertTypes::Client
                | NsCertTypes::Server
                | NsCertTypes::Email
                | NsCertTypes::ObjSign
                | NsCertTypes::SslCa
                | NsCertTypes::EmailCa
                | NsCertTypes::ObjCa,
        )),
        Extension::SubjectAltName(SubjectAltName {
            names: vec![
                AltName::Uri("http://example.org/webid#me".to_string()),
                AltName::Ip("127.0.0.1".parse().map_err(|e| {
                    pkikit::PkiKitError::EncodingError(format!("bad IP literal: {e}"))
                })?),
            ],
        }),
        Extension::SubjectKeyIdentifier(SubjectKeyIdentifier::derived()),
        Extension::AuthorityKeyIdentifier(AuthorityKeyIdentifier::derived()),
    ])?;
    let ca = CertificateAuthority::self_signed(
        ca_subject,
        ca_key,
        Serial::from_hex("01")?,
        Validity::for_years(1),
        ca_extensions,
    )?;

    let store = CaStore::new();
    store.add(ca.certificate().clone())?;

    // Request
    let client_key = KeyPair::generate_rsa(1024)?;
    let mut attributes = CsrAttributes::new();
    attributes.set([
        (CsrAttributeType::ChallengePassword, "password"),
        (CsrAttributeType::UnstructuredName, "My company"),
    ])?;
    attributes.update(
        [(CsrAttributeType::UnstructuredName, "My Company, Inc.")],
        AttributeUpdate::Merge,
    )?;
    let requested = ExtensionSet::build([Extension::SubjectAltName(SubjectAltName {
        names: vec![
            AltName::Dns("test.domain.com".to_string()),
            AltName::Dns("other.domain.com".to_string()),
            AltName::Dns("www.domain.net".to_string()),
        ],
    })])?;
    let request = CsrTemplate::new(
        DistinguishedName::build([
            ("CN", "example.org"),
            ("C", "US"),
            ("ST", "Virginia"),
            ("L", "Blacksburg"),
            ("O", "Test"),
            ("OU", "Test"),
        ])?,
        client_key.public_key(),
        attributes,
        requested,
    )?;
    let csr = Signer::default().sign_default(request, &client_key)?;

    // Client certificate
    let client = ca.issue_from_csr(
        &csr,
        Serial::from_hex("02")?,
        Validity::for_years(1),
        [
            Extension::BasicConstraints(BasicConstraints {
                is_ca: true,
                max_path_length: None,
            }),
            Extension::KeyUsage(usages),
        ],
    )?;
    store.add(client.clone())?;
    let path = store.verify_chain(&client)?;

    println!("CA private key:\n{}", ca.key().to_pem()?);
    println!("CA certificate:\n{}", ca.certificate().to_pem()?);
    println!("Client private key:\n{}", client_key.to_pem()?);
    println!("Client request:\n{}", csr.to_pem()?);
    println!("Client certificate:\n{}", client.to_pem()?);
    println!(
        "Verified chain: {}",
        path.iter()
            .map(|cert| cert.subject().to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    println!("Issuer: {}", ca.issuer_name());
    Ok(())
}
