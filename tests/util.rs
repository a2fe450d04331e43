#![allow(dead_code)]

use std::io::Write;

use pkikit::cert::extensions::{
    AltName, AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption,
    Extension, ExtensionSet, KeyUsage, KeyUsages, NsCertType, NsCertTypes, SubjectAltName,
    SubjectKeyIdentifier,
};
use pkikit::cert::params::{DistinguishedName, Serial, Validity};
use pkikit::csr::{AttributeUpdate, CsrAttributeType, CsrAttributes, CsrTemplate, SignedCsr};
use pkikit::issuer::CertificateAuthority;
use pkikit::key::KeyPair;
use pkikit::signer::Signer;

pub fn blacklightops_subject() -> DistinguishedName {
    DistinguishedName::build([
        ("commonName", "blacklightops.com"),
        ("countryName", "US"),
        ("ST", "California"),
        ("localityName", "Union City"),
        ("organizationName", "BlacklightOps"),
        ("OU", "TechOps"),
    ])
    .unwrap()
}

fn signing_usages() -> KeyUsage {
    KeyUsage(
        KeyUsages::KeyCertSign
            | KeyUsages::DigitalSignature
            | KeyUsages::NonRepudiation
            | KeyUsages::KeyEncipherment
            | KeyUsages::DataEncipherment,
    )
}

/// The extensions of the BlacklightOps root, including its authority key id.
pub fn ca_extensions() -> ExtensionSet {
    ExtensionSet::build([
        Extension::BasicConstraints(BasicConstraints {
            is_ca: true,
            max_path_length: None,
        }),
        Extension::KeyUsage(signing_usages()),
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
                AltName::Ip("127.0.0.1".parse().unwrap()),
            ],
        }),
        Extension::SubjectKeyIdentifier(SubjectKeyIdentifier::derived()),
        Extension::AuthorityKeyIdentifier(AuthorityKeyIdentifier::derived()),
    ])
    .unwrap()
}

/// The BlacklightOps root with a fresh RSA-2048 key.
pub fn generate_ca() -> CertificateAuthority {
    CertificateAuthority::self_signed(
        blacklightops_subject(),
        KeyPair::generate_rsa(2048).unwrap(),
        Serial::from_hex("01").unwrap(),
        Validity::for_years(1),
        ca_extensions(),
    )
    .unwrap()
}

/// A small, fast root for tests that do not care about the key type.
pub fn generate_ecdsa_ca(common_name: &str) -> CertificateAuthority {
    CertificateAuthority::self_signed(
        DistinguishedName::build([("CN", common_name)]).unwrap(),
        KeyPair::generate_ecdsa_p256(),
        Serial::from_u64(1),
        Validity::for_days(30),
        ExtensionSet::build([
            Extension::BasicConstraints(BasicConstraints {
                is_ca: true,
                max_path_length: None,
            }),
            Extension::KeyUsage(KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign)),
            Extension::SubjectKeyIdentifier(SubjectKeyIdentifier::derived()),
        ])
        .unwrap(),
    )
    .unwrap()
}

pub fn example_org_subject() -> DistinguishedName {
    DistinguishedName::build([
        ("CN", "example.org"),
        ("C", "US"),
        ("ST", "Virginia"),
        ("L", "Blacksburg"),
        ("O", "Test"),
        ("OU", "Test"),
    ])
    .unwrap()
}

/// The example.org request: attributes set, then merged with the final values.
pub fn example_org_csr(key: &KeyPair) -> SignedCsr {
    let mut attributes = CsrAttributes::new();
    attributes
        .set([
            (CsrAttributeType::ChallengePassword, "password"),
            (CsrAttributeType::UnstructuredName, "My company"),
        ])
        .unwrap();
    attributes
        .update(
            [(CsrAttributeType::UnstructuredName, "My Company, Inc.")],
            AttributeUpdate::Merge,
        )
        .unwrap();

    let requested = ExtensionSet::build([Extension::SubjectAltName(SubjectAltName {
        names: vec![
            AltName::Dns("test.domain.com".to_string()),
            AltName::Dns("other.domain.com".to_string()),
            AltName::Dns("www.domain.net".to_string()),
        ],
    })])
    .unwrap();

    let template = CsrTemplate::new(example_org_subject(), key.public_key(), attributes, requested)
        .unwrap();
    Signer::default().sign_default(template, key).unwrap()
}

/// The extensions the CA appends when issuing the client certificate.
pub fn client_extensions() -> Vec<Extension> {
    vec![
        Extension::BasicConstraints(BasicConstraints {
            is_ca: true,
            max_path_length: None,
        }),
        Extension::KeyUsage(signing_usages()),
    ]
}

pub fn write_debug_pem(name: &str, pem: &str) {
    std::fs::create_dir_all(".debug_certs").unwrap();
    std::fs::File::create(format!(".debug_certs/{name}.pem"))
        .unwrap()
        .write_all(pem.as_bytes())
        .unwrap();
}
