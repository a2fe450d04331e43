//! # PkiKit - A Pure Rust X.509 Issuance Core
//!
//! PkiKit builds and signs X.509 certificates and PKCS#10 certification
//! requests with rustcrypto libraries, and keeps trusted CA certificates in a
//! store that can verify issuer chains.
//!
//! ## Supported Key Types
//!
//! - **RSA**: any size `rsa` can generate, PKCS#1 v1.5 with SHA-256/384/512
//! - **ECDSA**: P-256 and P-384 curves
//! - **Ed25519**: Edwards curve digital signature algorithm
//!
//! ## Building Blocks
//!
//! - [`cert::params::DistinguishedName`]: ordered subject and issuer names
//! - [`cert::extensions::ExtensionSet`]: validated X.509v3 extensions
//! - [`tbs_certificate::CertificateTemplate`] and [`csr::CsrTemplate`]: unsigned templates
//! - [`signer::Signer`]: turns templates into [`cert::SignedCertificate`] and [`csr::SignedCsr`]
//! - [`store::CaStore`]: trust anchors and chain verification
//! - [`issuer::CertificateAuthority`]: self-signed roots and issuance from requests
//!
//! ## Quick Start
//!
//! ### Creating a Self-Signed CA
//!
//! ```rust,no_run
//! use pkikit::{
//!     cert::extensions::{BasicConstraints, Extension, ExtensionSet, KeyUsage, KeyUsages},
//!     cert::params::{DistinguishedName, Serial, Validity},
//!     issuer::{CertificateAuthority, Issuer},
//!     key::KeyPair,
//!     PemEncodable,
//! };
//!
//! # fn main() -> Result<(), pkikit::error::PkiKitError> {
//! let subject = DistinguishedName::build([
//!     ("CN", "blacklightops.com"),
//!     ("C", "US"),
//!     ("O", "BlacklightOps"),
//! ])?;
//!
//! let extensions = ExtensionSet::build([
//!     Extension::BasicConstraints(BasicConstraints { is_ca: true, max_path_length: None }),
//!     Extension::KeyUsage(KeyUsage(KeyUsages::KeyCertSign | KeyUsages::DigitalSignature)),
//! ])?;
//!
//! let ca = CertificateAuthority::self_signed(
//!     subject,
//!     KeyPair::generate_rsa(2048)?,
//!     Serial::from_u64(1),
//!     Validity::for_years(1),
//!     extensions,
//! )?;
//!
//! println!("{}", ca.certificate().to_pem()?);
//! # Ok(())
//! # }
//! ```
//!
//! ### Issuing From a Certification Request
//!
//! ```rust,no_run
//! use pkikit::{
//!     cert::extensions::{AltName, Extension, ExtensionSet, SubjectAltName},
//!     cert::params::{DistinguishedName, Serial, Validity},
//!     csr::{CsrAttributes, CsrTemplate},
//!     issuer::{CertificateAuthority, Issuer},
//!     key::KeyPair,
//!     signer::Signer,
//!     store::CaStore,
//! };
//!
//! # fn run(ca: CertificateAuthority) -> Result<(), pkikit::error::PkiKitError> {
//! let client_key = KeyPair::generate_ecdsa_p256();
//! let request = CsrTemplate::new(
//!     DistinguishedName::build([("CN", "example.org")])?,
//!     client_key.public_key(),
//!     CsrAttributes::new(),
//!     ExtensionSet::build([Extension::SubjectAltName(SubjectAltName {
//!         names: vec![AltName::Dns("test.domain.com".to_string())],
//!     })])?,
//! )?;
//! let csr = Signer::default().sign_default(request, &client_key)?;
//!
//! let client = ca.issue_from_csr(&csr, Serial::random(), Validity::for_days(90), [])?;
//!
//! let store = CaStore::new();
//! store.add(ca.certificate().clone())?;
//! let path = store.verify_chain(&client)?;
//! assert_eq!(path.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod cert;
pub mod csr;
pub mod error;
pub mod issuer;
pub mod key;
pub mod pem_utils;
pub mod signer;
pub mod store;
pub mod tbs_certificate;

pub use error::{PkiKitError, Result};
pub use pem_utils::PemEncodable;
