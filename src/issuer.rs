use tracing::info;

use crate::cert::SignatureAlgorithm;
use crate::cert::SignedCertificate;
use crate::cert::extensions::{AuthorityKeyIdentifier, Extension, ExtensionSet};
use crate::cert::params::{DistinguishedName, Serial, Validity};
use crate::csr::SignedCsr;
use crate::error::{PkiKitError, Result};
use crate::key::{KeyPair, PublicKey};
use crate::signer::Signer;
use crate::tbs_certificate::CertificateTemplate;

/// Represents an entity capable of issuing certificates.
///
/// Implementors supply their certificate, key and signer; issuance builds
/// the template with the issuer's subject as issuer name and an authority key
/// identifier pointing back at the issuing certificate.
pub trait Issuer {
    /// The issuing certificate.
    fn certificate(&self) -> &SignedCertificate;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    fn signer(&self) -> &Signer;

    /// Returns the distinguished name of the issuer.
    fn issuer_name(&self) -> &DistinguishedName {
        self.certificate().subject()
    }

    fn signature_algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::default_for(self.signing_key())
    }

    /// Identifies the issuing certificate by key id, issuer name and serial.
    fn authority_key_identifier(&self) -> Result<AuthorityKeyIdentifier> {
        let cert = self.certificate();
        Ok(AuthorityKeyIdentifier {
            key_identifier: Some(cert.key_identifier()?),
            authority_cert_issuer: Some(cert.issuer().clone()),
            authority_cert_serial_number: Some(cert.serial().clone()),
        })
    }

    /// Issues a certificate for `subject` and `public_key`.
    ///
    /// An authority key identifier is added unless `extensions` already
    /// carries an explicit one.
    fn issue(
        &self,
        subject: DistinguishedName,
        public_key: PublicKey,
        serial: Serial,
        validity: Validity,
        extensions: ExtensionSet,
    ) -> Result<SignedCertificate> {
        let extensions =
            extensions.with_authority_key_identifier(self.authority_key_identifier()?)?;
        let template = CertificateTemplate::new(
            subject,
            self.issuer_name().clone(),
            public_key,
            serial,
            validity,
            extensions,
        )?;
        let cert = self
            .signer()
            .sign(template, self.signing_key(), self.signature_algorithm())?;
        info!(subject = %cert.subject(), serial = %cert.serial(), issuer = %cert.issuer(), "issued certificate");
        Ok(cert)
    }
}

/// A CA certificate together with its private key.
#[derive(Debug, Clone)]
pub struct CertificateAuthority {
    certificate: SignedCertificate,
    key: KeyPair,
    signer: Signer,
}

impl CertificateAuthority {
    /// Pairs a CA certificate with its private key.
    ///
    /// Fails with `SigningKeyMismatch` when `key` is not the certificate's key.
    pub fn new(certificate: SignedCertificate, key: KeyPair) -> Result<Self> {
        if &key.public_key() != certificate.public_key() {
            return Err(PkiKitError::SigningKeyMismatch(format!(
                "key does not belong to the certificate for {}",
                certificate.subject()
            )));
        }
        Ok(Self {
            certificate,
            key,
            signer: Signer::default(),
        })
    }

    /// Creates a self-signed root, subject and issuer both `subject`.
    pub fn self_signed(
        subject: DistinguishedName,
        key: KeyPair,
        serial: Serial,
        validity: Validity,
        extensions: ExtensionSet,
    ) -> Result<Self> {
        let template = CertificateTemplate::new(
            subject.clone(),
            subject,
            key.public_key(),
            serial,
            validity,
            extensions,
        )?;
        let signer = Signer::default();
        let certificate = signer.sign_default(template, &key)?;
        info!(subject = %certificate.subject(), "created self-signed CA");
        Ok(Self {
            certificate,
            key,
            signer,
        })
    }

    /// Replaces the signer used for issuance.
    pub fn with_signer(self, signer: Signer) -> Self {
        Self { signer, ..self }
    }

    pub fn key(&self) -> &KeyPair {
        &self.key
    }

    /// Issues a certificate for a verified request.
    ///
    /// The request's subject, public key and requested extensions are copied;
    /// `extra_extensions` are appended and the combined set validated again.
    pub fn issue_from_csr(
        &self,
        csr: &SignedCsr,
        serial: Serial,
        validity: Validity,
        extra_extensions: impl IntoIterator<Item = Extension>,
    ) -> Result<SignedCertificate> {
        csr.verify()?;
        let template = csr.template();
        let extensions = template
            .requested_extensions()
            .clone()
            .extend_with(extra_extensions)?;
        self.issue(
            template.subject().clone(),
            template.public_key().clone(),
            serial,
            validity,
            extensions,
        )
    }
}

impl Issuer for CertificateAuthority {
    fn certificate(&self) -> &SignedCertificate {
        &self.certificate
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }

    fn signer(&self) -> &Signer {
        &self.signer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::{BasicConstraints, KeyUsage, KeyUsages, SubjectKeyIdentifier};
    use crate::csr::{CsrAttributes, CsrTemplate};

    fn root() -> CertificateAuthority {
        CertificateAuthority::self_signed(
            DistinguishedName::build([("CN", "Issuer Root")]).unwrap(),
            KeyPair::generate_ecdsa_p256(),
            Serial::from_u64(1),
            Validity::for_days(30),
            ExtensionSet::build([
                Extension::BasicConstraints(BasicConstraints {
                    is_ca: true,
                    max_path_length: Some(0),
                }),
                Extension::KeyUsage(KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign)),
                Extension::SubjectKeyIdentifier(SubjectKeyIdentifier::derived()),
            ])
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_adds_authority_key_identifier() {
        let ca = root();
        let leaf_key = KeyPair::generate_ed25519();
        let cert = ca
            .issue(
                DistinguishedName::build([("CN", "leaf")]).unwrap(),
                leaf_key.public_key(),
                Serial::from_u64(2),
                Validity::for_days(1),
                ExtensionSet::empty(),
            )
            .unwrap();

        let aki = cert.authority_key_identifier().unwrap();
        assert_eq!(aki.key_identifier.as_deref(), ca.certificate().subject_key_id());
        assert_eq!(aki.authority_cert_issuer.as_ref(), Some(ca.certificate().issuer()));
        assert_eq!(aki.authority_cert_serial_number, Some(Serial::from_u64(1)));
        cert.verify_signature(ca.certificate().public_key()).unwrap();
    }

    #[test]
    fn test_key_must_belong_to_certificate() {
        let ca = root();
        let err = CertificateAuthority::new(ca.certificate().clone(), KeyPair::generate_ecdsa_p256())
            .unwrap_err();
        assert!(matches!(err, PkiKitError::SigningKeyMismatch(_)));
        CertificateAuthority::new(ca.certificate().clone(), ca.key().clone()).unwrap();
    }

    #[test]
    fn test_forged_csr_is_refused() {
        let ca = root();
        let requester = KeyPair::generate_ed25519();
        let other = KeyPair::generate_ed25519();
        let template = CsrTemplate::new(
            DistinguishedName::build([("CN", "example.org")]).unwrap(),
            requester.public_key(),
            CsrAttributes::new(),
            ExtensionSet::empty(),
        )
        .unwrap();
        let forged = Signer::default().sign_default(template, &other).unwrap();

        let err = ca
            .issue_from_csr(&forged, Serial::from_u64(5), Validity::for_days(1), [])
            .unwrap_err();
        assert!(matches!(err, PkiKitError::SignatureInvalid(_)));
    }
}
