use std::time::SystemTime;

use der::Encode;
use der::asn1::{GeneralizedTime, UtcTime};
use time::OffsetDateTime;
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::time::Time;

use crate::cert::{SignatureAlgorithm, SignedCertificate};
use crate::cert::extensions::ExtensionSet;
use crate::cert::params::{DistinguishedName, Serial, Validity};
use crate::error::{PkiKitError, Result};
use crate::key::PublicKey;
use crate::signer::ToBeSigned;

/// Years from 2050 on must be encoded as GeneralizedTime (RFC 5280 §4.1.2.5).
const UTC_TIME_LAST_YEAR: u16 = 2049;

/// The unsigned "To Be Signed" (TBS) content of an X.509 certificate.
///
/// A template is validated once in [`CertificateTemplate::new`] and is never
/// mutated afterwards; the signing engine consumes it by value.
///
/// # Fields
/// * `subject` - The distinguished name of the certificate subject.
/// * `issuer` - The distinguished name of the certificate issuer.
/// * `public_key` - The public key of the certificate subject.
/// * `serial` - The serial number, unique per issuer.
/// * `validity` - The validity window, truncated to whole seconds.
/// * `extensions` - The X.509v3 extensions, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateTemplate {
    subject: DistinguishedName,
    issuer: DistinguishedName,
    public_key: PublicKey,
    serial: Serial,
    validity: Validity,
    extensions: ExtensionSet,
}

impl CertificateTemplate {
    /// Validates and assembles a certificate template.
    ///
    /// Fails with `InvalidSerial` for an empty or over-long serial and
    /// `InvalidValidity` when `not_after` precedes `not_before`. Derivable key
    /// identifiers in `extensions` are filled in from `public_key`.
    pub fn new(
        subject: DistinguishedName,
        issuer: DistinguishedName,
        public_key: PublicKey,
        serial: Serial,
        validity: Validity,
        extensions: ExtensionSet,
    ) -> Result<Self> {
        serial.check()?;
        validity.check()?;
        let validity = validity.truncated();
        to_x509_time(validity.not_before)?;
        to_x509_time(validity.not_after)?;
        subject.to_x509_name()?;
        issuer.to_x509_name()?;

        let self_issued = subject == issuer;
        let extensions =
            extensions.resolve_key_identifiers(&public_key.key_identifier()?, self_issued)?;

        Ok(Self {
            subject,
            issuer,
            public_key,
            serial,
            validity,
            extensions,
        })
    }

    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    pub fn issuer(&self) -> &DistinguishedName {
        &self.issuer
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn serial(&self) -> &Serial {
        &self.serial
    }

    pub fn validity(&self) -> &Validity {
        &self.validity
    }

    pub fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }

    /// Subject and issuer names are identical.
    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    /// Converts the template into a `TbsCertificateInner` for DER encoding.
    pub fn to_tbs_certificate_inner(
        &self,
        signature_algorithm: SignatureAlgorithm,
    ) -> Result<TbsCertificateInner> {
        let extensions = self.extensions.to_x509()?;

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number: self.serial.to_x509()?,
            signature: signature_algorithm.into(),
            issuer: self.issuer.to_x509_name()?,
            validity: x509_cert::time::Validity {
                not_before: to_x509_time(self.validity.not_before)?,
                not_after: to_x509_time(self.validity.not_after)?,
            },
            subject: self.subject.to_x509_name()?,
            subject_public_key_info: self.public_key.to_spki()?,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: (!extensions.is_empty()).then_some(extensions),
        })
    }

    /// Reads a template back from a decoded certificate.
    ///
    /// Extensions are typed but not re-validated, so certificates produced
    /// elsewhere can still be inspected and verified.
    pub fn from_tbs_certificate_inner(inner: &TbsCertificateInner) -> Result<Self> {
        let validity = Validity {
            not_before: from_x509_time(&inner.validity.not_before),
            not_after: from_x509_time(&inner.validity.not_after),
        };

        Ok(Self {
            subject: DistinguishedName::from_x509_name(&inner.subject)?,
            issuer: DistinguishedName::from_x509_name(&inner.issuer)?,
            public_key: PublicKey::from_x509spki(&inner.subject_public_key_info)?,
            serial: Serial::from_bytes(inner.serial_number.as_bytes()),
            validity,
            extensions: ExtensionSet::from_x509(inner.extensions.as_deref().unwrap_or_default()),
        })
    }

    /// Encodes the TBS structure into DER format.
    pub fn to_der(&self, signature_algorithm: SignatureAlgorithm) -> Result<Vec<u8>> {
        Ok(self.to_tbs_certificate_inner(signature_algorithm)?.to_der()?)
    }
}

impl ToBeSigned for CertificateTemplate {
    type Signed = SignedCertificate;
    const KIND: &'static str = "certificate";

    fn tbs_der(&self, algorithm: SignatureAlgorithm) -> Result<Vec<u8>> {
        self.to_der(algorithm)
    }

    /// A self-issued template must be signed by its own key; otherwise an
    /// authority key id, when present, must name the signing key.
    fn check_signing_key(&self, signing_key: &PublicKey) -> Result<()> {
        if self.is_self_issued() {
            if signing_key != &self.public_key {
                return Err(PkiKitError::SigningKeyMismatch(format!(
                    "self-issued certificate for {} must be signed by its own key",
                    self.subject
                )));
            }
            return Ok(());
        }
        let expected = self
            .extensions
            .authority_key_identifier()
            .and_then(|aki| aki.key_identifier.as_deref());
        if let Some(expected) = expected {
            if signing_key.key_identifier()? != expected {
                return Err(PkiKitError::SigningKeyMismatch(format!(
                    "authority key id {} does not match the signing key",
                    hex::encode(expected)
                )));
            }
        }
        Ok(())
    }

    fn into_signed(self, algorithm: SignatureAlgorithm, signature: Vec<u8>) -> Result<SignedCertificate> {
        SignedCertificate::from_parts(self, algorithm, signature)
    }
}

fn to_x509_time(at: OffsetDateTime) -> Result<Time> {
    let invalid = |e: der::Error| PkiKitError::InvalidValidity(format!("{at} cannot be encoded: {e}"));
    let date_time = der::DateTime::from_system_time(SystemTime::from(at)).map_err(invalid)?;
    if date_time.year() <= UTC_TIME_LAST_YEAR {
        Ok(Time::UtcTime(UtcTime::from_date_time(date_time).map_err(invalid)?))
    } else {
        Ok(Time::GeneralTime(
            GeneralizedTime::from_date_time(date_time),
        ))
    }
}

fn from_x509_time(time: &Time) -> OffsetDateTime {
    match time {
        Time::UtcTime(ut) => OffsetDateTime::from(ut.to_system_time()),
        Time::GeneralTime(gt) => OffsetDateTime::from(gt.to_system_time()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::{
        AuthorityKeyIdentifier, Extension, SubjectKeyIdentifier,
    };
    use crate::key::KeyPair;
    use time::macros::datetime;

    fn name(cn: &str) -> DistinguishedName {
        DistinguishedName::build([("CN", cn)]).unwrap()
    }

    #[test]
    fn test_empty_serial_rejected() {
        let key = KeyPair::generate_ed25519();
        let err = CertificateTemplate::new(
            name("a"),
            name("a"),
            key.public_key(),
            Serial::from_bytes(&[]),
            Validity::for_days(1),
            ExtensionSet::empty(),
        )
        .unwrap_err();
        assert!(matches!(err, PkiKitError::InvalidSerial(_)));
    }

    #[test]
    fn test_inverted_validity_rejected() {
        let key = KeyPair::generate_ed25519();
        let validity = Validity {
            not_before: datetime!(2030-01-01 0:00 UTC),
            not_after: datetime!(2029-01-01 0:00 UTC),
        };
        let err = CertificateTemplate::new(
            name("a"),
            name("a"),
            key.public_key(),
            Serial::from_u64(1),
            validity,
            ExtensionSet::empty(),
        )
        .unwrap_err();
        assert!(matches!(err, PkiKitError::InvalidValidity(_)));
    }

    #[test]
    fn test_times_after_2049_use_generalized_time() {
        let key = KeyPair::generate_ed25519();
        let validity = Validity {
            not_before: datetime!(2049-12-31 23:59:59.75 UTC),
            not_after: datetime!(2051-06-01 12:00 UTC),
        };
        let template = CertificateTemplate::new(
            name("a"),
            name("a"),
            key.public_key(),
            Serial::from_u64(1),
            validity,
            ExtensionSet::empty(),
        )
        .unwrap();
        assert_eq!(
            template.validity().not_before,
            datetime!(2049-12-31 23:59:59 UTC)
        );

        let inner = template
            .to_tbs_certificate_inner(SignatureAlgorithm::Ed25519)
            .unwrap();
        assert!(matches!(inner.validity.not_before, Time::UtcTime(_)));
        assert!(matches!(inner.validity.not_after, Time::GeneralTime(_)));
        assert!(inner.extensions.is_none());

        let decoded = CertificateTemplate::from_tbs_certificate_inner(&inner).unwrap();
        assert_eq!(decoded, template);
    }

    #[test]
    fn test_key_identifiers_derived_for_self_issued() {
        let key = KeyPair::generate_ecdsa_p256();
        let extensions = ExtensionSet::build([
            Extension::SubjectKeyIdentifier(SubjectKeyIdentifier::derived()),
            Extension::AuthorityKeyIdentifier(AuthorityKeyIdentifier::derived()),
        ])
        .unwrap();
        let template = CertificateTemplate::new(
            name("root"),
            name("root"),
            key.public_key(),
            Serial::from_u64(1),
            Validity::for_days(1),
            extensions.clone(),
        )
        .unwrap();
        let key_id = key.public_key().key_identifier().unwrap();
        assert_eq!(
            template
                .extensions()
                .subject_key_identifier()
                .unwrap()
                .key_identifier,
            Some(key_id.clone())
        );
        assert_eq!(
            template
                .extensions()
                .authority_key_identifier()
                .unwrap()
                .key_identifier,
            Some(key_id)
        );

        let err = CertificateTemplate::new(
            name("leaf"),
            name("root"),
            key.public_key(),
            Serial::from_u64(2),
            Validity::for_days(1),
            extensions,
        )
        .unwrap_err();
        assert!(matches!(err, PkiKitError::InvalidExtension { .. }));
    }
}
