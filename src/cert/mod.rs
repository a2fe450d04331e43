pub mod extensions;
pub mod params;

use std::fmt;
use std::str::FromStr;

use const_oid::ObjectIdentifier;
use der::asn1::{Any, BitString};
use der::{Decode, Encode};
use x509_cert::certificate::CertificateInner;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{PkiKitError, Result};
use crate::key::{KeyAlgorithm, KeyPair, PublicKey};
use crate::pem_utils::PemEncodable;
use crate::store::CertificateId;
use crate::tbs_certificate::CertificateTemplate;
use extensions::{AuthorityKeyIdentifier, ExtensionSet};
use params::{DistinguishedName, Serial, Validity};

/// Represents the supported signature algorithms for certificates and requests.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption (PKCS#1 v1.5).
    Sha256WithRsa,
    /// SHA-384 with RSA encryption (PKCS#1 v1.5).
    Sha384WithRsa,
    /// SHA-512 with RSA encryption (PKCS#1 v1.5).
    Sha512WithRsa,
    /// ECDSA over P-256 with SHA-256.
    EcdsaWithSha256,
    /// ECDSA over P-384 with SHA-384.
    EcdsaWithSha384,
    /// Ed25519 (PureEdDSA).
    Ed25519,
}

const ALGORITHMS: [SignatureAlgorithm; 6] = [
    SignatureAlgorithm::Sha256WithRsa,
    SignatureAlgorithm::Sha384WithRsa,
    SignatureAlgorithm::Sha512WithRsa,
    SignatureAlgorithm::EcdsaWithSha256,
    SignatureAlgorithm::EcdsaWithSha384,
    SignatureAlgorithm::Ed25519,
];

impl SignatureAlgorithm {
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            SignatureAlgorithm::Sha256WithRsa => const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha384WithRsa => const_oid::db::rfc5912::SHA_384_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha512WithRsa => const_oid::db::rfc5912::SHA_512_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::EcdsaWithSha256 => const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
            SignatureAlgorithm::EcdsaWithSha384 => const_oid::db::rfc5912::ECDSA_WITH_SHA_384,
            SignatureAlgorithm::Ed25519 => const_oid::db::rfc8410::ID_ED_25519,
        }
    }

    pub fn from_oid(oid: ObjectIdentifier) -> Result<Self> {
        ALGORITHMS
            .into_iter()
            .find(|alg| alg.oid() == oid)
            .ok_or_else(|| PkiKitError::UnsupportedAlgorithm(oid.to_string()))
    }

    /// The conventional name, e.g. `sha256WithRSAEncryption`.
    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha256WithRsa => "sha256WithRSAEncryption",
            SignatureAlgorithm::Sha384WithRsa => "sha384WithRSAEncryption",
            SignatureAlgorithm::Sha512WithRsa => "sha512WithRSAEncryption",
            SignatureAlgorithm::EcdsaWithSha256 => "ecdsa-with-SHA256",
            SignatureAlgorithm::EcdsaWithSha384 => "ecdsa-with-SHA384",
            SignatureAlgorithm::Ed25519 => "Ed25519",
        }
    }

    /// The algorithm a key signs with when none is requested.
    pub fn default_for(key: &KeyPair) -> Self {
        match key.algorithm() {
            KeyAlgorithm::Rsa { .. } => SignatureAlgorithm::Sha256WithRsa,
            KeyAlgorithm::EcdsaP256 => SignatureAlgorithm::EcdsaWithSha256,
            KeyAlgorithm::EcdsaP384 => SignatureAlgorithm::EcdsaWithSha384,
            KeyAlgorithm::Ed25519 => SignatureAlgorithm::Ed25519,
        }
    }

    /// Whether a key of the given type can produce this signature.
    pub fn is_compatible_with(&self, key: KeyAlgorithm) -> bool {
        matches!(
            (self, key),
            (
                SignatureAlgorithm::Sha256WithRsa
                    | SignatureAlgorithm::Sha384WithRsa
                    | SignatureAlgorithm::Sha512WithRsa,
                KeyAlgorithm::Rsa { .. }
            ) | (SignatureAlgorithm::EcdsaWithSha256, KeyAlgorithm::EcdsaP256)
                | (SignatureAlgorithm::EcdsaWithSha384, KeyAlgorithm::EcdsaP384)
                | (SignatureAlgorithm::Ed25519, KeyAlgorithm::Ed25519)
        )
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = PkiKitError;

    /// Accepts the conventional name (case-insensitive) or a dotted OID.
    fn from_str(s: &str) -> Result<Self> {
        if let Some(alg) = ALGORITHMS
            .into_iter()
            .find(|alg| alg.name().eq_ignore_ascii_case(s))
        {
            return Ok(alg);
        }
        match ObjectIdentifier::new(s) {
            Ok(oid) => Self::from_oid(oid),
            Err(_) => Err(PkiKitError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl From<SignatureAlgorithm> for AlgorithmIdentifierOwned {
    /// RSA identifiers carry an explicit NULL parameter, ECDSA and Ed25519 none.
    fn from(value: SignatureAlgorithm) -> Self {
        let parameters = match value {
            SignatureAlgorithm::Sha256WithRsa
            | SignatureAlgorithm::Sha384WithRsa
            | SignatureAlgorithm::Sha512WithRsa => Some(Any::null()),
            _ => None,
        };
        AlgorithmIdentifierOwned {
            oid: value.oid(),
            parameters,
        }
    }
}

/// A signed, immutable X.509 certificate.
///
/// Holds the template it was produced from next to the encoded certificate,
/// so the typed view and the signed bytes can never drift apart.
#[derive(Debug, Clone)]
pub struct SignedCertificate {
    template: CertificateTemplate,
    signature_algorithm: SignatureAlgorithm,
    signature: Vec<u8>,
    inner: CertificateInner,
    tbs_der: Vec<u8>,
    der: Vec<u8>,
}

impl SignedCertificate {
    /// Attaches a signature to a template.
    ///
    /// The signature is not checked here; see [`SignedCertificate::verify_signature`].
    pub fn from_parts(
        template: CertificateTemplate,
        signature_algorithm: SignatureAlgorithm,
        signature: Vec<u8>,
    ) -> Result<Self> {
        let tbs_certificate = template.to_tbs_certificate_inner(signature_algorithm)?;
        let inner = CertificateInner {
            tbs_certificate,
            signature_algorithm: signature_algorithm.into(),
            signature: BitString::from_bytes(&signature)?,
        };
        Self::from_inner(template, signature_algorithm, signature, inner)
    }

    fn from_inner(
        template: CertificateTemplate,
        signature_algorithm: SignatureAlgorithm,
        signature: Vec<u8>,
        inner: CertificateInner,
    ) -> Result<Self> {
        let tbs_der = inner.tbs_certificate.to_der()?;
        let der = inner.to_der()?;
        Ok(Self {
            template,
            signature_algorithm,
            signature,
            inner,
            tbs_der,
            der,
        })
    }

    pub fn template(&self) -> &CertificateTemplate {
        &self.template
    }

    pub fn subject(&self) -> &DistinguishedName {
        self.template.subject()
    }

    pub fn issuer(&self) -> &DistinguishedName {
        self.template.issuer()
    }

    pub fn serial(&self) -> &Serial {
        self.template.serial()
    }

    pub fn validity(&self) -> &Validity {
        self.template.validity()
    }

    pub fn public_key(&self) -> &PublicKey {
        self.template.public_key()
    }

    pub fn extensions(&self) -> &ExtensionSet {
        self.template.extensions()
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.signature_algorithm
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The DER encoding of the to-be-signed part.
    pub fn tbs_der(&self) -> &[u8] {
        &self.tbs_der
    }

    /// The underlying `x509-cert` structure.
    pub fn as_x509(&self) -> &CertificateInner {
        &self.inner
    }

    /// The CA store key: issuer name and serial number.
    pub fn id(&self) -> CertificateId {
        CertificateId::new(self.issuer().clone(), self.serial().clone())
    }

    pub fn is_self_issued(&self) -> bool {
        self.template.is_self_issued()
    }

    pub fn is_ca(&self) -> bool {
        self.extensions()
            .basic_constraints()
            .is_some_and(|bc| bc.is_ca)
    }

    /// The explicit subject key identifier, if the certificate carries one.
    pub fn subject_key_id(&self) -> Option<&[u8]> {
        self.extensions()
            .subject_key_identifier()
            .and_then(|ski| ski.key_identifier.as_deref())
    }

    pub fn authority_key_identifier(&self) -> Option<&AuthorityKeyIdentifier> {
        self.extensions().authority_key_identifier()
    }

    pub fn authority_key_id(&self) -> Option<&[u8]> {
        self.authority_key_identifier()
            .and_then(|aki| aki.key_identifier.as_deref())
    }

    /// The subject key identifier, or the SHA-1 of the public key when absent.
    pub fn key_identifier(&self) -> Result<Vec<u8>> {
        match self.subject_key_id() {
            Some(id) => Ok(id.to_vec()),
            None => self.public_key().key_identifier(),
        }
    }

    /// Checks the signature against `issuer_key`.
    pub fn verify_signature(&self, issuer_key: &PublicKey) -> Result<()> {
        issuer_key.verify(self.signature_algorithm, &self.tbs_der, &self.signature)
    }

    /// Checks the signature against the certificate's own public key.
    pub fn verify_self_signed(&self) -> Result<()> {
        self.verify_signature(self.public_key())
    }
}

impl PartialEq for SignedCertificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for SignedCertificate {}

impl PemEncodable for SignedCertificate {
    const PEM_LABEL: &'static str = "CERTIFICATE";

    fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.der.clone())
    }

    fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertificateInner::from_der(der)?;
        let signature_algorithm = SignatureAlgorithm::from_oid(inner.signature_algorithm.oid)?;
        if inner.tbs_certificate.signature.oid != inner.signature_algorithm.oid {
            return Err(PkiKitError::DecodingError(
                "signature algorithm differs from the one in the signed part".to_string(),
            ));
        }
        let template = CertificateTemplate::from_tbs_certificate_inner(&inner.tbs_certificate)?;
        let signature = inner
            .signature
            .as_bytes()
            .ok_or_else(|| PkiKitError::DecodingError("signature has unused bits".to_string()))?
            .to_vec();
        Self::from_inner(template, signature_algorithm, signature, inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::{BasicConstraints, Extension, KeyUsage, KeyUsages};
    use crate::signer::Signer;

    fn self_signed(key: &KeyPair) -> SignedCertificate {
        let subject = DistinguishedName::builder()
            .common_name("Unit Root".to_string())
            .build();
        let extensions = ExtensionSet::build([
            Extension::BasicConstraints(BasicConstraints {
                is_ca: true,
                max_path_length: None,
            }),
            Extension::KeyUsage(KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign)),
        ])
        .unwrap();
        let template = CertificateTemplate::new(
            subject.clone(),
            subject,
            key.public_key(),
            Serial::from_u64(1),
            Validity::for_days(30),
            extensions,
        )
        .unwrap();
        Signer::default().sign_default(template, key).unwrap()
    }

    #[test]
    fn test_algorithm_names_and_oids() {
        for alg in ALGORITHMS {
            assert_eq!(SignatureAlgorithm::from_oid(alg.oid()).unwrap(), alg);
            assert_eq!(alg.name().parse::<SignatureAlgorithm>().unwrap(), alg);
        }
        assert_eq!(
            "1.2.840.113549.1.1.11".parse::<SignatureAlgorithm>().unwrap(),
            SignatureAlgorithm::Sha256WithRsa
        );
        assert!(matches!(
            "md5WithRSAEncryption".parse::<SignatureAlgorithm>(),
            Err(PkiKitError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            SignatureAlgorithm::from_oid(ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.4")),
            Err(PkiKitError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_rsa_identifier_has_null_parameters() {
        let id: AlgorithmIdentifierOwned = SignatureAlgorithm::Sha256WithRsa.into();
        assert_eq!(id.parameters, Some(Any::null()));
        let id: AlgorithmIdentifierOwned = SignatureAlgorithm::EcdsaWithSha256.into();
        assert_eq!(id.parameters, None);
    }

    #[test]
    fn test_self_signed_round_trip() {
        let key = KeyPair::generate_ecdsa_p256();
        let cert = self_signed(&key);
        cert.verify_self_signed().unwrap();
        assert!(cert.is_ca());
        assert!(cert.is_self_issued());

        let decoded = SignedCertificate::from_pem(&cert.to_pem().unwrap()).unwrap();
        assert_eq!(decoded, cert);
        assert_eq!(decoded.template(), cert.template());
        decoded.verify_self_signed().unwrap();
    }

    #[test]
    fn test_changed_field_breaks_signature() {
        let key = KeyPair::generate_ed25519();
        let cert = self_signed(&key);
        let original = cert.template();
        let tampered = CertificateTemplate::new(
            original.subject().clone(),
            original.issuer().clone(),
            original.public_key().clone(),
            Serial::from_u64(2),
            original.validity().clone(),
            original.extensions().clone(),
        )
        .unwrap();
        let forged = SignedCertificate::from_parts(
            tampered,
            cert.signature_algorithm(),
            cert.signature().to_vec(),
        )
        .unwrap();
        assert!(matches!(
            forged.verify_self_signed(),
            Err(PkiKitError::SignatureInvalid(_))
        ));
    }
}
