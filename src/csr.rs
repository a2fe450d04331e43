//! Certification requests (PKCS#10): attributes, templates and signed requests.

use std::fmt;
use std::str::FromStr;

use const_oid::ObjectIdentifier;
use der::asn1::{Any, BitString, SetOfVec, Utf8StringRef};
use der::{Decode, Encode};
use x509_cert::attr::Attribute;
use x509_cert::ext::Extension as X509Extension;
use x509_cert::request::{CertReq, CertReqInfo, Version};

use crate::cert::SignatureAlgorithm;
use crate::cert::extensions::ExtensionSet;
use crate::cert::params::DistinguishedName;
use crate::error::{PkiKitError, Result};
use crate::key::PublicKey;
use crate::pem_utils::PemEncodable;
use crate::signer::ToBeSigned;

const CHALLENGE_PASSWORD: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.7");
const UNSTRUCTURED_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.2");
const EXTENSION_REQUEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.14");

/// The type of a CSR attribute.
///
/// The extensionRequest attribute is not representable: it is produced from
/// the template's requested extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CsrAttributeType {
    ChallengePassword,
    UnstructuredName,
    Other(ObjectIdentifier),
}

impl CsrAttributeType {
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            CsrAttributeType::ChallengePassword => CHALLENGE_PASSWORD,
            CsrAttributeType::UnstructuredName => UNSTRUCTURED_NAME,
            CsrAttributeType::Other(oid) => *oid,
        }
    }

    pub fn from_oid(oid: ObjectIdentifier) -> Result<Self> {
        if oid == CHALLENGE_PASSWORD {
            Ok(CsrAttributeType::ChallengePassword)
        } else if oid == UNSTRUCTURED_NAME {
            Ok(CsrAttributeType::UnstructuredName)
        } else if oid == EXTENSION_REQUEST {
            Err(PkiKitError::InvalidAttributeType(
                "extensionRequest is built from the requested extensions".to_string(),
            ))
        } else {
            Ok(CsrAttributeType::Other(oid))
        }
    }
}

impl fmt::Display for CsrAttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsrAttributeType::ChallengePassword => f.write_str("challengePassword"),
            CsrAttributeType::UnstructuredName => f.write_str("unstructuredName"),
            CsrAttributeType::Other(oid) => write!(f, "{oid}"),
        }
    }
}

impl FromStr for CsrAttributeType {
    type Err = PkiKitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "challengePassword" => Ok(CsrAttributeType::ChallengePassword),
            "unstructuredName" => Ok(CsrAttributeType::UnstructuredName),
            _ => {
                let oid = ObjectIdentifier::new(s)
                    .map_err(|_| PkiKitError::InvalidAttributeType(s.to_string()))?;
                Self::from_oid(oid)
            }
        }
    }
}

/// How [`CsrAttributes::update`] treats the attributes already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeUpdate {
    /// Discard every previous attribute.
    Replace,
    /// Keep previous attributes; a type given again takes the new value.
    Merge,
}

/// Ordered CSR attributes, one value per type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsrAttributes {
    entries: Vec<(CsrAttributeType, String)>,
}

impl CsrAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds attributes.
    ///
    /// Fails with `DuplicateAttribute` if a type appears twice in `pairs` with
    /// different values, or is already set to a different value; use
    /// [`CsrAttributes::update`] to overwrite. Identical repeats collapse.
    pub fn set<I, V>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (CsrAttributeType, V)>,
        V: Into<String>,
    {
        let mut entries = self.entries.clone();
        for (attr_type, value) in Self::collect_unique(pairs)? {
            match entries.iter().find(|(t, _)| *t == attr_type) {
                Some((_, existing)) if *existing == value => {}
                Some((_, existing)) => {
                    return Err(PkiKitError::DuplicateAttribute(format!(
                        "{attr_type} is already {existing:?}, refusing {value:?}"
                    )));
                }
                None => entries.push((attr_type, value)),
            }
        }
        self.entries = entries;
        Ok(())
    }

    /// Overwrites attributes according to `mode`.
    ///
    /// Conflicting values for one type within `pairs` still fail with
    /// `DuplicateAttribute`.
    pub fn update<I, V>(&mut self, pairs: I, mode: AttributeUpdate) -> Result<()>
    where
        I: IntoIterator<Item = (CsrAttributeType, V)>,
        V: Into<String>,
    {
        let updates = Self::collect_unique(pairs)?;
        match mode {
            AttributeUpdate::Replace => self.entries = updates,
            AttributeUpdate::Merge => {
                for (attr_type, value) in updates {
                    match self.entries.iter_mut().find(|(t, _)| *t == attr_type) {
                        Some(entry) => entry.1 = value,
                        None => self.entries.push((attr_type, value)),
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, attr_type: CsrAttributeType) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| *t == attr_type)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (CsrAttributeType, &str)> {
        self.entries.iter().map(|(t, v)| (*t, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn collect_unique<I, V>(pairs: I) -> Result<Vec<(CsrAttributeType, String)>>
    where
        I: IntoIterator<Item = (CsrAttributeType, V)>,
        V: Into<String>,
    {
        let mut unique: Vec<(CsrAttributeType, String)> = Vec::new();
        for (attr_type, value) in pairs {
            let value = value.into();
            if attr_type.oid() == EXTENSION_REQUEST {
                return Err(PkiKitError::InvalidAttributeType(
                    "extensionRequest is built from the requested extensions".to_string(),
                ));
            }
            if value.is_empty() {
                return Err(PkiKitError::InvalidAttributeType(format!(
                    "{attr_type} has an empty value"
                )));
            }
            match unique.iter().find(|(t, _)| *t == attr_type) {
                Some((_, existing)) if *existing == value => {}
                Some((_, existing)) => {
                    return Err(PkiKitError::DuplicateAttribute(format!(
                        "{attr_type} given as both {existing:?} and {value:?}"
                    )));
                }
                None => unique.push((attr_type, value)),
            }
        }
        Ok(unique)
    }

    fn to_x509(&self) -> Result<Vec<Attribute>> {
        self.entries
            .iter()
            .map(|(attr_type, value)| -> Result<Attribute> {
                let value = Any::encode_from(&Utf8StringRef::new(value)?)?;
                Ok(Attribute {
                    oid: attr_type.oid(),
                    values: SetOfVec::try_from(vec![value])?,
                })
            })
            .collect()
    }
}

/// An unsigned certification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrTemplate {
    subject: DistinguishedName,
    public_key: PublicKey,
    attributes: CsrAttributes,
    requested_extensions: ExtensionSet,
}

impl CsrTemplate {
    /// Validates and assembles a request template.
    ///
    /// A derived subject key identifier is filled in from `public_key`; an
    /// authority key identifier without fields is rejected, since a request has
    /// no issuer to derive it from.
    pub fn new(
        subject: DistinguishedName,
        public_key: PublicKey,
        attributes: CsrAttributes,
        requested_extensions: ExtensionSet,
    ) -> Result<Self> {
        subject.to_x509_name()?;
        let requested_extensions =
            requested_extensions.resolve_key_identifiers(&public_key.key_identifier()?, false)?;
        Ok(Self {
            subject,
            public_key,
            attributes,
            requested_extensions,
        })
    }

    /// A copy of this template with its attributes updated.
    pub fn with_attributes<I, V>(&self, pairs: I, mode: AttributeUpdate) -> Result<Self>
    where
        I: IntoIterator<Item = (CsrAttributeType, V)>,
        V: Into<String>,
    {
        let mut attributes = self.attributes.clone();
        attributes.update(pairs, mode)?;
        Ok(Self {
            attributes,
            ..self.clone()
        })
    }

    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn attributes(&self) -> &CsrAttributes {
        &self.attributes
    }

    pub fn requested_extensions(&self) -> &ExtensionSet {
        &self.requested_extensions
    }

    pub fn to_cert_req_info(&self) -> Result<CertReqInfo> {
        let mut attributes = self.attributes.to_x509()?;
        if !self.requested_extensions.is_empty() {
            let request: Vec<X509Extension> = self.requested_extensions.to_x509()?;
            attributes.push(Attribute {
                oid: EXTENSION_REQUEST,
                values: SetOfVec::try_from(vec![Any::encode_from(&request)?])?,
            });
        }

        Ok(CertReqInfo {
            version: Version::V1,
            subject: self.subject.to_x509_name()?,
            public_key: self.public_key.to_spki()?,
            attributes: SetOfVec::try_from(attributes)?,
        })
    }

    /// Reads a template back from a decoded request, without re-validation.
    pub fn from_cert_req_info(info: &CertReqInfo) -> Result<Self> {
        let mut attributes = CsrAttributes::new();
        let mut requested_extensions = ExtensionSet::empty();
        for attr in info.attributes.iter() {
            let value = attr.values.iter().next().ok_or_else(|| {
                PkiKitError::DecodingError(format!("attribute {} has no value", attr.oid))
            })?;
            if attr.oid == EXTENSION_REQUEST {
                let request = Vec::<X509Extension>::from_der(&value.to_der()?)?;
                requested_extensions = ExtensionSet::from_x509(&request);
                continue;
            }
            let text = std::str::from_utf8(value.value())
                .map_err(|e| PkiKitError::DecodingError(e.to_string()))?;
            attributes
                .entries
                .push((CsrAttributeType::from_oid(attr.oid)?, text.to_string()));
        }

        Ok(Self {
            subject: DistinguishedName::from_x509_name(&info.subject)?,
            public_key: PublicKey::from_x509spki(&info.public_key)?,
            attributes,
            requested_extensions,
        })
    }
}

impl ToBeSigned for CsrTemplate {
    type Signed = SignedCsr;
    const KIND: &'static str = "certification request";

    /// The request info carries no algorithm; it only appears outside the signed part.
    fn tbs_der(&self, _algorithm: SignatureAlgorithm) -> Result<Vec<u8>> {
        Ok(self.to_cert_req_info()?.to_der()?)
    }

    fn check_signing_key(&self, signing_key: &PublicKey) -> Result<()> {
        if signing_key != &self.public_key {
            return Err(PkiKitError::SigningKeyMismatch(format!(
                "request for {} must be signed by its own key",
                self.subject
            )));
        }
        Ok(())
    }

    fn into_signed(self, algorithm: SignatureAlgorithm, signature: Vec<u8>) -> Result<SignedCsr> {
        let inner = CertReq {
            info: self.to_cert_req_info()?,
            algorithm: algorithm.into(),
            signature: BitString::from_bytes(&signature)?,
        };
        SignedCsr::from_inner(self, algorithm, signature, inner)
    }
}

/// A signed, immutable certification request.
///
/// The signature is made with the subject's own key and proves possession of it.
#[derive(Debug, Clone)]
pub struct SignedCsr {
    template: CsrTemplate,
    signature_algorithm: SignatureAlgorithm,
    signature: Vec<u8>,
    inner: CertReq,
    info_der: Vec<u8>,
    der: Vec<u8>,
}

impl SignedCsr {
    fn from_inner(
        template: CsrTemplate,
        signature_algorithm: SignatureAlgorithm,
        signature: Vec<u8>,
        inner: CertReq,
    ) -> Result<Self> {
        let info_der = inner.info.to_der()?;
        let der = inner.to_der()?;
        Ok(Self {
            template,
            signature_algorithm,
            signature,
            inner,
            info_der,
            der,
        })
    }

    pub fn template(&self) -> &CsrTemplate {
        &self.template
    }

    pub fn subject(&self) -> &DistinguishedName {
        self.template.subject()
    }

    pub fn public_key(&self) -> &PublicKey {
        self.template.public_key()
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.signature_algorithm
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The underlying `x509-cert` structure.
    pub fn as_x509(&self) -> &CertReq {
        &self.inner
    }

    /// Checks the proof of possession against the embedded public key.
    pub fn verify(&self) -> Result<()> {
        self.template
            .public_key
            .verify(self.signature_algorithm, &self.info_der, &self.signature)
    }
}

impl PartialEq for SignedCsr {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for SignedCsr {}

impl PemEncodable for SignedCsr {
    const PEM_LABEL: &'static str = "CERTIFICATE REQUEST";

    fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.der.clone())
    }

    fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertReq::from_der(der)?;
        let signature_algorithm = SignatureAlgorithm::from_oid(inner.algorithm.oid)?;
        let template = CsrTemplate::from_cert_req_info(&inner.info)?;
        let signature = inner
            .signature
            .as_bytes()
            .ok_or_else(|| PkiKitError::DecodingError("signature has unused bits".to_string()))?
            .to_vec();
        Self::from_inner(template, signature_algorithm, signature, inner)
    }
}
