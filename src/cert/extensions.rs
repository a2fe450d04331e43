use std::collections::HashSet;
use std::net::IpAddr;

use const_oid::AssociatedOid;
use const_oid::ObjectIdentifier;
use der::{
    Decode, Encode,
    asn1::{Ia5String, OctetString},
};
use x509_cert::ext::pkix::name::GeneralName;

pub use der::flagset::FlagSet;
use x509_cert::ext::pkix::KeyUsage as X509KeyUsage;
pub use x509_cert::ext::pkix::KeyUsages;

use crate::error::{PkiKitError, Result};

use super::params::{DistinguishedName, ExtensionParam, Serial};

/// Trait for converting to and from X.509 extensions.
///
/// This trait provides methods to encode and decode X.509 extension values.
///
/// # Example
/// ```
/// use pkikit::cert::extensions::{AltName, SubjectAltName};
/// use pkikit::cert::extensions::ToAndFromX509Extension;
/// let san = SubjectAltName { names: vec![AltName::Dns("example.com".to_string())] };
/// let encoded = san.to_x509_extension_value().unwrap();
/// let decoded = SubjectAltName::from_x509_extension_value(&encoded).unwrap();
/// assert_eq!(san, decoded);
/// ```
pub trait ToAndFromX509Extension {
    /// The Object Identifier (OID) for the extension.
    const OID: ObjectIdentifier;

    /// Name used in error messages.
    const NAME: &'static str;

    /// Criticality used when the extension is encoded.
    const CRITICAL: bool = false;

    /// Encodes the extension into a DER-encoded byte vector.
    fn to_x509_extension_value(&self) -> Result<Vec<u8>>;

    /// Decodes the extension from a DER-encoded byte slice.
    fn from_x509_extension_value(extension: &[u8]) -> Result<Self>
    where
        Self: Sized;
}

/// One entry of a subject alternative name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AltName {
    Dns(String),
    Uri(String),
    Ip(IpAddr),
    Email(String),
    Directory(DistinguishedName),
}

impl AltName {
    fn to_general_name(&self) -> Result<GeneralName> {
        let ia5 = |kind: &str, value: &str| {
            if value.is_empty() {
                return Err(PkiKitError::invalid_extension(
                    SubjectAltName::NAME,
                    format!("empty {kind} name"),
                ));
            }
            Ia5String::new(value).map_err(|e| {
                PkiKitError::invalid_extension(
                    SubjectAltName::NAME,
                    format!("{kind} name {value:?} is not IA5: {e}"),
                )
            })
        };
        Ok(match self {
            AltName::Dns(name) => GeneralName::DnsName(ia5("DNS", name)?),
            AltName::Uri(uri) => GeneralName::UniformResourceIdentifier(ia5("URI", uri)?),
            AltName::Email(email) => GeneralName::Rfc822Name(ia5("email", email)?),
            AltName::Ip(IpAddr::V4(ip)) => GeneralName::IpAddress(OctetString::new(ip.octets())?),
            AltName::Ip(IpAddr::V6(ip)) => GeneralName::IpAddress(OctetString::new(ip.octets())?),
            AltName::Directory(dn) => GeneralName::DirectoryName(dn.to_x509_name()?),
        })
    }

    fn from_general_name(name: &GeneralName) -> Result<Self> {
        Ok(match name {
            GeneralName::DnsName(dns) => AltName::Dns(dns.to_string()),
            GeneralName::UniformResourceIdentifier(uri) => AltName::Uri(uri.to_string()),
            GeneralName::Rfc822Name(email) => AltName::Email(email.to_string()),
            GeneralName::IpAddress(octets) => match octets.as_bytes().len() {
                4 => {
                    let mut ip = [0u8; 4];
                    ip.copy_from_slice(octets.as_bytes());
                    AltName::Ip(IpAddr::from(ip))
                }
                16 => {
                    let mut ip = [0u8; 16];
                    ip.copy_from_slice(octets.as_bytes());
                    AltName::Ip(IpAddr::from(ip))
                }
                len => {
                    return Err(PkiKitError::DecodingError(format!(
                        "IP address of {len} octets"
                    )));
                }
            },
            GeneralName::DirectoryName(dn) => {
                AltName::Directory(DistinguishedName::from_x509_name(dn)?)
            }
            _ => {
                return Err(PkiKitError::DecodingError(
                    "Unsupported general name type".to_string(),
                ));
            }
        })
    }
}

/// Represents the Subject Alternative Name (SAN) extension.
///
/// This extension specifies additional identities for the subject of the certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectAltName {
    pub names: Vec<AltName>,
}

impl ToAndFromX509Extension for SubjectAltName {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectAltName::OID;
    const NAME: &'static str = "subjectAltName";

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let san = x509_cert::ext::pkix::SubjectAltName(
            self.names
                .iter()
                .map(AltName::to_general_name)
                .collect::<Result<Vec<_>>>()?,
        );

        Ok(san.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let san = x509_cert::ext::pkix::SubjectAltName::from_der(extension)?;
        let names = san
            .0
            .iter()
            .map(AltName::from_general_name)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { names })
    }
}

/// Represents the Basic Constraints extension.
///
/// This extension indicates whether the certificate is a CA certificate and its path length.
///
/// # Fields
/// * `is_ca` - Indicates if the certificate is a CA.
/// * `max_path_length` - The maximum number of intermediate CAs allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicConstraints {
    pub is_ca: bool,
    pub max_path_length: Option<u8>,
}

impl ToAndFromX509Extension for BasicConstraints {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::BasicConstraints::OID;
    const NAME: &'static str = "basicConstraints";
    const CRITICAL: bool = true;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let bc = x509_cert::ext::pkix::BasicConstraints {
            ca: self.is_ca,
            path_len_constraint: self.max_path_length,
        };

        Ok(bc.to_der()?)
    }

    fn from_x509_extension_value(der_bytes: &[u8]) -> Result<Self> {
        let bc = x509_cert::ext::pkix::BasicConstraints::from_der(der_bytes)?;
        Ok(Self {
            is_ca: bc.ca,
            max_path_length: bc.path_len_constraint,
        })
    }
}

/// Represents the Key Usage extension.
///
/// This extension defines the purpose of the key contained in the certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsage(pub FlagSet<KeyUsages>);

impl ToAndFromX509Extension for KeyUsage {
    const OID: ObjectIdentifier = <X509KeyUsage as AssociatedOid>::OID;
    const NAME: &'static str = "keyUsage";
    const CRITICAL: bool = true;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let ku = X509KeyUsage(self.0);
        Ok(ku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let ku = X509KeyUsage::from_der(extension)?;
        Ok(Self(ku.0))
    }
}

/// Represents the Extended Key Usage extension.
///
/// This extension indicates purposes for which the public key may be used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedKeyUsage {
    pub usage: Vec<ExtendedKeyUsageOption>,
}

impl ToAndFromX509Extension for ExtendedKeyUsage {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::ExtendedKeyUsage::OID;
    const NAME: &'static str = "extKeyUsage";

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let oids: Vec<ObjectIdentifier> = self.usage.iter().map(|v| (*v).into()).collect();
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage(oids);
        Ok(eku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage::from_der(extension)?;
        let usage = eku.0.iter().map(|oid| ExtendedKeyUsageOption::from(*oid)).collect();
        Ok(Self { usage })
    }
}

/// Represents an option for the Extended Key Usage extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedKeyUsageOption {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
    OcspSigning,
    Other(ObjectIdentifier),
}

impl From<ExtendedKeyUsageOption> for ObjectIdentifier {
    fn from(value: ExtendedKeyUsageOption) -> Self {
        match value {
            ExtendedKeyUsageOption::OcspSigning => const_oid::db::rfc5912::ID_KP_OCSP_SIGNING,
            ExtendedKeyUsageOption::ServerAuth => const_oid::db::rfc5912::ID_KP_SERVER_AUTH,
            ExtendedKeyUsageOption::ClientAuth => const_oid::db::rfc5912::ID_KP_CLIENT_AUTH,
            ExtendedKeyUsageOption::CodeSigning => const_oid::db::rfc5912::ID_KP_CODE_SIGNING,
            ExtendedKeyUsageOption::EmailProtection => {
                const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION
            }
            ExtendedKeyUsageOption::TimeStamping => const_oid::db::rfc5912::ID_KP_TIME_STAMPING,
            ExtendedKeyUsageOption::Other(oid) => oid,
        }
    }
}

impl From<ObjectIdentifier> for ExtendedKeyUsageOption {
    fn from(oid: ObjectIdentifier) -> Self {
        match oid {
            const_oid::db::rfc5912::ID_KP_OCSP_SIGNING => ExtendedKeyUsageOption::OcspSigning,
            const_oid::db::rfc5912::ID_KP_SERVER_AUTH => ExtendedKeyUsageOption::ServerAuth,
            const_oid::db::rfc5912::ID_KP_CLIENT_AUTH => ExtendedKeyUsageOption::ClientAuth,
            const_oid::db::rfc5912::ID_KP_CODE_SIGNING => ExtendedKeyUsageOption::CodeSigning,
            const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION => {
                ExtendedKeyUsageOption::EmailProtection
            }
            const_oid::db::rfc5912::ID_KP_TIME_STAMPING => ExtendedKeyUsageOption::TimeStamping,
            other => ExtendedKeyUsageOption::Other(other),
        }
    }
}

/// Represents the Subject Key Identifier extension.
///
/// A `None` key identifier is derived from the subject public key when the
/// template is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectKeyIdentifier {
    pub key_identifier: Option<Vec<u8>>,
}

impl SubjectKeyIdentifier {
    /// A key identifier to be derived from the subject public key.
    pub fn derived() -> Self {
        Self::default()
    }
}

impl ToAndFromX509Extension for SubjectKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectKeyIdentifier::OID;
    const NAME: &'static str = "subjectKeyIdentifier";

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let key_identifier = self.key_identifier.as_ref().ok_or_else(|| {
            PkiKitError::invalid_extension(Self::NAME, "key identifier was never derived")
        })?;
        let ski = x509_cert::ext::pkix::SubjectKeyIdentifier(OctetString::new(
            key_identifier.as_slice(),
        )?);
        Ok(ski.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let ski = x509_cert::ext::pkix::SubjectKeyIdentifier::from_der(extension)?;
        Ok(Self {
            key_identifier: Some(ski.0.as_bytes().to_vec()),
        })
    }
}

/// Represents the Authority Key Identifier (AKI) extension.
///
/// This extension identifies the public key corresponding to the private key used to sign the certificate.
///
/// # Fields
/// * `key_identifier` - The key identifier.
/// * `authority_cert_issuer` - The issuer name of the authority's certificate.
/// * `authority_cert_serial_number` - The serial number of the authority's certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorityKeyIdentifier {
    pub key_identifier: Option<Vec<u8>>,
    pub authority_cert_issuer: Option<DistinguishedName>,
    pub authority_cert_serial_number: Option<Serial>,
}

impl AuthorityKeyIdentifier {
    /// An identifier to be derived from the subject key of a self-issued certificate.
    pub fn derived() -> Self {
        Self::default()
    }

    fn is_unresolved(&self) -> bool {
        self.key_identifier.is_none()
            && self.authority_cert_issuer.is_none()
            && self.authority_cert_serial_number.is_none()
    }
}

impl ToAndFromX509Extension for AuthorityKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::AuthorityKeyIdentifier::OID;
    const NAME: &'static str = "authorityKeyIdentifier";

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        if self.is_unresolved() {
            return Err(PkiKitError::invalid_extension(
                Self::NAME,
                "key identifier was never derived",
            ));
        }

        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier {
            key_identifier: self
                .key_identifier
                .as_ref()
                .map(|id| OctetString::new(id.as_slice()))
                .transpose()?,
            authority_cert_issuer: self
                .authority_cert_issuer
                .as_ref()
                .map(|dn| dn.to_x509_name().map(|name| vec![GeneralName::DirectoryName(name)]))
                .transpose()?,
            authority_cert_serial_number: self
                .authority_cert_serial_number
                .as_ref()
                .map(Serial::to_x509)
                .transpose()?,
        };

        Ok(aki.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier::from_der(extension)?;

        let authority_cert_issuer = aki
            .authority_cert_issuer
            .as_ref()
            .and_then(|names| {
                names.iter().find_map(|name| match name {
                    GeneralName::DirectoryName(dn) => Some(DistinguishedName::from_x509_name(dn)),
                    _ => None,
                })
            })
            .transpose()?;

        Ok(Self {
            key_identifier: aki.key_identifier.map(|id| id.as_bytes().to_vec()),
            authority_cert_issuer,
            authority_cert_serial_number: aki
                .authority_cert_serial_number
                .map(|sn| Serial::from_bytes(sn.as_bytes())),
        })
    }
}

der::flagset::flags! {
    /// Netscape certificate type bits.
    pub enum NsCertTypes: u8 {
        Client = 1 << 0,
        Server = 1 << 1,
        Email = 1 << 2,
        ObjSign = 1 << 3,
        Reserved = 1 << 4,
        SslCa = 1 << 5,
        EmailCa = 1 << 6,
        ObjCa = 1 << 7,
    }
}

/// Represents the legacy Netscape Certificate Type extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NsCertType(pub FlagSet<NsCertTypes>);

impl NsCertType {
    /// True when no CA bit is set.
    pub fn is_end_entity_only(&self) -> bool {
        (self.0 & (NsCertTypes::SslCa | NsCertTypes::EmailCa | NsCertTypes::ObjCa)).is_empty()
    }
}

impl ToAndFromX509Extension for NsCertType {
    const OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.113730.1.1");
    const NAME: &'static str = "nsCertType";

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        Ok(self.0.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        Ok(Self(FlagSet::<NsCertTypes>::from_der(extension)?))
    }
}

/// A typed X.509v3 extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    BasicConstraints(BasicConstraints),
    KeyUsage(KeyUsage),
    ExtendedKeyUsage(ExtendedKeyUsage),
    SubjectAltName(SubjectAltName),
    SubjectKeyIdentifier(SubjectKeyIdentifier),
    AuthorityKeyIdentifier(AuthorityKeyIdentifier),
    NsCertType(NsCertType),
    /// Any other extension, already DER-encoded.
    Custom(ExtensionParam),
}

impl Extension {
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            Extension::BasicConstraints(_) => BasicConstraints::OID,
            Extension::KeyUsage(_) => KeyUsage::OID,
            Extension::ExtendedKeyUsage(_) => ExtendedKeyUsage::OID,
            Extension::SubjectAltName(_) => SubjectAltName::OID,
            Extension::SubjectKeyIdentifier(_) => SubjectKeyIdentifier::OID,
            Extension::AuthorityKeyIdentifier(_) => AuthorityKeyIdentifier::OID,
            Extension::NsCertType(_) => NsCertType::OID,
            Extension::Custom(param) => param.oid,
        }
    }

    /// Short name of the extension kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Extension::BasicConstraints(_) => BasicConstraints::NAME,
            Extension::KeyUsage(_) => KeyUsage::NAME,
            Extension::ExtendedKeyUsage(_) => ExtendedKeyUsage::NAME,
            Extension::SubjectAltName(_) => SubjectAltName::NAME,
            Extension::SubjectKeyIdentifier(_) => SubjectKeyIdentifier::NAME,
            Extension::AuthorityKeyIdentifier(_) => AuthorityKeyIdentifier::NAME,
            Extension::NsCertType(_) => NsCertType::NAME,
            Extension::Custom(_) => "custom",
        }
    }

    pub fn to_param(&self) -> Result<ExtensionParam> {
        match self {
            Extension::BasicConstraints(ext) => ExtensionParam::from_extension(ext),
            Extension::KeyUsage(ext) => ExtensionParam::from_extension(ext),
            Extension::ExtendedKeyUsage(ext) => ExtensionParam::from_extension(ext),
            Extension::SubjectAltName(ext) => ExtensionParam::from_extension(ext),
            Extension::SubjectKeyIdentifier(ext) => ExtensionParam::from_extension(ext),
            Extension::AuthorityKeyIdentifier(ext) => ExtensionParam::from_extension(ext),
            Extension::NsCertType(ext) => ExtensionParam::from_extension(ext),
            Extension::Custom(param) => Ok(param.clone()),
        }
    }

    /// Types an encoded extension; unknown or undecodable ones stay `Custom`.
    pub fn from_param(param: &ExtensionParam) -> Self {
        let oid = param.oid;
        let typed = if oid == BasicConstraints::OID {
            param.to_extension().map(Extension::BasicConstraints)
        } else if oid == KeyUsage::OID {
            param.to_extension().map(Extension::KeyUsage)
        } else if oid == ExtendedKeyUsage::OID {
            param.to_extension().map(Extension::ExtendedKeyUsage)
        } else if oid == SubjectAltName::OID {
            param.to_extension().map(Extension::SubjectAltName)
        } else if oid == SubjectKeyIdentifier::OID {
            param.to_extension().map(Extension::SubjectKeyIdentifier)
        } else if oid == AuthorityKeyIdentifier::OID {
            param.to_extension().map(Extension::AuthorityKeyIdentifier)
        } else if oid == NsCertType::OID {
            param.to_extension().map(Extension::NsCertType)
        } else {
            return Extension::Custom(param.clone());
        };
        typed.unwrap_or_else(|_| Extension::Custom(param.clone()))
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Err(PkiKitError::invalid_extension(self.kind(), reason));
        match self {
            Extension::BasicConstraints(bc) if !bc.is_ca && bc.max_path_length.is_some() => {
                invalid("path length constraint requires cA = true")
            }
            Extension::KeyUsage(ku) if ku.0.is_empty() => invalid("no key usage flag set"),
            Extension::ExtendedKeyUsage(eku) if eku.usage.is_empty() => {
                invalid("no key purpose listed")
            }
            Extension::SubjectAltName(san) if san.names.is_empty() => {
                invalid("at least one alternative name is required")
            }
            Extension::SubjectAltName(san) => {
                for name in &san.names {
                    name.to_general_name()?;
                }
                Ok(())
            }
            Extension::SubjectKeyIdentifier(SubjectKeyIdentifier {
                key_identifier: Some(id),
            }) if id.is_empty() => invalid("key identifier is empty"),
            Extension::AuthorityKeyIdentifier(aki)
                if aki.authority_cert_issuer.is_some()
                    != aki.authority_cert_serial_number.is_some() =>
            {
                invalid("issuer and serial number must be given together")
            }
            Extension::AuthorityKeyIdentifier(AuthorityKeyIdentifier {
                key_identifier: Some(id),
                ..
            }) if id.is_empty() => invalid("key identifier is empty"),
            Extension::NsCertType(ns) if ns.0.is_empty() => invalid("no certificate type set"),
            _ => Ok(()),
        }
    }
}

/// An ordered, validated list of extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet(Vec<Extension>);

impl ExtensionSet {
    /// Validates each extension and the combination, keeping the given order.
    pub fn build(specs: impl IntoIterator<Item = Extension>) -> Result<Self> {
        let extensions: Vec<Extension> = specs.into_iter().collect();
        Self::validate(&extensions)?;
        Ok(Self(extensions))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Appends `more` and validates the combined set again.
    pub fn extend_with(self, more: impl IntoIterator<Item = Extension>) -> Result<Self> {
        Self::build(self.0.into_iter().chain(more))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Extension] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn basic_constraints(&self) -> Option<&BasicConstraints> {
        self.0.iter().find_map(|ext| match ext {
            Extension::BasicConstraints(bc) => Some(bc),
            _ => None,
        })
    }

    pub fn key_usage(&self) -> Option<&KeyUsage> {
        self.0.iter().find_map(|ext| match ext {
            Extension::KeyUsage(ku) => Some(ku),
            _ => None,
        })
    }

    pub fn subject_alt_name(&self) -> Option<&SubjectAltName> {
        self.0.iter().find_map(|ext| match ext {
            Extension::SubjectAltName(san) => Some(san),
            _ => None,
        })
    }

    pub fn subject_key_identifier(&self) -> Option<&SubjectKeyIdentifier> {
        self.0.iter().find_map(|ext| match ext {
            Extension::SubjectKeyIdentifier(ski) => Some(ski),
            _ => None,
        })
    }

    pub fn authority_key_identifier(&self) -> Option<&AuthorityKeyIdentifier> {
        self.0.iter().find_map(|ext| match ext {
            Extension::AuthorityKeyIdentifier(aki) => Some(aki),
            _ => None,
        })
    }

    fn validate(extensions: &[Extension]) -> Result<()> {
        let mut seen = HashSet::new();
        for ext in extensions {
            if !seen.insert(ext.oid()) {
                return Err(PkiKitError::invalid_extension(
                    ext.kind(),
                    "extension appears more than once",
                ));
            }
            ext.validate()?;
        }

        let basic_constraints = extensions.iter().find_map(|ext| match ext {
            Extension::BasicConstraints(bc) => Some(*bc),
            _ => None,
        });
        let key_usage = extensions.iter().find_map(|ext| match ext {
            Extension::KeyUsage(ku) => Some(*ku),
            _ => None,
        });
        let ns_cert_type = extensions.iter().find_map(|ext| match ext {
            Extension::NsCertType(ns) => Some(*ns),
            _ => None,
        });

        if let Some(bc) = basic_constraints {
            if bc.is_ca {
                if ns_cert_type.is_some_and(|ns| ns.is_end_entity_only()) {
                    return Err(PkiKitError::invalid_extension(
                        BasicConstraints::NAME,
                        "cA = true conflicts with an end-entity only nsCertType",
                    ));
                }
                if key_usage.is_some_and(|ku| !ku.0.contains(KeyUsages::KeyCertSign)) {
                    return Err(PkiKitError::invalid_extension(
                        KeyUsage::NAME,
                        "a CA certificate must assert keyCertSign",
                    ));
                }
            } else if key_usage.is_some_and(|ku| ku.0.contains(KeyUsages::KeyCertSign)) {
                return Err(PkiKitError::invalid_extension(
                    KeyUsage::NAME,
                    "keyCertSign requires basicConstraints cA = true",
                ));
            }
        }
        Ok(())
    }

    /// Fills in derivable key identifiers.
    ///
    /// The SKI comes from `subject_key_id`; an empty AKI takes it too when the
    /// certificate is self-issued and is rejected otherwise.
    pub(crate) fn resolve_key_identifiers(
        &self,
        subject_key_id: &[u8],
        self_issued: bool,
    ) -> Result<Self> {
        let resolved = self
            .0
            .iter()
            .map(|ext| match ext {
                Extension::SubjectKeyIdentifier(SubjectKeyIdentifier {
                    key_identifier: None,
                }) => Ok(Extension::SubjectKeyIdentifier(SubjectKeyIdentifier {
                    key_identifier: Some(subject_key_id.to_vec()),
                })),
                Extension::AuthorityKeyIdentifier(aki) if aki.is_unresolved() => {
                    if self_issued {
                        Ok(Extension::AuthorityKeyIdentifier(AuthorityKeyIdentifier {
                            key_identifier: Some(subject_key_id.to_vec()),
                            ..AuthorityKeyIdentifier::default()
                        }))
                    } else {
                        Err(PkiKitError::invalid_extension(
                            AuthorityKeyIdentifier::NAME,
                            "a key identifier can only be derived for a self-issued certificate",
                        ))
                    }
                }
                other => Ok(other.clone()),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(resolved))
    }

    /// Fills in `aki` unless the set already names its authority explicitly.
    pub(crate) fn with_authority_key_identifier(self, aki: AuthorityKeyIdentifier) -> Result<Self> {
        let mut extensions = self.0;
        let existing = extensions.iter_mut().find_map(|ext| match ext {
            Extension::AuthorityKeyIdentifier(existing) => Some(existing),
            _ => None,
        });
        match existing {
            Some(existing) if existing.is_unresolved() => *existing = aki,
            Some(_) => {}
            None => extensions.push(Extension::AuthorityKeyIdentifier(aki)),
        }
        Self::build(extensions)
    }

    pub(crate) fn to_x509(&self) -> Result<Vec<x509_cert::ext::Extension>> {
        self.0
            .iter()
            .map(|ext| -> Result<x509_cert::ext::Extension> { ext.to_param()?.to_x509() })
            .collect()
    }

    /// Types extensions read from an encoded certificate or request, without validation.
    pub(crate) fn from_x509(extensions: &[x509_cert::ext::Extension]) -> Self {
        Self(
            extensions
                .iter()
                .map(|ext| Extension::from_param(&ExtensionParam::from_x509(ext)))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a ExtensionSet {
    type Item = &'a Extension;
    type IntoIter = std::slice::Iter<'a, Extension>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
