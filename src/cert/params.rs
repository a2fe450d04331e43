use std::fmt;
use std::str::FromStr;

use bon::bon;
use const_oid::ObjectIdentifier;
use der::asn1::{Any, Ia5StringRef, PrintableStringRef, SetOfVec, Utf8StringRef};
use der::{Tag, Tagged};
use time::Duration;
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
pub use crate::cert::extensions::ExtendedKeyUsage;
pub use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::error::{PkiKitError, Result};

/// Longest serial number RFC 5280 allows, in encoded octets.
pub const MAX_SERIAL_LEN: usize = 20;

/// Attribute types that may appear in a distinguished name.
///
/// Names are resolved once, when the name is built; anything that is neither a
/// registered short/long name nor a dotted OID is rejected there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeType {
    CommonName,
    Country,
    StateOrProvince,
    Locality,
    Organization,
    OrganizationalUnit,
    EmailAddress,
    SerialNumber,
    StreetAddress,
    Title,
    GivenName,
    Surname,
    DomainComponent,
    Other(ObjectIdentifier),
}

const REGISTRY: [AttributeType; 13] = [
    AttributeType::CommonName,
    AttributeType::Country,
    AttributeType::StateOrProvince,
    AttributeType::Locality,
    AttributeType::Organization,
    AttributeType::OrganizationalUnit,
    AttributeType::EmailAddress,
    AttributeType::SerialNumber,
    AttributeType::StreetAddress,
    AttributeType::Title,
    AttributeType::GivenName,
    AttributeType::Surname,
    AttributeType::DomainComponent,
];

impl AttributeType {
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            AttributeType::CommonName => ObjectIdentifier::new_unwrap("2.5.4.3"),
            AttributeType::Surname => ObjectIdentifier::new_unwrap("2.5.4.4"),
            AttributeType::SerialNumber => ObjectIdentifier::new_unwrap("2.5.4.5"),
            AttributeType::Country => ObjectIdentifier::new_unwrap("2.5.4.6"),
            AttributeType::Locality => ObjectIdentifier::new_unwrap("2.5.4.7"),
            AttributeType::StateOrProvince => ObjectIdentifier::new_unwrap("2.5.4.8"),
            AttributeType::StreetAddress => ObjectIdentifier::new_unwrap("2.5.4.9"),
            AttributeType::Organization => ObjectIdentifier::new_unwrap("2.5.4.10"),
            AttributeType::OrganizationalUnit => ObjectIdentifier::new_unwrap("2.5.4.11"),
            AttributeType::Title => ObjectIdentifier::new_unwrap("2.5.4.12"),
            AttributeType::GivenName => ObjectIdentifier::new_unwrap("2.5.4.42"),
            AttributeType::EmailAddress => ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1"),
            AttributeType::DomainComponent => {
                ObjectIdentifier::new_unwrap("0.9.2342.19200300.100.1.25")
            }
            AttributeType::Other(oid) => *oid,
        }
    }

    pub fn short_name(&self) -> Option<&'static str> {
        Some(match self {
            AttributeType::CommonName => "CN",
            AttributeType::Country => "C",
            AttributeType::StateOrProvince => "ST",
            AttributeType::Locality => "L",
            AttributeType::Organization => "O",
            AttributeType::OrganizationalUnit => "OU",
            AttributeType::EmailAddress => "E",
            AttributeType::SerialNumber => "serialNumber",
            AttributeType::StreetAddress => "STREET",
            AttributeType::Title => "title",
            AttributeType::GivenName => "GN",
            AttributeType::Surname => "SN",
            AttributeType::DomainComponent => "DC",
            AttributeType::Other(_) => return None,
        })
    }

    pub fn long_name(&self) -> Option<&'static str> {
        Some(match self {
            AttributeType::CommonName => "commonName",
            AttributeType::Country => "countryName",
            AttributeType::StateOrProvince => "stateOrProvinceName",
            AttributeType::Locality => "localityName",
            AttributeType::Organization => "organizationName",
            AttributeType::OrganizationalUnit => "organizationalUnitName",
            AttributeType::EmailAddress => "emailAddress",
            AttributeType::SerialNumber => "serialNumber",
            AttributeType::StreetAddress => "streetAddress",
            AttributeType::Title => "title",
            AttributeType::GivenName => "givenName",
            AttributeType::Surname => "surname",
            AttributeType::DomainComponent => "domainComponent",
            AttributeType::Other(_) => return None,
        })
    }

    /// Maps an OID back onto the registry, falling back to `Other`.
    pub fn from_oid(oid: ObjectIdentifier) -> Self {
        REGISTRY
            .into_iter()
            .find(|known| known.oid() == oid)
            .unwrap_or(AttributeType::Other(oid))
    }

    /// Checks that `value` can be carried by this attribute type.
    fn check_value(&self, value: &str) -> Result<()> {
        let invalid = |reason: &str| {
            Err(PkiKitError::InvalidAttributeType(format!(
                "{self}: {reason}"
            )))
        };
        if value.is_empty() {
            return invalid("value must not be empty");
        }
        match self {
            AttributeType::Country => {
                if value.len() != 2 || PrintableStringRef::new(value).is_err() {
                    return invalid("country must be a two letter code");
                }
            }
            AttributeType::SerialNumber if PrintableStringRef::new(value).is_err() => {
                return invalid("serial number must be a printable string");
            }
            AttributeType::EmailAddress | AttributeType::DomainComponent if !value.is_ascii() => {
                return invalid("value must be ASCII");
            }
            _ => {}
        }
        Ok(())
    }

    /// Encodes `value` with the string type RFC 5280 expects for this attribute.
    fn encode_value(&self, value: &str) -> Result<Any> {
        self.check_value(value)?;
        let any = match self {
            AttributeType::Country | AttributeType::SerialNumber => {
                Any::encode_from(&PrintableStringRef::new(value)?)
            }
            AttributeType::EmailAddress | AttributeType::DomainComponent => {
                Any::encode_from(&Ia5StringRef::new(value)?)
            }
            _ => Any::encode_from(&Utf8StringRef::new(value)?),
        };
        any.map_err(|e| PkiKitError::EncodingError(e.to_string()))
    }
}

impl FromStr for AttributeType {
    type Err = PkiKitError;

    /// Accepts a short name (`CN`), a long name (`commonName`) or a dotted OID.
    fn from_str(s: &str) -> Result<Self> {
        if let Some(known) = REGISTRY
            .into_iter()
            .find(|known| known.short_name() == Some(s) || known.long_name() == Some(s))
        {
            return Ok(known);
        }
        ObjectIdentifier::new(s)
            .map(AttributeType::from_oid)
            .map_err(|_| PkiKitError::InvalidAttributeType(s.to_string()))
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.short_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.oid()),
        }
    }
}

/// One `(type, value)` pair of a distinguished name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NameAttribute {
    pub attr_type: AttributeType,
    pub value: String,
}

/// Distinguished name parameters for building an X.509 certificate.
///
/// An ordered list of attributes; repeated types are kept, in order. Each
/// attribute is encoded as its own relative distinguished name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DistinguishedName {
    attributes: Vec<NameAttribute>,
}

#[bon]
impl DistinguishedName {
    /// Typed builder for the common attributes, emitted in CN, C, ST, L, O, OU, E order.
    #[builder]
    pub fn new(
        common_name: Option<String>,
        country: Option<String>,
        state: Option<String>,
        locality: Option<String>,
        organization: Option<String>,
        organization_unit: Option<String>,
        email: Option<String>,
    ) -> Self {
        let attributes = [
            (AttributeType::CommonName, common_name),
            (AttributeType::Country, country),
            (AttributeType::StateOrProvince, state),
            (AttributeType::Locality, locality),
            (AttributeType::Organization, organization),
            (AttributeType::OrganizationalUnit, organization_unit),
            (AttributeType::EmailAddress, email),
        ]
        .into_iter()
        .filter_map(|(attr_type, value)| value.map(|value| NameAttribute { attr_type, value }))
        .collect();
        Self { attributes }
    }
}

impl DistinguishedName {
    /// Builds a name from `(type, value)` pairs, where the type is a short name,
    /// long name or dotted OID.
    pub fn build<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let attributes = pairs
            .into_iter()
            .map(|(type_id, value)| {
                let attr_type = AttributeType::from_str(type_id.as_ref())?;
                let value = value.into();
                attr_type.check_value(&value)?;
                Ok(NameAttribute { attr_type, value })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { attributes })
    }

    pub fn attributes(&self) -> &[NameAttribute] {
        &self.attributes
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// First value carried for `attr_type`.
    pub fn get(&self, attr_type: AttributeType) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.attr_type == attr_type)
            .map(|attr| attr.value.as_str())
    }

    pub fn common_name(&self) -> Option<&str> {
        self.get(AttributeType::CommonName)
    }

    /// Converts the distinguished name to an X.509-compatible format.
    pub fn to_x509_name(&self) -> Result<x509_cert::name::DistinguishedName> {
        let rdns = self
            .attributes
            .iter()
            .map(|attr| {
                let atv = AttributeTypeAndValue {
                    oid: attr.attr_type.oid(),
                    value: attr.attr_type.encode_value(&attr.value)?,
                };
                let set = SetOfVec::try_from(vec![atv])
                    .map_err(|e| PkiKitError::EncodingError(e.to_string()))?;
                Ok(RelativeDistinguishedName(set))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509-compatible format.
    ///
    /// Multi-valued RDNs are flattened in encoded order.
    pub fn from_x509_name(x509dn: &x509_cert::name::DistinguishedName) -> Result<Self> {
        let mut attributes = Vec::new();
        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let value = match attr.value.tag() {
                    Tag::Utf8String => attr.value.decode_as::<Utf8StringRef<'_>>()?.to_string(),
                    Tag::PrintableString => {
                        attr.value.decode_as::<PrintableStringRef<'_>>()?.to_string()
                    }
                    Tag::Ia5String => attr.value.decode_as::<Ia5StringRef<'_>>()?.to_string(),
                    tag => {
                        return Err(PkiKitError::DecodingError(format!(
                            "attribute {} uses unsupported string type {tag}",
                            attr.oid
                        )))
                    }
                };
                attributes.push(NameAttribute {
                    attr_type: AttributeType::from_oid(attr.oid),
                    value,
                });
            }
        }
        Ok(Self { attributes })
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attr) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", attr.attr_type, attr.value)?;
        }
        Ok(())
    }
}

/// Certificate validity period.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity window, rejecting one that ends before it starts.
    pub fn new(not_before: OffsetDateTime, not_after: OffsetDateTime) -> Result<Self> {
        let validity = Self {
            not_before,
            not_after,
        };
        validity.check()?;
        Ok(validity)
    }

    /// Creates a validity period starting now for the given number of days.
    pub fn for_days(days: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            not_before: now,
            not_after: now + Duration::days(days),
        }
    }

    /// Creates a validity period starting now and ending on the same day `years` later.
    pub fn for_years(years: i32) -> Self {
        let now = OffsetDateTime::now_utc();
        let not_after = now
            .replace_year(now.year() + years)
            .unwrap_or_else(|_| now + Duration::days(365 * i64::from(years)));
        Self {
            not_before: now,
            not_after,
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.not_after < self.not_before {
            return Err(PkiKitError::InvalidValidity(format!(
                "not_after {} precedes not_before {}",
                self.not_after, self.not_before
            )));
        }
        Ok(())
    }

    /// DER times carry whole seconds only.
    pub(crate) fn truncated(&self) -> Self {
        Self {
            not_before: self.not_before - Duration::nanoseconds(self.not_before.nanosecond().into()),
            not_after: self.not_after - Duration::nanoseconds(self.not_after.nanosecond().into()),
        }
    }
}

/// A certificate serial number: unsigned big-endian bytes without leading zeros.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Serial(Vec<u8>);

impl Serial {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let first = bytes
            .iter()
            .position(|b| *b != 0)
            .unwrap_or(bytes.len().saturating_sub(1));
        Self(bytes[first..].to_vec())
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_bytes(&value.to_be_bytes())
    }

    /// Parses a hex serial such as `"01"`.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| PkiKitError::InvalidSerial(format!("{hex_str:?}: {e}")))?;
        Ok(Self::from_bytes(&bytes))
    }

    /// 128 random bits with the top bit cleared, so the encoding stays positive and short.
    pub fn random() -> Self {
        let mut bytes: [u8; 16] = rand::random();
        bytes[0] &= 0x7f;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the DER INTEGER content, including a sign octet when needed.
    pub fn encoded_len(&self) -> usize {
        match self.0.first() {
            Some(first) if first & 0x80 != 0 => self.0.len() + 1,
            _ => self.0.len(),
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(PkiKitError::InvalidSerial("serial number is empty".to_string()));
        }
        if self.encoded_len() > MAX_SERIAL_LEN {
            return Err(PkiKitError::InvalidSerial(format!(
                "serial number needs {} octets, at most {MAX_SERIAL_LEN} allowed",
                self.encoded_len()
            )));
        }
        Ok(())
    }

    pub(crate) fn to_x509(&self) -> Result<x509_cert::serial_number::SerialNumber> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        if self.encoded_len() > self.0.len() {
            bytes.push(0);
        }
        bytes.extend_from_slice(&self.0);
        Ok(x509_cert::serial_number::SerialNumber::new(&bytes)?)
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// Represents an encoded X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension with its default criticality.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: &E) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical: E::CRITICAL,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        E::from_x509_extension_value(&self.value)
    }

    pub(crate) fn to_x509(&self) -> Result<x509_cert::ext::Extension> {
        Ok(x509_cert::ext::Extension {
            extn_id: self.oid,
            critical: self.critical,
            extn_value: der::asn1::OctetString::new(self.value.clone())?,
        })
    }

    pub(crate) fn from_x509(ext: &x509_cert::ext::Extension) -> Self {
        Self {
            oid: ext.extn_id,
            critical: ext.critical,
            value: ext.extn_value.as_bytes().to_vec(),
        }
    }
}
