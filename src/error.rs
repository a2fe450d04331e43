//! use pkikit::error::PkiKitError;

use thiserror::Error;

/// Represents errors that can occur in the PkiKit library.
///
/// Every failure path maps to its own variant so callers can tell a malformed
/// template apart from a broken chain or a collaborator failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PkiKitError {
    /// A distinguished-name attribute type is neither a known name nor a valid OID,
    /// or its value cannot be encoded for that type.
    #[error("Invalid attribute type: {0}")]
    InvalidAttributeType(String),

    /// An extension failed validation.
    #[error("Invalid {kind} extension: {reason}")]
    InvalidExtension { kind: String, reason: String },

    /// The serial number is empty or too long.
    #[error("Invalid serial number: {0}")]
    InvalidSerial(String),

    /// `not_after` precedes `not_before`.
    #[error("Invalid validity window: {0}")]
    InvalidValidity(String),

    /// The same CSR attribute was given conflicting values in one call.
    #[error("Duplicate attribute: {0}")]
    DuplicateAttribute(String),

    /// The signing key does not correspond to the key the template names.
    #[error("Signing key mismatch: {0}")]
    SigningKeyMismatch(String),

    /// The signature algorithm is unknown or cannot be produced by the key.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A CA store entry with the same issuer and serial already holds a different certificate.
    #[error("Conflicting CA store entry: {0}")]
    ConflictingEntry(String),

    /// An issuer certificate could not be found while walking a chain.
    #[error("Certificate chain incomplete: {0}")]
    ChainIncomplete(String),

    /// A signature did not verify.
    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    /// Key generation did not finish before its deadline.
    #[error("Key generation timed out after {0:?}")]
    KeyGenerationTimeout(std::time::Duration),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// Error from RSA operations.
    #[error("RSA error: {0}")]
    RsaError(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PkiKitError>;

impl PkiKitError {
    pub(crate) fn invalid_extension(kind: &str, reason: impl Into<String>) -> Self {
        PkiKitError::InvalidExtension {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<der::Error> for PkiKitError {
    /// Converts a `der::Error` into a `PkiKitError`.
    fn from(err: der::Error) -> Self {
        PkiKitError::DecodingError(err.to_string())
    }
}

impl From<rsa::Error> for PkiKitError {
    fn from(err: rsa::Error) -> Self {
        PkiKitError::RsaError(err.to_string())
    }
}

impl From<pkcs8::Error> for PkiKitError {
    fn from(err: pkcs8::Error) -> Self {
        PkiKitError::DecodingError(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for PkiKitError {
    fn from(err: pkcs8::spki::Error) -> Self {
        PkiKitError::DecodingError(err.to_string())
    }
}

impl From<pem::PemError> for PkiKitError {
    fn from(err: pem::PemError) -> Self {
        PkiKitError::DecodingError(err.to_string())
    }
}
