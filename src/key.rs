use std::fmt;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use bon::Builder;
use der::{Decode, Encode};
use ed25519_dalek::{SigningKey as Ed25519SigningKey, VerifyingKey as Ed25519VerifyingKey};
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{SigningKey as P384SigningKey, VerifyingKey as P384VerifyingKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use tracing::{debug, warn};
use x509_cert::spki::{ObjectIdentifier, SubjectPublicKeyInfoOwned};

use crate::cert::SignatureAlgorithm;
use crate::error::{PkiKitError, Result};
use crate::pem_utils::PemEncodable;

const RSA_ENCRYPTION: ObjectIdentifier = const_oid::db::rfc5912::RSA_ENCRYPTION;
const ID_EC_PUBLIC_KEY: ObjectIdentifier = const_oid::db::rfc5912::ID_EC_PUBLIC_KEY;
const SECP_256_R_1: ObjectIdentifier = const_oid::db::rfc5912::SECP_256_R_1;
const SECP_384_R_1: ObjectIdentifier = const_oid::db::rfc5912::SECP_384_R_1;
const ID_ED_25519: ObjectIdentifier = const_oid::db::rfc8410::ID_ED_25519;

/// Declared algorithm and size of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa { bits: usize },
    EcdsaP256,
    EcdsaP384,
    Ed25519,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa { bits } => write!(f, "RSA-{bits}"),
            KeyAlgorithm::EcdsaP256 => f.write_str("ECDSA P-256"),
            KeyAlgorithm::EcdsaP384 => f.write_str("ECDSA P-384"),
            KeyAlgorithm::Ed25519 => f.write_str("Ed25519"),
        }
    }
}

/// Parameters for RSA key generation.
///
/// ```
/// use pkikit::key::RsaKeyParams;
/// let params = RsaKeyParams::builder().bits(3072).build();
/// assert_eq!(params.public_exponent, 65537);
/// assert!(params.timeout.is_none());
/// ```
#[derive(Clone, Debug, Builder)]
pub struct RsaKeyParams {
    #[builder(default = 2048)]
    pub bits: usize,
    #[builder(default = 65537)]
    pub public_exponent: u64,
    /// Give up on the modulus search after this long.
    pub timeout: Option<Duration>,
}

/// Supported key types for certificate operations.
///
/// The private half stays with the caller; certificates and requests only
/// ever carry a [`PublicKey`].
#[derive(Clone)]
pub enum KeyPair {
    Rsa {
        private: Box<RsaPrivateKey>,
        public: RsaPublicKey,
    },
    EcdsaP256 {
        signing_key: P256SigningKey,
        verifying_key: P256VerifyingKey,
    },
    EcdsaP384 {
        signing_key: P384SigningKey,
        verifying_key: P384VerifyingKey,
    },
    Ed25519 {
        signing_key: Ed25519SigningKey,
    },
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate an RSA key pair with the specified number of bits and exponent 65537.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        Self::generate_rsa_with(&RsaKeyParams::builder().bits(bits).build())
    }

    /// Generate an RSA key pair from explicit parameters.
    ///
    /// With a timeout set the modulus search runs on a worker thread and
    /// `KeyGenerationTimeout` is returned once the deadline passes. The search
    /// itself cannot be interrupted: the detached worker keeps running until it
    /// finds a modulus, and its key is then dropped.
    pub fn generate_rsa_with(params: &RsaKeyParams) -> Result<Self> {
        let bits = params.bits;
        let exponent = params.public_exponent;
        let Some(timeout) = params.timeout else {
            return Self::rsa_from_exponent(bits, exponent);
        };

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("pkikit-rsa-keygen".to_string())
            .spawn(move || {
                // The receiver is gone if the caller already timed out.
                let _ = tx.send(Self::rsa_from_exponent(bits, exponent));
            })
            .map_err(|e| PkiKitError::KeyGenerationError(e.to_string()))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(bits, ?timeout, "RSA key generation timed out");
                Err(PkiKitError::KeyGenerationTimeout(timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(PkiKitError::KeyGenerationError(
                "key generation worker exited without a result".to_string(),
            )),
        }
    }

    fn rsa_from_exponent(bits: usize, exponent: u64) -> Result<Self> {
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new_with_exp(&mut rng, bits, &BigUint::from(exponent))?;
        let public = RsaPublicKey::from(&private);
        debug!(bits, "generated RSA key pair");
        Ok(KeyPair::Rsa {
            private: Box::new(private),
            public,
        })
    }

    /// Generate an ECDSA P-256 key pair.
    pub fn generate_ecdsa_p256() -> Self {
        let mut rng = rand_core::OsRng;
        let signing_key = P256SigningKey::random(&mut rng);
        let verifying_key = signing_key.verifying_key().to_owned();
        KeyPair::EcdsaP256 {
            signing_key,
            verifying_key,
        }
    }

    /// Generate an ECDSA P-384 key pair.
    pub fn generate_ecdsa_p384() -> Self {
        let mut rng = rand_core::OsRng;
        let signing_key = P384SigningKey::random(&mut rng);
        let verifying_key = signing_key.verifying_key().to_owned();
        KeyPair::EcdsaP384 {
            signing_key,
            verifying_key,
        }
    }

    /// Generate an Ed25519 key pair.
    pub fn generate_ed25519() -> Self {
        let mut rng = rand_core::OsRng;
        let signing_key: Ed25519SigningKey = Ed25519SigningKey::generate(&mut rng);
        KeyPair::Ed25519 { signing_key }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            KeyPair::Rsa { public, .. } => KeyAlgorithm::Rsa {
                bits: public.size() * 8,
            },
            KeyPair::EcdsaP256 { .. } => KeyAlgorithm::EcdsaP256,
            KeyPair::EcdsaP384 { .. } => KeyAlgorithm::EcdsaP384,
            KeyPair::Ed25519 { .. } => KeyAlgorithm::Ed25519,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_key_pair(self)
    }

    /// Signs `data` with this key under `algorithm`.
    ///
    /// ECDSA signatures are returned DER-encoded, as X.509 carries them.
    pub fn sign_data(&self, algorithm: SignatureAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        match (self, algorithm) {
            (KeyPair::Rsa { private, .. }, SignatureAlgorithm::Sha256WithRsa) => {
                let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(private.as_ref().clone());
                Ok(signing_key.sign(data).to_vec())
            }
            (KeyPair::Rsa { private, .. }, SignatureAlgorithm::Sha384WithRsa) => {
                let signing_key = rsa::pkcs1v15::SigningKey::<Sha384>::new(private.as_ref().clone());
                Ok(signing_key.sign(data).to_vec())
            }
            (KeyPair::Rsa { private, .. }, SignatureAlgorithm::Sha512WithRsa) => {
                let signing_key = rsa::pkcs1v15::SigningKey::<Sha512>::new(private.as_ref().clone());
                Ok(signing_key.sign(data).to_vec())
            }
            (KeyPair::EcdsaP256 { signing_key, .. }, SignatureAlgorithm::EcdsaWithSha256) => {
                let signature: p256::ecdsa::Signature = signing_key.sign(data);
                Ok(signature.to_der().as_bytes().to_vec())
            }
            (KeyPair::EcdsaP384 { signing_key, .. }, SignatureAlgorithm::EcdsaWithSha384) => {
                let signature: p384::ecdsa::Signature = signing_key.sign(data);
                Ok(signature.to_der().as_bytes().to_vec())
            }
            (KeyPair::Ed25519 { signing_key }, SignatureAlgorithm::Ed25519) => {
                let signature = signing_key.sign(data);
                Ok(signature.to_bytes().to_vec())
            }
            (key, algorithm) => Err(PkiKitError::UnsupportedAlgorithm(format!(
                "{algorithm} cannot be produced by an {} key",
                key.algorithm()
            ))),
        }
    }

    /// Encodes the private key as PKCS#8 DER.
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>> {
        let document = match self {
            KeyPair::Rsa { private, .. } => private.to_pkcs8_der(),
            KeyPair::EcdsaP256 { signing_key, .. } => signing_key.to_pkcs8_der(),
            KeyPair::EcdsaP384 { signing_key, .. } => signing_key.to_pkcs8_der(),
            KeyPair::Ed25519 { signing_key } => signing_key.to_pkcs8_der(),
        }
        .map_err(|e| PkiKitError::EncodingError(e.to_string()))?;
        Ok(document.as_bytes().to_vec())
    }

    /// Decodes a PKCS#8 private key, choosing the key type from its algorithm identifier.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = pkcs8::PrivateKeyInfo::try_from(der)?;
        match info.algorithm.oid {
            RSA_ENCRYPTION => {
                let private = RsaPrivateKey::from_pkcs8_der(der)?;
                let public = RsaPublicKey::from(&private);
                Ok(KeyPair::Rsa {
                    private: Box::new(private),
                    public,
                })
            }
            ID_EC_PUBLIC_KEY => {
                if let Ok(signing_key) = P256SigningKey::from_pkcs8_der(der) {
                    let verifying_key = signing_key.verifying_key().to_owned();
                    return Ok(KeyPair::EcdsaP256 {
                        signing_key,
                        verifying_key,
                    });
                }
                let signing_key = P384SigningKey::from_pkcs8_der(der)?;
                let verifying_key = signing_key.verifying_key().to_owned();
                Ok(KeyPair::EcdsaP384 {
                    signing_key,
                    verifying_key,
                })
            }
            ID_ED_25519 => Ok(KeyPair::Ed25519 {
                signing_key: Ed25519SigningKey::from_pkcs8_der(der)?,
            }),
            other => Err(PkiKitError::UnsupportedAlgorithm(format!(
                "private key algorithm {other}"
            ))),
        }
    }

    /// Imports a key pair from a PKCS#8 `PRIVATE KEY` PEM document.
    pub fn import_from_pkcs8_pem(pem: &str) -> Result<Self> {
        <Self as PemEncodable>::from_pem(pem)
    }
}

impl PemEncodable for KeyPair {
    const PEM_LABEL: &'static str = "PRIVATE KEY";

    fn to_der(&self) -> Result<Vec<u8>> {
        self.to_pkcs8_der()
    }

    fn from_der(der: &[u8]) -> Result<Self> {
        Self::from_pkcs8_der(der)
    }
}

/// The public half of a [`KeyPair`], as embedded in certificates and requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
    EcdsaP384(P384VerifyingKey),
    Ed25519(Ed25519VerifyingKey),
}

impl PublicKey {
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        match key_pair {
            KeyPair::Rsa { public, .. } => PublicKey::Rsa(public.clone()),
            KeyPair::EcdsaP256 { verifying_key, .. } => PublicKey::EcdsaP256(*verifying_key),
            KeyPair::EcdsaP384 { verifying_key, .. } => PublicKey::EcdsaP384(*verifying_key),
            KeyPair::Ed25519 { signing_key } => PublicKey::Ed25519(signing_key.verifying_key()),
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            PublicKey::Rsa(public) => KeyAlgorithm::Rsa {
                bits: public.size() * 8,
            },
            PublicKey::EcdsaP256(_) => KeyAlgorithm::EcdsaP256,
            PublicKey::EcdsaP384(_) => KeyAlgorithm::EcdsaP384,
            PublicKey::Ed25519(_) => KeyAlgorithm::Ed25519,
        }
    }

    /// Encodes the key as a `SubjectPublicKeyInfo`.
    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let document = match self {
            PublicKey::Rsa(public) => public.to_public_key_der(),
            PublicKey::EcdsaP256(verifying_key) => verifying_key.to_public_key_der(),
            PublicKey::EcdsaP384(verifying_key) => verifying_key.to_public_key_der(),
            PublicKey::Ed25519(verifying_key) => verifying_key.to_public_key_der(),
        }
        .map_err(|e| PkiKitError::EncodingError(e.to_string()))?;
        Ok(SubjectPublicKeyInfoOwned::from_der(document.as_bytes())?)
    }

    /// Decodes a `SubjectPublicKeyInfo` into one of the supported key types.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = spki.to_der()?;
        match spki.algorithm.oid {
            RSA_ENCRYPTION => Ok(PublicKey::Rsa(RsaPublicKey::from_public_key_der(&der)?)),
            ID_EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .map(|params| params.decode_as::<ObjectIdentifier>())
                    .transpose()?;
                match curve {
                    Some(SECP_256_R_1) => Ok(PublicKey::EcdsaP256(
                        P256VerifyingKey::from_public_key_der(&der)?,
                    )),
                    Some(SECP_384_R_1) => Ok(PublicKey::EcdsaP384(
                        P384VerifyingKey::from_public_key_der(&der)?,
                    )),
                    other => Err(PkiKitError::UnsupportedAlgorithm(format!(
                        "elliptic curve {other:?}"
                    ))),
                }
            }
            ID_ED_25519 => Ok(PublicKey::Ed25519(Ed25519VerifyingKey::from_public_key_der(
                &der,
            )?)),
            other => Err(PkiKitError::UnsupportedAlgorithm(format!(
                "public key algorithm {other}"
            ))),
        }
    }

    /// SHA-1 over the subject public key bit string (RFC 5280 §4.2.1.2, method 1).
    pub fn key_identifier(&self) -> Result<Vec<u8>> {
        let spki = self.to_spki()?;
        let key_id = <Sha1 as sha1::Digest>::digest(spki.subject_public_key.raw_bytes());
        Ok(key_id.to_vec())
    }

    /// Checks `signature` over `data` under `algorithm`.
    pub fn verify(&self, algorithm: SignatureAlgorithm, data: &[u8], signature: &[u8]) -> Result<()> {
        let outcome = match (self, algorithm) {
            (PublicKey::Rsa(public), SignatureAlgorithm::Sha256WithRsa) => {
                rsa::pkcs1v15::Signature::try_from(signature).and_then(|sig| {
                    rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public.clone()).verify(data, &sig)
                })
            }
            (PublicKey::Rsa(public), SignatureAlgorithm::Sha384WithRsa) => {
                rsa::pkcs1v15::Signature::try_from(signature).and_then(|sig| {
                    rsa::pkcs1v15::VerifyingKey::<Sha384>::new(public.clone()).verify(data, &sig)
                })
            }
            (PublicKey::Rsa(public), SignatureAlgorithm::Sha512WithRsa) => {
                rsa::pkcs1v15::Signature::try_from(signature).and_then(|sig| {
                    rsa::pkcs1v15::VerifyingKey::<Sha512>::new(public.clone()).verify(data, &sig)
                })
            }
            (PublicKey::EcdsaP256(verifying_key), SignatureAlgorithm::EcdsaWithSha256) => {
                p256::ecdsa::Signature::from_der(signature)
                    .and_then(|sig| verifying_key.verify(data, &sig))
            }
            (PublicKey::EcdsaP384(verifying_key), SignatureAlgorithm::EcdsaWithSha384) => {
                p384::ecdsa::Signature::from_der(signature)
                    .and_then(|sig| verifying_key.verify(data, &sig))
            }
            (PublicKey::Ed25519(verifying_key), SignatureAlgorithm::Ed25519) => {
                ed25519_dalek::Signature::from_slice(signature)
                    .and_then(|sig| verifying_key.verify(data, &sig))
            }
            (key, algorithm) => {
                return Err(PkiKitError::UnsupportedAlgorithm(format!(
                    "{algorithm} cannot be verified with an {} key",
                    key.algorithm()
                )));
            }
        };
        outcome.map_err(|e| PkiKitError::SignatureInvalid(e.to_string()))
    }
}

impl PemEncodable for PublicKey {
    const PEM_LABEL: &'static str = "PUBLIC KEY";

    fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.to_spki()?.to_der()?)
    }

    fn from_der(der: &[u8]) -> Result<Self> {
        Self::from_x509spki(&SubjectPublicKeyInfoOwned::from_der(der)?)
    }
}
