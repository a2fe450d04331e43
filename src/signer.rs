//! The signing engine: turns an unsigned template into an immutable signed value.

use bon::Builder;
use tracing::debug;

use crate::cert::SignatureAlgorithm;
use crate::error::{PkiKitError, Result};
use crate::key::{KeyPair, PublicKey};

/// An unsigned structure the [`Signer`] can sign.
pub trait ToBeSigned {
    /// The value produced once a signature is attached.
    type Signed;

    /// Short name used in logs and errors.
    const KIND: &'static str;

    /// Canonical DER of the to-be-signed part, embedding `algorithm`.
    fn tbs_der(&self, algorithm: SignatureAlgorithm) -> Result<Vec<u8>>;

    /// Checks that `signing_key` is the key this template expects to be signed with.
    fn check_signing_key(&self, signing_key: &PublicKey) -> Result<()>;

    /// Attaches `signature` and freezes the template.
    fn into_signed(self, algorithm: SignatureAlgorithm, signature: Vec<u8>) -> Result<Self::Signed>;
}

/// Options for the [`Signer`].
///
/// ```
/// use pkikit::signer::SignerConfig;
/// let config = SignerConfig::builder().verify_key_correspondence(true).build();
/// assert!(config.verify_key_correspondence);
/// assert!(!SignerConfig::default().verify_key_correspondence);
/// ```
#[derive(Clone, Copy, Debug, Default, Builder)]
pub struct SignerConfig {
    /// Reject signing keys that do not match the key the template names.
    ///
    /// Off by default so a CA can sign templates built from third-party requests.
    #[builder(default)]
    pub verify_key_correspondence: bool,
}

/// Signs certificate and CSR templates.
#[derive(Clone, Debug, Default)]
pub struct Signer {
    config: SignerConfig,
}

impl Signer {
    pub fn new(config: SignerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    /// Signs `template` with `signing_key` under `algorithm`.
    ///
    /// Self-signing is just signing with the key the template carries; the
    /// engine does not treat it differently.
    pub fn sign<T: ToBeSigned>(
        &self,
        template: T,
        signing_key: &KeyPair,
        algorithm: SignatureAlgorithm,
    ) -> Result<T::Signed> {
        if !algorithm.is_compatible_with(signing_key.algorithm()) {
            return Err(PkiKitError::UnsupportedAlgorithm(format!(
                "{algorithm} cannot be produced by an {} key",
                signing_key.algorithm()
            )));
        }
        if self.config.verify_key_correspondence {
            template.check_signing_key(&signing_key.public_key())?;
        }

        let tbs = template.tbs_der(algorithm)?;
        let signature = signing_key.sign_data(algorithm, &tbs)?;
        debug!(
            kind = T::KIND,
            %algorithm,
            tbs_len = tbs.len(),
            "signed template"
        );
        template.into_signed(algorithm, signature)
    }

    /// Signs with the key's natural algorithm; see [`SignatureAlgorithm::default_for`].
    pub fn sign_default<T: ToBeSigned>(&self, template: T, signing_key: &KeyPair) -> Result<T::Signed> {
        self.sign(template, signing_key, SignatureAlgorithm::default_for(signing_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::{AuthorityKeyIdentifier, Extension, ExtensionSet};
    use crate::cert::params::{DistinguishedName, Serial, Validity};
    use crate::csr::{CsrAttributes, CsrTemplate};
    use crate::tbs_certificate::CertificateTemplate;

    fn dn(cn: &str) -> DistinguishedName {
        DistinguishedName::build([("CN", cn)]).unwrap()
    }

    fn template(subject: &str, issuer: &str, key: &KeyPair, extensions: ExtensionSet) -> CertificateTemplate {
        CertificateTemplate::new(
            dn(subject),
            dn(issuer),
            key.public_key(),
            Serial::from_u64(7),
            Validity::for_days(1),
            extensions,
        )
        .unwrap()
    }

    #[test]
    fn test_algorithm_must_match_key() {
        let key = KeyPair::generate_ecdsa_p256();
        let err = Signer::default()
            .sign(
                template("a", "a", &key, ExtensionSet::empty()),
                &key,
                SignatureAlgorithm::Sha256WithRsa,
            )
            .unwrap_err();
        assert!(matches!(err, PkiKitError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn test_key_correspondence_is_off_by_default() {
        let subject_key = KeyPair::generate_ed25519();
        let other_key = KeyPair::generate_ed25519();

        let signed = Signer::default()
            .sign_default(template("a", "a", &subject_key, ExtensionSet::empty()), &other_key)
            .unwrap();
        assert!(signed.verify_self_signed().is_err());

        let strict = Signer::new(SignerConfig::builder().verify_key_correspondence(true).build());
        let err = strict
            .sign_default(template("a", "a", &subject_key, ExtensionSet::empty()), &other_key)
            .unwrap_err();
        assert!(matches!(err, PkiKitError::SigningKeyMismatch(_)));
    }

    #[test]
    fn test_strict_mode_checks_authority_key_id() {
        let issuer_key = KeyPair::generate_ecdsa_p256();
        let leaf_key = KeyPair::generate_ecdsa_p256();
        let extensions = ExtensionSet::build([Extension::AuthorityKeyIdentifier(
            AuthorityKeyIdentifier {
                key_identifier: Some(issuer_key.public_key().key_identifier().unwrap()),
                ..AuthorityKeyIdentifier::default()
            },
        )])
        .unwrap();
        let strict = Signer::new(SignerConfig::builder().verify_key_correspondence(true).build());

        strict
            .sign_default(template("leaf", "ca", &leaf_key, extensions.clone()), &issuer_key)
            .unwrap();
        let err = strict
            .sign_default(template("leaf", "ca", &leaf_key, extensions), &leaf_key)
            .unwrap_err();
        assert!(matches!(err, PkiKitError::SigningKeyMismatch(_)));
    }

    #[test]
    fn test_strict_mode_checks_csr_key() {
        let key = KeyPair::generate_ecdsa_p384();
        let other = KeyPair::generate_ecdsa_p384();
        let csr = CsrTemplate::new(dn("req"), key.public_key(), CsrAttributes::new(), ExtensionSet::empty())
            .unwrap();
        let strict = Signer::new(SignerConfig::builder().verify_key_correspondence(true).build());

        let err = strict.sign_default(csr.clone(), &other).unwrap_err();
        assert!(matches!(err, PkiKitError::SigningKeyMismatch(_)));
        strict.sign_default(csr, &key).unwrap().verify().unwrap();
    }
}
