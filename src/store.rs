//! A CA store of trusted certificates with issuer-chain verification.
//!
//! Writers are serialized behind a mutex and publish a fresh immutable
//! snapshot; readers load the current snapshot without locking and never see
//! a partially applied change.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};

use crate::cert::SignedCertificate;
use crate::cert::params::{DistinguishedName, Serial};
use crate::error::{PkiKitError, Result};

/// Upper bound on the number of certificates in a verified path.
pub const MAX_CHAIN_DEPTH: usize = 32;

/// The identity of a certificate in the store: issuer name and serial number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CertificateId {
    pub issuer: DistinguishedName,
    pub serial: Serial,
}

impl CertificateId {
    pub fn new(issuer: DistinguishedName, serial: Serial) -> Self {
        Self { issuer, serial }
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] serial {}", self.issuer, self.serial)
    }
}

/// An immutable view of the store at one point in time.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    by_id: HashMap<CertificateId, Arc<SignedCertificate>>,
    by_subject: HashMap<DistinguishedName, Vec<CertificateId>>,
    by_key_id: HashMap<Vec<u8>, Vec<CertificateId>>,
}

impl StoreSnapshot {
    pub fn get(&self, id: &CertificateId) -> Option<Arc<SignedCertificate>> {
        self.by_id.get(id).cloned()
    }

    pub fn lookup(&self, issuer: &DistinguishedName, serial: &Serial) -> Option<Arc<SignedCertificate>> {
        self.get(&CertificateId::new(issuer.clone(), serial.clone()))
    }

    /// Whether this exact certificate is stored.
    pub fn contains(&self, cert: &SignedCertificate) -> bool {
        self.by_id
            .get(&cert.id())
            .is_some_and(|stored| stored.as_ref() == cert)
    }

    pub fn find_by_subject(&self, subject: &DistinguishedName) -> Vec<Arc<SignedCertificate>> {
        self.resolve(self.by_subject.get(subject))
    }

    /// Certificates whose subject key identifier is `key_id`.
    pub fn find_by_key_id(&self, key_id: &[u8]) -> Vec<Arc<SignedCertificate>> {
        self.resolve(self.by_key_id.get(key_id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SignedCertificate>> {
        self.by_id.values()
    }

    fn resolve(&self, ids: Option<&Vec<CertificateId>>) -> Vec<Arc<SignedCertificate>> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect()
    }

    fn insert(&mut self, cert: SignedCertificate) -> Result<()> {
        let id = cert.id();
        let key_id = cert.key_identifier()?;
        self.by_subject
            .entry(cert.subject().clone())
            .or_default()
            .push(id.clone());
        self.by_key_id.entry(key_id).or_default().push(id.clone());
        self.by_id.insert(id, Arc::new(cert));
        Ok(())
    }

    fn remove(&mut self, id: &CertificateId) -> Option<Arc<SignedCertificate>> {
        let cert = self.by_id.remove(id)?;
        forget(&mut self.by_subject, cert.subject(), id);
        if let Ok(key_id) = cert.key_identifier() {
            forget(&mut self.by_key_id, &key_id, id);
        }
        Some(cert)
    }

    /// Issuer candidates for `cert`: certificates named by its issuer, with
    /// those matching its authority key id first.
    ///
    /// Only `cert` itself is excluded; an issuer may share its (issuer, serial)
    /// identity with a certificate it signed.
    fn issuer_candidates(&self, cert: &SignedCertificate) -> Vec<Arc<SignedCertificate>> {
        let mut candidates: Vec<_> = self
            .find_by_subject(cert.issuer())
            .into_iter()
            .filter(|candidate| candidate.as_ref() != cert)
            .collect();
        if let Some(aki) = cert.authority_key_id() {
            candidates.sort_by_key(|candidate| {
                candidate
                    .key_identifier()
                    .map_or(true, |key_id| key_id.as_slice() != aki)
            });
        }
        candidates
    }
}

fn forget<K: Eq + Hash>(index: &mut HashMap<K, Vec<CertificateId>>, key: &K, id: &CertificateId) {
    if let Some(ids) = index.get_mut(key) {
        ids.retain(|other| other != id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

/// A concurrent store of trusted CA certificates keyed by issuer and serial.
///
/// ```
/// use pkikit::store::CaStore;
/// let store = CaStore::new();
/// assert!(store.is_empty());
/// ```
pub struct CaStore {
    current: ArcSwap<StoreSnapshot>,
    writer: Mutex<()>,
}

impl Default for CaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CaStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaStore").field("len", &self.len()).finish()
    }
}

impl CaStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(StoreSnapshot::default()),
            writer: Mutex::new(()),
        }
    }

    /// Adds a certificate.
    ///
    /// Adding the same certificate again is a no-op; a different certificate
    /// under the same issuer and serial fails with `ConflictingEntry`.
    pub fn add(&self, cert: SignedCertificate) -> Result<()> {
        let _guard = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let snapshot = self.current.load_full();
        let id = cert.id();

        if let Some(existing) = snapshot.get(&id) {
            if existing.as_ref() == &cert {
                debug!(%id, "certificate already in store");
                return Ok(());
            }
            warn!(%id, "conflicting certificate rejected");
            return Err(PkiKitError::ConflictingEntry(id.to_string()));
        }

        let mut next = StoreSnapshot::clone(&snapshot);
        next.insert(cert)?;
        self.current.store(Arc::new(next));
        info!(%id, "certificate added to store");
        Ok(())
    }

    pub fn lookup(&self, issuer: &DistinguishedName, serial: &Serial) -> Option<Arc<SignedCertificate>> {
        self.current.load().lookup(issuer, serial)
    }

    /// Removes and returns the certificate stored under `issuer` and `serial`.
    pub fn remove(&self, issuer: &DistinguishedName, serial: &Serial) -> Option<Arc<SignedCertificate>> {
        let _guard = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = CertificateId::new(issuer.clone(), serial.clone());
        let snapshot = self.current.load_full();
        snapshot.get(&id)?;

        let mut next = StoreSnapshot::clone(&snapshot);
        let removed = next.remove(&id);
        self.current.store(Arc::new(next));
        info!(%id, "certificate removed from store");
        removed
    }

    pub fn find_by_subject(&self, subject: &DistinguishedName) -> Vec<Arc<SignedCertificate>> {
        self.current.load().find_by_subject(subject)
    }

    pub fn find_by_key_id(&self, key_id: &[u8]) -> Vec<Arc<SignedCertificate>> {
        self.current.load().find_by_key_id(key_id)
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// The current contents; later writes do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.current.load_full()
    }

    /// Verifies `cert` up to a trust anchor in the current snapshot.
    pub fn verify_chain(&self, cert: &SignedCertificate) -> Result<Vec<SignedCertificate>> {
        Self::verify_chain_in(&self.snapshot(), cert)
    }

    /// Walks issuer links from `cert` to a self-signed certificate held in `snapshot`.
    ///
    /// Returns the verified path, leaf first and anchor last. Fails with
    /// `ChainIncomplete` when an issuer is missing, the path loops or grows
    /// past [`MAX_CHAIN_DEPTH`], and with `SignatureInvalid` when issuers exist
    /// but none verifies the signature.
    pub fn verify_chain_in(
        snapshot: &StoreSnapshot,
        cert: &SignedCertificate,
    ) -> Result<Vec<SignedCertificate>> {
        let mut path = vec![cert.clone()];

        loop {
            let current = path.last().cloned().ok_or_else(|| {
                PkiKitError::ChainIncomplete("empty certificate path".to_string())
            })?;

            if current.is_self_issued() {
                if snapshot.contains(&current) {
                    current.verify_self_signed()?;
                    debug!(depth = path.len(), anchor = %current.subject(), "chain verified");
                    return Ok(path);
                }
                if current.verify_self_signed().is_ok() {
                    return Err(PkiKitError::ChainIncomplete(format!(
                        "self-signed certificate {} is not a trust anchor",
                        current.id()
                    )));
                }
            }

            if path.len() >= MAX_CHAIN_DEPTH {
                return Err(PkiKitError::ChainIncomplete(format!(
                    "no trust anchor within {MAX_CHAIN_DEPTH} certificates"
                )));
            }

            let candidates = snapshot.issuer_candidates(&current);
            if candidates.is_empty() {
                return Err(PkiKitError::ChainIncomplete(format!(
                    "no issuer certificate for {} (issuer {})",
                    current.subject(),
                    current.issuer()
                )));
            }

            let issuer = candidates
                .into_iter()
                .find(|candidate| current.verify_signature(candidate.public_key()).is_ok())
                .ok_or_else(|| {
                    PkiKitError::SignatureInvalid(format!(
                        "no certificate for {} verifies the signature on {}",
                        current.issuer(),
                        current.id()
                    ))
                })?;

            if path.iter().any(|visited| visited == issuer.as_ref()) {
                return Err(PkiKitError::ChainIncomplete(format!(
                    "issuer loop at {}",
                    issuer.id()
                )));
            }
            path.push(SignedCertificate::clone(&issuer));
        }
    }
}
