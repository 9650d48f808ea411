// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Credential tags and the external credential store.
//!
//! Secured Security instances are bound to one entry of a [`CredentialStore`]
//! through a [`CredentialTag`]. The [`CredentialManager`] hands out tags from
//! a per-client counter (never reused while the client lives), pushes key
//! material into the store and removes it again on teardown.
//!
//! # Lifecycle
//!
//! 1. `ensure_tag` assigns a fresh tag, or keeps the one already held
//! 2. `provision` overwrites the store entry for the tag
//! 3. `deprovision` deletes the entry and clears the instance's tag

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::CredentialConfig;

/// Handle of one credential store entry. Zero is reserved for "no tag".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialTag(u16);

impl CredentialTag {
    /// Wrap a raw tag; `0` yields `None`.
    pub const fn new(raw: u16) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for CredentialTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key material for one DTLS peer.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Pre-shared key.
    Psk { identity: Vec<u8>, key: Vec<u8> },
    /// Raw public key pair plus the server's public key.
    Rpk {
        public_key: Vec<u8>,
        private_key: Vec<u8>,
        peer_public_key: Vec<u8>,
    },
}

impl Credential {
    pub const fn kind(&self) -> CredentialKind {
        match self {
            Self::Psk { .. } => CredentialKind::Psk,
            Self::Rpk { .. } => CredentialKind::Ecdsa,
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        match self {
            Self::Psk { identity, key } => {
                if identity.is_empty() {
                    return Err(StoreError::InvalidCredential("empty PSK identity"));
                }
                if key.is_empty() {
                    return Err(StoreError::InvalidCredential("empty PSK key"));
                }
            }
            Self::Rpk {
                public_key,
                private_key,
                peer_public_key,
            } => {
                if public_key.is_empty() || private_key.is_empty() {
                    return Err(StoreError::InvalidCredential("incomplete key pair"));
                }
                if peer_public_key.is_empty() {
                    return Err(StoreError::InvalidCredential("missing server public key"));
                }
            }
        }
        Ok(())
    }
}

// Key material stays out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Psk { identity, key } => f
                .debug_struct("Psk")
                .field("identity_len", &identity.len())
                .field("key_len", &key.len())
                .finish(),
            Self::Rpk {
                public_key,
                private_key,
                peer_public_key,
            } => f
                .debug_struct("Rpk")
                .field("public_key_len", &public_key.len())
                .field("private_key_len", &private_key.len())
                .field("peer_public_key_len", &peer_public_key.len())
                .finish(),
        }
    }
}

/// Credential type, as the store classifies entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Psk,
    Ecdsa,
}

/// Credential store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("credential store is full")]
    Full,
    #[error("tag {0} already present")]
    Exists(CredentialTag),
    #[error("invalid credential: {0}")]
    InvalidCredential(&'static str),
    #[error("credential tags exhausted")]
    TagsExhausted,
    #[error("key material incomplete for the security mode")]
    Incomplete,
}

/// Keyed credential storage (external to this crate).
pub trait CredentialStore: Send + Sync {
    /// Add an entry under `tag`. Fails if the tag is already present.
    fn load(&self, tag: CredentialTag, credential: &Credential) -> Result<(), StoreError>;

    /// Remove the entry for `tag`. Removing an absent tag is a no-op.
    fn delete(&self, tag: CredentialTag);

    fn contains(&self, tag: CredentialTag) -> bool;
}

/// Bounded in-memory credential store.
#[derive(Debug)]
pub struct MemoryCredentialStore {
    capacity: usize,
    entries: Mutex<BTreeMap<CredentialTag, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Copy of the entry stored under `tag`.
    pub fn get(&self, tag: CredentialTag) -> Option<Credential> {
        self.entries.lock().get(&tag).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn tags(&self) -> Vec<CredentialTag> {
        self.entries.lock().keys().copied().collect()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, tag: CredentialTag, credential: &Credential) -> Result<(), StoreError> {
        credential.check()?;
        let mut entries = self.entries.lock();
        if entries.contains_key(&tag) {
            return Err(StoreError::Exists(tag));
        }
        if entries.len() >= self.capacity {
            return Err(StoreError::Full);
        }
        entries.insert(tag, credential.clone());
        Ok(())
    }

    fn delete(&self, tag: CredentialTag) {
        self.entries.lock().remove(&tag);
    }

    fn contains(&self, tag: CredentialTag) -> bool {
        self.entries.lock().contains_key(&tag)
    }
}

struct TagState {
    last_tag: u16,
    registered: BTreeSet<CredentialTag>,
}

/// Allocates credential tags and keeps the store in sync with instances.
///
/// The tag counter sits behind its own leaf lock rather than the connection
/// registry mutex, because tags are assigned under Security pool locks and
/// the pool and registry locks are never held together.
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    reprovision_on_content_change: bool,
    state: Mutex<TagState>,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn CredentialStore>, config: &CredentialConfig) -> Self {
        Self {
            store,
            reprovision_on_content_change: config.reprovision_on_content_change,
            state: Mutex::new(TagState {
                last_tag: config.tag_base,
                registered: BTreeSet::new(),
            }),
        }
    }

    /// Return the tag held in `slot`, assigning a fresh one if it is empty.
    pub fn ensure_tag(&self, slot: &mut Option<CredentialTag>) -> Result<CredentialTag, StoreError> {
        if let Some(tag) = *slot {
            return Ok(tag);
        }

        let mut state = self.state.lock();
        let next = state
            .last_tag
            .checked_add(1)
            .and_then(CredentialTag::new)
            .ok_or(StoreError::TagsExhausted)?;
        state.last_tag = next.get();
        *slot = Some(next);
        log::debug!("[cred] assigned tag {}", next);
        Ok(next)
    }

    /// Replace whatever the store holds under `tag` with `credential`.
    pub fn provision(&self, tag: CredentialTag, credential: &Credential) -> Result<(), StoreError> {
        self.store.delete(tag);
        self.store.load(tag, credential).map_err(|e| {
            log::warn!("[cred] loading tag {} failed: {}", tag, e);
            self.state.lock().registered.remove(&tag);
            e
        })?;
        self.state.lock().registered.insert(tag);
        log::debug!("[cred] provisioned tag {} ({:?})", tag, credential.kind());
        Ok(())
    }

    /// Delete the entry for the tag in `slot` (if any) and clear the slot.
    pub fn deprovision(&self, slot: &mut Option<CredentialTag>) {
        if let Some(tag) = slot.take() {
            self.store.delete(tag);
            self.state.lock().registered.remove(&tag);
            log::debug!("[cred] removed tag {}", tag);
        }
    }

    /// Tags currently provisioned by this client.
    pub fn registered_tags(&self) -> Vec<CredentialTag> {
        self.state.lock().registered.iter().copied().collect()
    }

    pub fn is_registered(&self, tag: CredentialTag) -> bool {
        self.state.lock().registered.contains(&tag)
    }

    pub fn reprovision_on_content_change(&self) -> bool {
        self.reprovision_on_content_change
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CredentialManager")
            .field("last_tag", &state.last_tag)
            .field("registered", &state.registered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn psk(id: &str, key: &str) -> Credential {
        Credential::Psk {
            identity: id.as_bytes().to_vec(),
            key: key.as_bytes().to_vec(),
        }
    }

    fn manager(store: Arc<MemoryCredentialStore>, tag_base: u16) -> CredentialManager {
        CredentialManager::new(
            store,
            &CredentialConfig {
                tag_base,
                reprovision_on_content_change: false,
            },
        )
    }

    #[test]
    fn test_tag_zero_is_empty() {
        assert_eq!(CredentialTag::new(0), None);
        assert_eq!(CredentialTag::new(7).map(CredentialTag::get), Some(7));
    }

    #[test]
    fn test_tags_are_monotonic_and_reused() {
        let store = Arc::new(MemoryCredentialStore::new(4));
        let creds = manager(store, 10);

        let mut first = None;
        let mut second = None;
        assert_eq!(creds.ensure_tag(&mut first).unwrap().get(), 11);
        assert_eq!(creds.ensure_tag(&mut second).unwrap().get(), 12);
        // Existing tags are kept.
        assert_eq!(creds.ensure_tag(&mut first).unwrap().get(), 11);

        // Released tags are never handed out again.
        creds.deprovision(&mut first);
        assert_eq!(first, None);
        assert_eq!(creds.ensure_tag(&mut first).unwrap().get(), 13);
    }

    #[test]
    fn test_tag_exhaustion() {
        let store = Arc::new(MemoryCredentialStore::new(4));
        let creds = manager(store, u16::MAX - 1);
        let mut slot = None;
        assert_eq!(creds.ensure_tag(&mut slot).unwrap().get(), u16::MAX);
        let mut other = None;
        assert_eq!(creds.ensure_tag(&mut other), Err(StoreError::TagsExhausted));
        assert_eq!(other, None);
    }

    #[test]
    fn test_provision_overwrites() {
        let store = Arc::new(MemoryCredentialStore::new(4));
        let creds = manager(store.clone(), 0);
        let mut slot = None;
        let tag = creds.ensure_tag(&mut slot).unwrap();

        creds.provision(tag, &psk("client1", "secret01")).unwrap();
        creds.provision(tag, &psk("client1", "secret02")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(tag), Some(psk("client1", "secret02")));
        assert!(creds.is_registered(tag));

        creds.deprovision(&mut slot);
        assert!(!store.contains(tag));
        assert!(creds.registered_tags().is_empty());
    }

    #[test]
    fn test_store_full_and_invalid() {
        let store = Arc::new(MemoryCredentialStore::new(1));
        let creds = manager(store.clone(), 0);
        let (mut a, mut b) = (None, None);
        let ta = creds.ensure_tag(&mut a).unwrap();
        let tb = creds.ensure_tag(&mut b).unwrap();

        creds.provision(ta, &psk("a", "k")).unwrap();
        assert_eq!(creds.provision(tb, &psk("b", "k")), Err(StoreError::Full));
        assert!(!creds.is_registered(tb));
        assert!(matches!(
            store.load(tb, &psk("", "k")),
            Err(StoreError::InvalidCredential(_))
        ));
        assert_eq!(store.load(ta, &psk("a", "k")), Err(StoreError::Exists(ta)));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let text = format!("{:?}", psk("client1", "supersecret"));
        assert!(!text.contains("supersecret"));
        assert!(text.contains("key_len"));
    }
}
