//! In-memory plaintext secret map
//!
//! The only place plaintext provider secrets exist. Populated on key
//! creation and on explicit admin re-entry; empty after every restart,
//! which is why untouched providers fail with no-key-available until
//! secrets are re-entered. Entries are zeroized when dropped and the map
//! is never serialised or logged.

use parking_lot::RwLock;
use std::collections::HashMap;
use zeroize::Zeroizing;

#[derive(Default)]
pub struct SecretMap {
    secrets: RwLock<HashMap<String, Zeroizing<String>>>,
}

impl SecretMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the plaintext for a key hash. Overwrites an existing entry;
    /// the old value is zeroized on drop.
    pub fn install(&self, key_hash: &str, secret: String) {
        self.secrets
            .write()
            .insert(key_hash.to_string(), Zeroizing::new(secret));
    }

    /// Clone out the plaintext for upstream use.
    pub fn get(&self, key_hash: &str) -> Option<String> {
        self.secrets
            .read()
            .get(key_hash)
            .map(|s| s.as_str().to_string())
    }

    pub fn contains(&self, key_hash: &str) -> bool {
        self.secrets.read().contains_key(key_hash)
    }

    /// Drop (and zeroize) the plaintext for a deleted key.
    pub fn forget(&self, key_hash: &str) {
        self.secrets.write().remove(key_hash);
    }

    pub fn len(&self) -> usize {
        self.secrets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.read().is_empty()
    }
}

// Deliberately no Debug derive: a formatter must never see the map.
impl std::fmt::Debug for SecretMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretMap")
            .field("entries", &self.len())
            .finish()
    }
}
