//! In-memory credential storage
//!
//! Ephemeral backend for selftests and scripted runs where nothing
//! should touch disk or the OS keychain.

use super::{SecretStore, StoreError, StoredCredential};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, StoredCredential>,
    default_host: Option<String>,
}

/// Volatile credential store, dropped with the process
#[derive(Default)]
pub struct MemorySecretStore {
    state: Mutex<MemoryState>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, host: &str) -> Result<Option<StoredCredential>, StoreError> {
        Ok(self.state.lock().entries.get(host).cloned())
    }

    fn put(
        &self,
        host: &str,
        credential: StoredCredential,
        make_default: bool,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.entries.insert(host.to_string(), credential);
        if make_default {
            state.default_host = Some(host.to_string());
        } else if state.default_host.as_deref() == Some(host) {
            state.default_host = None;
        }
        Ok(())
    }

    fn delete(&self, host: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        let existed = state.entries.remove(host).is_some();
        if existed && state.default_host.as_deref() == Some(host) {
            state.default_host = None;
        }
        Ok(existed)
    }

    fn default_entry(&self) -> Result<Option<(String, StoredCredential)>, StoreError> {
        let state = self.state.lock();
        let Some(host) = state.default_host.clone() else {
            return Ok(None);
        };
        Ok(state
            .entries
            .get(&host)
            .cloned()
            .map(|credential| (host, credential)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_repointing() {
        let store = MemorySecretStore::new();
        let cred = |u: &str| StoredCredential {
            username: u.to_string(),
            password: "pw".to_string(),
        };

        store.put("a", cred("one"), true).unwrap();
        store.put("b", cred("two"), true).unwrap();
        assert_eq!(store.default_entry().unwrap().unwrap().0, "b");

        assert!(store.delete("b").unwrap());
        assert!(store.default_entry().unwrap().is_none());
        assert!(!store.delete("b").unwrap());
    }
}
