//! JSON file credential storage
//!
//! Stores all entries in a single JSON document with an in-memory
//! cache. Writes go through a temp file in the same directory followed
//! by a rename, so readers never observe a half-written document.

use super::{SecretStore, StoreError, StoredCredential};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// On-disk document shape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    entries: HashMap<String, StoredCredential>,
    /// Host key of the default entry, if one is set
    #[serde(default)]
    default_host: Option<String>,
}

/// File-backed credential store
pub struct FileSecretStore {
    storage_path: PathBuf,
    cache: Mutex<StoreDocument>,
}

impl FileSecretStore {
    /// Open (or create) the store at `storage_path`
    pub fn new<P: Into<PathBuf>>(storage_path: P) -> Result<Self, StoreError> {
        let path = storage_path.into();
        let document = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            StoreDocument::default()
        };
        debug!(path = %path.display(), entries = document.entries.len(), "credential store opened");
        Ok(Self {
            storage_path: path,
            cache: Mutex::new(document),
        })
    }

    /// Persist the cached document with replace semantics
    fn save_to_disk(&self, document: &StoreDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.storage_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(document)?;
        let mut tmp_path = self.storage_path.clone();
        tmp_path.set_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.storage_path)?;
        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, host: &str) -> Result<Option<StoredCredential>, StoreError> {
        Ok(self.cache.lock().entries.get(host).cloned())
    }

    fn put(
        &self,
        host: &str,
        credential: StoredCredential,
        make_default: bool,
    ) -> Result<(), StoreError> {
        let mut cache = self.cache.lock();
        cache.entries.insert(host.to_string(), credential);
        if make_default {
            cache.default_host = Some(host.to_string());
        } else if cache.default_host.as_deref() == Some(host) {
            // Re-saving the default host without the flag unmarks it
            cache.default_host = None;
        }
        self.save_to_disk(&cache)?;
        debug!(host, make_default, "credential saved");
        Ok(())
    }

    fn delete(&self, host: &str) -> Result<bool, StoreError> {
        let mut cache = self.cache.lock();
        let existed = cache.entries.remove(host).is_some();
        if existed {
            if cache.default_host.as_deref() == Some(host) {
                cache.default_host = None;
            }
            self.save_to_disk(&cache)?;
            debug!(host, "credential deleted");
        }
        Ok(existed)
    }

    fn default_entry(&self) -> Result<Option<(String, StoredCredential)>, StoreError> {
        let cache = self.cache.lock();
        let Some(host) = cache.default_host.clone() else {
            return Ok(None);
        };
        Ok(cache
            .entries
            .get(&host)
            .cloned()
            .map(|credential| (host, credential)))
    }
}
