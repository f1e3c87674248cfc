//! OS keychain credential storage
//!
//! One keyring entry per device host under a shared service name, plus
//! a pointer entry recording which host is the default. The pointer
//! keeps the "at most one default" invariant without enumerating
//! entries, which the OS keychain cannot do.

use super::{SecretStore, StoreError, StoredCredential};
use keyring::Entry;
use tracing::debug;

/// Entry name holding the default-host pointer
const DEFAULT_POINTER: &str = "__default_host__";

/// Keychain-backed credential store
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    pub fn new<S: Into<String>>(service: S) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Entry::new(&self.service, key).map_err(Into::into)
    }

    /// Read an entry's secret, mapping "no entry" to None
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl SecretStore for KeyringSecretStore {
    fn get(&self, host: &str) -> Result<Option<StoredCredential>, StoreError> {
        match self.read(host)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn put(
        &self,
        host: &str,
        credential: StoredCredential,
        make_default: bool,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&credential)?;
        self.entry(host)?.set_password(&raw)?;
        if make_default {
            self.entry(DEFAULT_POINTER)?.set_password(host)?;
        } else if self.read(DEFAULT_POINTER)?.as_deref() == Some(host) {
            // Re-saving the default host without the flag unmarks it
            match self.entry(DEFAULT_POINTER)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(host, make_default, "credential saved to keychain");
        Ok(())
    }

    fn delete(&self, host: &str) -> Result<bool, StoreError> {
        let existed = match self.entry(host)?.delete_credential() {
            Ok(()) => true,
            Err(keyring::Error::NoEntry) => false,
            Err(e) => return Err(e.into()),
        };
        if existed && self.read(DEFAULT_POINTER)?.as_deref() == Some(host) {
            match self.entry(DEFAULT_POINTER)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(existed)
    }

    fn default_entry(&self) -> Result<Option<(String, StoredCredential)>, StoreError> {
        let Some(host) = self.read(DEFAULT_POINTER)? else {
            return Ok(None);
        };
        Ok(self.get(&host)?.map(|credential| (host, credential)))
    }
}
