//! Secret store boundary for miner credentials
//!
//! Defines the key-value contract every credential backend implements:
//! - key = device host string
//! - value = username + password
//! - one optional default entry, kept as a pointer rather than a flag
//!   on every record so "at most one default" holds by construction
//!
//! Backends: JSON file ([`FileSecretStore`]), OS keychain
//! ([`KeyringSecretStore`]), in-memory ([`MemorySecretStore`]).

use serde::{Deserialize, Serialize};

pub mod file;
pub mod keychain;
pub mod memory;

pub use file::FileSecretStore;
pub use keychain::KeyringSecretStore;
pub use memory::MemorySecretStore;

/// Errors raised by credential storage backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("secret store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("secret store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Stored value for one device host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub username: String,
    pub password: String,
}

/// Key-value contract for credential persistence
///
/// Implementations must not expose partially written entries: a `put`
/// either lands completely or not at all.
pub trait SecretStore: Send + Sync {
    /// Look up the credential stored for `host`
    fn get(&self, host: &str) -> Result<Option<StoredCredential>, StoreError>;

    /// Upsert the credential for `host`; `make_default` repoints the
    /// single default entry to this host
    fn put(
        &self,
        host: &str,
        credential: StoredCredential,
        make_default: bool,
    ) -> Result<(), StoreError>;

    /// Remove the credential for `host`; returns whether an entry existed
    fn delete(&self, host: &str) -> Result<bool, StoreError>;

    /// The host + credential currently marked default, if any
    fn default_entry(&self) -> Result<Option<(String, StoredCredential)>, StoreError>;
}
