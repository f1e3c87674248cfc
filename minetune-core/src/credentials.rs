//! Credential resolution for miner devices
//!
//! Resolves the `(host, username, password)` triple a firmware session
//! needs, in precedence order:
//! - explicit host argument -> stored entry for that host
//! - no host, override configured -> the override triple
//! - no host, no override -> the stored default entry
//!
//! The environment override is injected through the constructor; this
//! module never reads process globals itself.

use crate::store::{SecretStore, StoreError, StoredCredential};
use tracing::debug;

/// Resolved login material for one device
#[derive(Debug, Clone)]
pub struct Credential {
    pub host: String,
    pub username: String,
    pub password: String,
    pub is_default: bool,
}

/// Errors from credential resolution
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("no credentials stored for host {host}")]
    NotFound { host: String },
    #[error("no default miner credential configured")]
    NoDefault,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Explicit credential triple taking precedence over stored entries
/// when resolving without a host argument
#[derive(Debug, Clone)]
pub struct CredentialOverride {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl CredentialOverride {
    /// Build from `VNISH_HOST` / `VNISH_USERNAME` / `VNISH_PASSWORD`.
    /// All three must be present; partial settings are ignored.
    ///
    /// Callers decide whether to consult the environment at all; the
    /// resolver itself only sees the returned value.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("VNISH_HOST").ok()?;
        let username = std::env::var("VNISH_USERNAME").ok()?;
        let password = std::env::var("VNISH_PASSWORD").ok()?;
        Some(Self {
            host,
            username,
            password,
        })
    }
}

/// Resolves credentials against a secret store plus optional override
pub struct CredentialResolver {
    store: Box<dyn SecretStore>,
    env_override: Option<CredentialOverride>,
}

impl CredentialResolver {
    pub fn new(store: Box<dyn SecretStore>, env_override: Option<CredentialOverride>) -> Self {
        Self {
            store,
            env_override,
        }
    }

    /// Resolve the credential for `host`, or the override/default
    /// entry when no host is given
    pub fn resolve(&self, host: Option<&str>) -> Result<Credential, CredentialError> {
        if let Some(host) = host {
            let stored = self
                .store
                .get(host)?
                .ok_or_else(|| CredentialError::NotFound {
                    host: host.to_string(),
                })?;
            let is_default = self
                .store
                .default_entry()?
                .map(|(default_host, _)| default_host == host)
                .unwrap_or(false);
            debug!(host, is_default, "resolved stored credential");
            return Ok(Credential {
                host: host.to_string(),
                username: stored.username,
                password: stored.password,
                is_default,
            });
        }

        if let Some(override_) = &self.env_override {
            debug!(host = %override_.host, "resolved credential from override");
            return Ok(Credential {
                host: override_.host.clone(),
                username: override_.username.clone(),
                password: override_.password.clone(),
                is_default: false,
            });
        }

        let (host, stored) = self
            .store
            .default_entry()?
            .ok_or(CredentialError::NoDefault)?;
        debug!(host, "resolved default credential");
        Ok(Credential {
            host,
            username: stored.username,
            password: stored.password,
            is_default: true,
        })
    }

    /// Upsert the credential for `host`
    pub fn save(
        &self,
        host: &str,
        username: &str,
        password: &str,
        is_default: bool,
    ) -> Result<(), CredentialError> {
        self.store.put(
            host,
            StoredCredential {
                username: username.to_string(),
                password: password.to_string(),
            },
            is_default,
        )?;
        Ok(())
    }

    /// Remove the credential for `host`; returns whether one existed
    pub fn delete(&self, host: &str) -> Result<bool, CredentialError> {
        Ok(self.store.delete(host)?)
    }
}
