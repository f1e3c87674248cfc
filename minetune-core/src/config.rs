//! Configuration management
//!
//! Handles:
//! - Firmware endpoint paths, timeouts and retry policy
//! - Per-model device capability bounds
//! - Credential store backend selection
//! - TOML round-trip against the OS config directory

use crate::translate::DeviceCapabilities;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("could not determine OS config directory")]
    NoConfigDir,
}

/// Endpoint paths on the device, relative to `http://<host>`
///
/// Firmware builds differ here; the defaults match the management API
/// generation this tool targets and are overridable per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareEndpoints {
    pub auth: String,
    pub summary: String,
    pub chips: String,
    pub telemetry: String,
    pub hashrate_limit: String,
    pub power_limit: String,
    pub overclock: String,
}

impl Default for FirmwareEndpoints {
    fn default() -> Self {
        Self {
            auth: "/auth".to_string(),
            summary: "/summary".to_string(),
            chips: "/chips".to_string(),
            telemetry: "/telemetry".to_string(),
            hashrate_limit: "/hashrate-limit".to_string(),
            power_limit: "/power-limit".to_string(),
            overclock: "/overclock".to_string(),
        }
    }
}

/// Per-request timeouts; writes get longer because overclock commits
/// can trigger firmware-side validation passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub read_secs: u64,
    pub write_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read_secs: 10,
            write_secs: 20,
        }
    }
}

impl Timeouts {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }
}

/// Bounded exponential backoff for idempotent reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub read_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            read_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `failed_attempt` (1-based)
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Everything the firmware client needs besides credentials
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareSettings {
    pub endpoints: FirmwareEndpoints,
    pub timeouts: Timeouts,
    pub retry: RetryPolicy,
}

/// Which credential backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    File,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Path of the JSON document for the file backend; defaults next
    /// to the config file
    pub path: Option<PathBuf>,
    /// Keychain service name for the keyring backend
    pub keyring_service: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: None,
            keyring_service: "minetune".to_string(),
        }
    }
}

impl StoreSettings {
    /// The file path the file backend should use
    pub fn file_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let mut path = CoreConfig::config_dir()?;
        path.push("credentials.json");
        Ok(path)
    }
}

/// Root configuration document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub firmware: FirmwareSettings,
    pub capabilities: DeviceCapabilities,
    pub store: StoreSettings,
}

impl CoreConfig {
    /// Load config from the OS-specific location, falling back to
    /// defaults when no file exists yet
    pub async fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_file_path()?).await
    }

    pub async fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to the OS-specific location
    pub async fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_file_path()?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push("minetune");
        Ok(path)
    }

    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let mut path = Self::config_dir()?;
        path.push("config.toml");
        Ok(path)
    }
}
