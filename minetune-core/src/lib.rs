/*!
# minetune-core - Recommendation application core for miner fleets

Mediates between an automated tuning engine and ASIC miner firmware:
- Credential resolution against pluggable secret stores (file, OS
  keychain, in-memory)
- Authenticated HTTP client to one device with retry and session
  refresh
- Pure validation/translation of recommendations into firmware
  commands
- Apply orchestration with dry-run, commit and telemetry verification
*/

pub mod config;
pub mod credentials;
pub mod firmware;
pub mod orchestrator;
pub mod recommendation;
pub mod store;
pub mod translate;

pub use config::{CoreConfig, FirmwareSettings, RetryPolicy, StoreBackend, Timeouts};
pub use credentials::{Credential, CredentialError, CredentialOverride, CredentialResolver};
pub use firmware::{
    FirmwareClient, FirmwareCommand, FirmwareConnector, FirmwareControl, FirmwareError,
    HttpConnector, Summary, Telemetry,
};
pub use orchestrator::{ApplicationResult, ApplyError, TuningOrchestrator};
pub use recommendation::Recommendation;
pub use store::{FileSecretStore, KeyringSecretStore, MemorySecretStore, SecretStore};
pub use translate::{validate_and_translate, DeviceCapabilities, OffsetBounds, TranslateError};
