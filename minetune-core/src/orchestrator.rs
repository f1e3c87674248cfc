//! Application orchestrator
//!
//! Drives one recommendation through resolve -> validate -> dry-run or
//! commit -> verify, and folds every outcome into a structured
//! [`ApplicationResult`] instead of bubbling errors to the caller.
//! Kind-specific behavior lives entirely in the translator; the flow
//! here is identical for every recommendation kind.

use crate::credentials::{CredentialError, CredentialResolver};
use crate::firmware::types::{FirmwareCommand, Telemetry};
use crate::firmware::{FirmwareConnector, FirmwareControl, FirmwareError};
use crate::recommendation::Recommendation;
use crate::translate::{validate_and_translate, DeviceCapabilities, TranslateError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Structured, serializable failure attached to an apply result
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplyError {
    #[error("no credentials stored for host {host}")]
    CredentialNotFound { host: String },
    #[error("no default miner credential configured")]
    NoDefaultCredential,
    #[error("credential store failure: {message}")]
    CredentialStore { message: String },
    #[error("{field} = {value} violates safe bound {bound}")]
    Validation {
        field: String,
        value: f64,
        bound: f64,
    },
    #[error("unsupported recommendation type: {given}")]
    UnsupportedRecommendationType { given: String },
    #[error("invalid recommendation payload: {detail}")]
    InvalidRecommendation { detail: String },
    #[error("authentication rejected by {host}")]
    Authentication { host: String },
    #[error("device {host} unreachable: {reason}")]
    DeviceUnreachable { host: String, reason: String },
    #[error("malformed response from {host}: {detail}")]
    MalformedResponse { host: String, detail: String },
    #[error("write to {host} not acknowledged; device state unknown")]
    AmbiguousWrite { host: String },
}

impl From<CredentialError> for ApplyError {
    fn from(error: CredentialError) -> Self {
        match error {
            CredentialError::NotFound { host } => Self::CredentialNotFound { host },
            CredentialError::NoDefault => Self::NoDefaultCredential,
            CredentialError::Store(e) => Self::CredentialStore {
                message: e.to_string(),
            },
        }
    }
}

impl From<TranslateError> for ApplyError {
    fn from(error: TranslateError) -> Self {
        match error {
            TranslateError::OutOfRange {
                field,
                value,
                bound,
            } => Self::Validation {
                field,
                value,
                bound,
            },
            TranslateError::UnsupportedType { given } => {
                Self::UnsupportedRecommendationType { given }
            }
            TranslateError::Invalid { detail } => Self::InvalidRecommendation { detail },
        }
    }
}

impl From<FirmwareError> for ApplyError {
    fn from(error: FirmwareError) -> Self {
        match error {
            FirmwareError::Authentication { host } => Self::Authentication { host },
            FirmwareError::Unreachable { host, reason } => {
                Self::DeviceUnreachable { host, reason }
            }
            FirmwareError::Malformed { host, detail } => {
                Self::MalformedResponse { host, detail }
            }
            FirmwareError::AmbiguousWrite { host } => Self::AmbiguousWrite { host },
        }
    }
}

/// Outcome record for one apply call, produced exactly once and never
/// persisted here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationResult {
    pub recommendation_id: String,
    pub miner_ip: String,
    pub dry_run: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_command: Option<FirmwareCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_telemetry: Option<Telemetry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_telemetry: Option<Telemetry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApplyError>,
    pub completed_at: DateTime<Utc>,
}

impl ApplicationResult {
    fn failed(
        recommendation: &Recommendation,
        miner_ip: &str,
        dry_run: bool,
        pre_telemetry: Option<Telemetry>,
        error: ApplyError,
    ) -> Self {
        Self {
            recommendation_id: recommendation.id().to_string(),
            miner_ip: miner_ip.to_string(),
            dry_run,
            success: false,
            applied_command: None,
            pre_telemetry,
            post_telemetry: None,
            error: Some(error),
            completed_at: Utc::now(),
        }
    }
}

/// Applies tuning recommendations to miners
pub struct TuningOrchestrator<C: FirmwareConnector> {
    resolver: CredentialResolver,
    capabilities: DeviceCapabilities,
    connector: C,
}

impl<C: FirmwareConnector> TuningOrchestrator<C> {
    pub fn new(resolver: CredentialResolver, capabilities: DeviceCapabilities, connector: C) -> Self {
        Self {
            resolver,
            capabilities,
            connector,
        }
    }

    /// Apply one recommendation to one miner.
    ///
    /// A dry run validates, translates and samples telemetry but never
    /// issues a control write. Transport-level retries belong to the
    /// firmware client; nothing is re-driven here.
    pub async fn apply(
        &self,
        recommendation: &Recommendation,
        miner_ip: &str,
        dry_run: bool,
    ) -> ApplicationResult {
        debug!(
            recommendation_id = recommendation.id(),
            kind = recommendation.kind(),
            miner_ip,
            dry_run,
            "validating recommendation"
        );

        let credential = match self.resolver.resolve(Some(miner_ip)) {
            Ok(credential) => credential,
            Err(e) => {
                warn!(miner_ip, error = %e, "credential resolution failed");
                return ApplicationResult::failed(recommendation, miner_ip, dry_run, None, e.into());
            }
        };

        let command = match validate_and_translate(recommendation, &self.capabilities) {
            Ok(command) => command,
            Err(e) => {
                info!(
                    recommendation_id = recommendation.id(),
                    miner_ip,
                    error = %e,
                    "recommendation rejected"
                );
                return ApplicationResult::failed(recommendation, miner_ip, dry_run, None, e.into());
            }
        };

        let client = match self.connector.connect(miner_ip, &credential) {
            Ok(client) => client,
            Err(e) => {
                return ApplicationResult::failed(recommendation, miner_ip, dry_run, None, e.into())
            }
        };

        // Best effort: an unavailable telemetry sample must not block
        // the apply itself
        let pre_telemetry = match client.get_telemetry().await {
            Ok(telemetry) => Some(telemetry),
            Err(e) => {
                debug!(miner_ip, error = %e, "pre-apply telemetry unavailable");
                None
            }
        };

        if dry_run {
            debug!(
                recommendation_id = recommendation.id(),
                miner_ip, "dry run complete, command not sent"
            );
            return ApplicationResult {
                recommendation_id: recommendation.id().to_string(),
                miner_ip: miner_ip.to_string(),
                dry_run: true,
                success: true,
                applied_command: Some(command),
                pre_telemetry,
                post_telemetry: None,
                error: None,
                completed_at: Utc::now(),
            };
        }

        info!(
            recommendation_id = recommendation.id(),
            miner_ip,
            command = ?command,
            "committing recommendation"
        );
        match Self::dispatch(&client, &command).await {
            Ok(()) => {
                let post_telemetry = match client.get_telemetry().await {
                    Ok(telemetry) => Some(telemetry),
                    Err(e) => {
                        debug!(miner_ip, error = %e, "post-apply telemetry unavailable");
                        None
                    }
                };
                ApplicationResult {
                    recommendation_id: recommendation.id().to_string(),
                    miner_ip: miner_ip.to_string(),
                    dry_run: false,
                    success: true,
                    applied_command: Some(command),
                    pre_telemetry,
                    post_telemetry,
                    error: None,
                    completed_at: Utc::now(),
                }
            }
            Err(e) => {
                warn!(
                    recommendation_id = recommendation.id(),
                    miner_ip,
                    error = %e,
                    "commit failed"
                );
                ApplicationResult::failed(recommendation, miner_ip, false, pre_telemetry, e.into())
            }
        }
    }

    /// Apply a hashrate tuning recommendation, rejecting other kinds
    pub async fn apply_hashrate_tuning(
        &self,
        recommendation: &Recommendation,
        miner_ip: &str,
        dry_run: bool,
    ) -> ApplicationResult {
        self.apply_of_kind(recommendation, "dynamic_hashrate_tuning", miner_ip, dry_run)
            .await
    }

    /// Apply a power optimization recommendation, rejecting other kinds
    pub async fn apply_power_optimization(
        &self,
        recommendation: &Recommendation,
        miner_ip: &str,
        dry_run: bool,
    ) -> ApplicationResult {
        self.apply_of_kind(recommendation, "power_optimization", miner_ip, dry_run)
            .await
    }

    /// Apply an overclocking recommendation, rejecting other kinds
    pub async fn apply_overclocking(
        &self,
        recommendation: &Recommendation,
        miner_ip: &str,
        dry_run: bool,
    ) -> ApplicationResult {
        self.apply_of_kind(recommendation, "intelligent_overclocking", miner_ip, dry_run)
            .await
    }

    async fn apply_of_kind(
        &self,
        recommendation: &Recommendation,
        expected_kind: &str,
        miner_ip: &str,
        dry_run: bool,
    ) -> ApplicationResult {
        if recommendation.kind() != expected_kind {
            return ApplicationResult::failed(
                recommendation,
                miner_ip,
                dry_run,
                None,
                ApplyError::InvalidRecommendation {
                    detail: format!(
                        "expected {expected_kind}, got {}",
                        recommendation.kind()
                    ),
                },
            );
        }
        self.apply(recommendation, miner_ip, dry_run).await
    }

    /// Read current telemetry for a miner without mutating anything
    pub async fn miner_telemetry(&self, miner_ip: &str) -> Result<Telemetry, ApplyError> {
        let credential = self.resolver.resolve(Some(miner_ip))?;
        let client = self.connector.connect(miner_ip, &credential)?;
        Ok(client.get_telemetry().await?)
    }

    async fn dispatch(client: &C::Client, command: &FirmwareCommand) -> Result<(), FirmwareError> {
        match command {
            FirmwareCommand::SetHashrateLimit { percent } => {
                client.set_hashrate_limit(*percent).await
            }
            FirmwareCommand::SetPowerLimit { percent } => client.set_power_limit(*percent).await,
            FirmwareCommand::SetOverclock {
                core_clock_offset,
                memory_clock_offset,
                power_limit_percent,
                core_voltage_offset,
            } => {
                client
                    .set_overclock(
                        *core_clock_offset,
                        *memory_clock_offset,
                        *power_limit_percent,
                        *core_voltage_offset,
                    )
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialResolver;
    use crate::firmware::types::Telemetry;
    use crate::store::MemorySecretStore;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn canned_telemetry() -> Telemetry {
        Telemetry {
            hashrate_ths: 98.5,
            power_watts: 3250.0,
            chip_temp_c: 65.0,
            board_temp_c: 58.0,
            fan_rpm: Some(5400),
            uptime_secs: 86_400,
            accepted_shares: 12_000,
            rejected_shares: 14,
            efficiency_w_per_th: Some(33.0),
        }
    }

    /// Recording double for the device boundary
    #[derive(Clone)]
    struct MockFirmware {
        telemetry: Result<Telemetry, FirmwareError>,
        write_result: Result<(), FirmwareError>,
        mutating_calls: Arc<Mutex<Vec<FirmwareCommand>>>,
    }

    impl MockFirmware {
        fn healthy() -> Self {
            Self {
                telemetry: Ok(canned_telemetry()),
                write_result: Ok(()),
                mutating_calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn record(&self, command: FirmwareCommand) -> Result<(), FirmwareError> {
            self.mutating_calls.lock().push(command);
            self.write_result.clone()
        }
    }

    impl FirmwareControl for MockFirmware {
        async fn get_summary(&self) -> Result<crate::firmware::types::Summary, FirmwareError> {
            unimplemented!("summary not exercised by orchestrator tests")
        }

        async fn get_chips_status(
            &self,
        ) -> Result<crate::firmware::types::ChipsStatus, FirmwareError> {
            unimplemented!("chips not exercised by orchestrator tests")
        }

        async fn get_telemetry(&self) -> Result<Telemetry, FirmwareError> {
            self.telemetry.clone()
        }

        async fn set_hashrate_limit(&self, percent: f64) -> Result<(), FirmwareError> {
            self.record(FirmwareCommand::SetHashrateLimit { percent })
        }

        async fn set_power_limit(&self, percent: f64) -> Result<(), FirmwareError> {
            self.record(FirmwareCommand::SetPowerLimit { percent })
        }

        async fn set_overclock(
            &self,
            core_clock_offset: i32,
            memory_clock_offset: i32,
            power_limit_percent: f64,
            core_voltage_offset: i32,
        ) -> Result<(), FirmwareError> {
            self.record(FirmwareCommand::SetOverclock {
                core_clock_offset,
                memory_clock_offset,
                power_limit_percent,
                core_voltage_offset,
            })
        }
    }

    #[derive(Clone)]
    struct MockConnector {
        firmware: MockFirmware,
        connects: Arc<Mutex<u32>>,
    }

    impl MockConnector {
        fn new(firmware: MockFirmware) -> Self {
            Self {
                firmware,
                connects: Arc::new(Mutex::new(0)),
            }
        }
    }

    impl FirmwareConnector for MockConnector {
        type Client = MockFirmware;

        fn connect(
            &self,
            _host: &str,
            _credential: &crate::credentials::Credential,
        ) -> Result<MockFirmware, FirmwareError> {
            *self.connects.lock() += 1;
            Ok(self.firmware.clone())
        }
    }

    fn orchestrator_with(
        firmware: MockFirmware,
    ) -> (TuningOrchestrator<MockConnector>, MockConnector) {
        let resolver = CredentialResolver::new(Box::new(MemorySecretStore::new()), None);
        resolver.save("192.168.1.101", "admin", "admin", true).unwrap();
        let connector = MockConnector::new(firmware);
        (
            TuningOrchestrator::new(resolver, DeviceCapabilities::default(), connector.clone()),
            connector,
        )
    }

    fn power_reduction(percent: f64) -> Recommendation {
        Recommendation::PowerOptimization {
            id: "test-power".to_string(),
            miner_id: "miner_192.168.1.101".to_string(),
            power_reduction_percent: percent,
        }
    }

    #[tokio::test]
    async fn test_dry_run_never_mutates() {
        let firmware = MockFirmware::healthy();
        let (orchestrator, _) = orchestrator_with(firmware.clone());

        let result = orchestrator
            .apply(&power_reduction(15.0), "192.168.1.101", true)
            .await;

        assert!(result.success);
        assert!(result.dry_run);
        assert_eq!(
            result.applied_command,
            Some(FirmwareCommand::SetPowerLimit { percent: 85.0 })
        );
        assert!(result.pre_telemetry.is_some());
        assert!(result.post_telemetry.is_none());
        assert!(firmware.mutating_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_commit_sends_exactly_one_write() {
        let firmware = MockFirmware::healthy();
        let (orchestrator, _) = orchestrator_with(firmware.clone());

        let result = orchestrator
            .apply(&power_reduction(15.0), "192.168.1.101", false)
            .await;

        assert!(result.success);
        assert!(!result.dry_run);
        assert!(result.post_telemetry.is_some());
        assert_eq!(
            firmware.mutating_calls.lock().as_slice(),
            &[FirmwareCommand::SetPowerLimit { percent: 85.0 }]
        );
    }

    #[tokio::test]
    async fn test_validation_failure_means_no_device_contact() {
        let firmware = MockFirmware::healthy();
        let (orchestrator, connector) = orchestrator_with(firmware.clone());

        let overclock = Recommendation::IntelligentOverclocking {
            id: "test-oc".to_string(),
            miner_id: "miner_192.168.1.101".to_string(),
            core_clock_offset: 500,
            memory_clock_offset: 0,
            power_limit_percent: 85.0,
            core_voltage_offset: 0,
        };
        let result = orchestrator.apply(&overclock, "192.168.1.101", false).await;

        assert!(!result.success);
        assert!(matches!(
            result.error,
            Some(ApplyError::Validation { ref field, bound, .. })
                if field == "core_clock_offset" && bound == 100.0
        ));
        assert_eq!(*connector.connects.lock(), 0);
        assert!(firmware.mutating_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_miner_fails_before_validation() {
        let firmware = MockFirmware::healthy();
        let (orchestrator, connector) = orchestrator_with(firmware);

        let result = orchestrator
            .apply(&power_reduction(15.0), "10.99.99.99", false)
            .await;

        assert!(!result.success);
        assert!(matches!(
            result.error,
            Some(ApplyError::CredentialNotFound { ref host }) if host == "10.99.99.99"
        ));
        assert_eq!(*connector.connects.lock(), 0);
    }

    #[tokio::test]
    async fn test_telemetry_failure_does_not_abort_apply() {
        let mut firmware = MockFirmware::healthy();
        firmware.telemetry = Err(FirmwareError::Unreachable {
            host: "192.168.1.101".to_string(),
            reason: "timed out".to_string(),
        });
        let (orchestrator, _) = orchestrator_with(firmware.clone());

        let result = orchestrator
            .apply(&power_reduction(15.0), "192.168.1.101", false)
            .await;

        assert!(result.success);
        assert!(result.pre_telemetry.is_none());
        assert!(result.post_telemetry.is_none());
        assert_eq!(firmware.mutating_calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_surfaces_classified_error() {
        let mut firmware = MockFirmware::healthy();
        firmware.write_result = Err(FirmwareError::AmbiguousWrite {
            host: "192.168.1.101".to_string(),
        });
        let (orchestrator, _) = orchestrator_with(firmware);

        let result = orchestrator
            .apply(&power_reduction(15.0), "192.168.1.101", false)
            .await;

        assert!(!result.success);
        assert!(result.pre_telemetry.is_some());
        assert!(matches!(
            result.error,
            Some(ApplyError::AmbiguousWrite { .. })
        ));
    }

    #[tokio::test]
    async fn test_kind_specific_wrapper_rejects_mismatch() {
        let firmware = MockFirmware::healthy();
        let (orchestrator, connector) = orchestrator_with(firmware);

        let result = orchestrator
            .apply_hashrate_tuning(&power_reduction(15.0), "192.168.1.101", true)
            .await;

        assert!(!result.success);
        assert!(matches!(
            result.error,
            Some(ApplyError::InvalidRecommendation { .. })
        ));
        assert_eq!(*connector.connects.lock(), 0);
    }

    #[tokio::test]
    async fn test_miner_telemetry_read_path() {
        let firmware = MockFirmware::healthy();
        let (orchestrator, _) = orchestrator_with(firmware.clone());

        let telemetry = orchestrator.miner_telemetry("192.168.1.101").await.unwrap();
        assert_eq!(telemetry.hashrate_ths, 98.5);
        assert!(firmware.mutating_calls.lock().is_empty());
    }
}
