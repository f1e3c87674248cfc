//! Firmware device boundary
//!
//! [`FirmwareControl`] is the seam the orchestrator drives: telemetry
//! reads plus the three control writes. [`FirmwareClient`] is the
//! reqwest-backed implementation for the real device;
//! [`FirmwareConnector`] abstracts client construction so tests can
//! substitute recording doubles.

use crate::credentials::Credential;
use std::future::Future;

pub mod client;
pub mod types;

pub use client::{FirmwareClient, HttpConnector};
pub use types::{ChainStatus, ChipStatus, ChipsStatus, FirmwareCommand, Summary, Telemetry};

/// Failure classification for device operations
///
/// `Unreachable` is the only kind the transport retries, and only for
/// idempotent reads. `AmbiguousWrite` means a control write may or may
/// not have landed; blind resends risk double-application.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FirmwareError {
    #[error("authentication rejected by {host}")]
    Authentication { host: String },
    #[error("device {host} unreachable: {reason}")]
    Unreachable { host: String, reason: String },
    #[error("malformed response from {host}: {detail}")]
    Malformed { host: String, detail: String },
    #[error("write to {host} not acknowledged; device state unknown")]
    AmbiguousWrite { host: String },
}

/// Operations one authenticated device session supports
pub trait FirmwareControl: Send + Sync {
    fn get_summary(&self) -> impl Future<Output = Result<Summary, FirmwareError>> + Send;

    fn get_chips_status(&self) -> impl Future<Output = Result<ChipsStatus, FirmwareError>> + Send;

    fn get_telemetry(&self) -> impl Future<Output = Result<Telemetry, FirmwareError>> + Send;

    fn set_hashrate_limit(
        &self,
        percent: f64,
    ) -> impl Future<Output = Result<(), FirmwareError>> + Send;

    fn set_power_limit(
        &self,
        percent: f64,
    ) -> impl Future<Output = Result<(), FirmwareError>> + Send;

    /// All overclock parameters travel as one request so a profile is
    /// never partially applied
    fn set_overclock(
        &self,
        core_clock_offset: i32,
        memory_clock_offset: i32,
        power_limit_percent: f64,
        core_voltage_offset: i32,
    ) -> impl Future<Output = Result<(), FirmwareError>> + Send;
}

/// Builds a device client for a resolved credential
pub trait FirmwareConnector: Send + Sync {
    type Client: FirmwareControl;

    fn connect(&self, host: &str, credential: &Credential) -> Result<Self::Client, FirmwareError>;
}
