//! Payload shapes exchanged with the miner management API
//!
//! Field names follow the firmware builds we have tested against and
//! are tolerant of absent optional fields; a different firmware line
//! may need adjusted serde attributes rather than code changes.

use serde::{Deserialize, Serialize};

/// High-level device identity and state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub model: String,
    pub firmware_version: String,
    pub status: String,
    #[serde(default)]
    pub uptime_secs: u64,
    #[serde(default)]
    pub hashrate_ths: f64,
    #[serde(default)]
    pub power_watts: f64,
}

/// Point-in-time operating telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    #[serde(default)]
    pub hashrate_ths: f64,
    #[serde(default)]
    pub power_watts: f64,
    #[serde(default)]
    pub chip_temp_c: f64,
    #[serde(default)]
    pub board_temp_c: f64,
    #[serde(default)]
    pub fan_rpm: Option<u32>,
    #[serde(default)]
    pub uptime_secs: u64,
    #[serde(default)]
    pub accepted_shares: u64,
    #[serde(default)]
    pub rejected_shares: u64,
    /// Watts per terahash, when the firmware reports it
    #[serde(default)]
    pub efficiency_w_per_th: Option<f64>,
}

/// Per-chip health as reported by the hashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipStatus {
    pub id: u32,
    #[serde(default)]
    pub hashrate_ths: f64,
    #[serde(default)]
    pub temp_c: f64,
    pub status: String,
}

/// One hashboard chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStatus {
    pub id: u32,
    #[serde(default)]
    pub chip_count: u32,
    #[serde(default)]
    pub hashrate_ths: f64,
    #[serde(default)]
    pub temp_c: f64,
    pub status: String,
    #[serde(default)]
    pub chips: Vec<ChipStatus>,
}

/// All chains of the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipsStatus {
    pub chains: Vec<ChainStatus>,
}

/// Concrete control write the device understands
///
/// Overclock parameters travel as one command so the firmware never
/// sees a partially applied profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum FirmwareCommand {
    SetHashrateLimit {
        percent: f64,
    },
    SetPowerLimit {
        percent: f64,
    },
    SetOverclock {
        core_clock_offset: i32,
        memory_clock_offset: i32,
        power_limit_percent: f64,
        core_voltage_offset: i32,
    },
}
