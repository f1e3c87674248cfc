//! Recommendation validation and translation to firmware commands
//!
//! Pure functions: no credential access, no network, same input and
//! capabilities always produce the same command. Out-of-range values
//! are rejected, never clamped; firmware semantics for over-limit
//! values are not trustworthy enough to guess at.

use crate::firmware::types::FirmwareCommand;
use crate::recommendation::Recommendation;
use serde::{Deserialize, Serialize};

/// Inclusive safe range for one offset parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetBounds {
    pub min: i32,
    pub max: i32,
}

impl OffsetBounds {
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }
}

/// Externally declared safe bounds for a miner model
///
/// These are configuration supplied per device model, not constants of
/// the translator. The defaults are deliberately conservative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceCapabilities {
    pub core_clock_offset: OffsetBounds,
    pub memory_clock_offset: OffsetBounds,
    pub core_voltage_offset: OffsetBounds,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            core_clock_offset: OffsetBounds::new(-100, 100),
            memory_clock_offset: OffsetBounds::new(-500, 500),
            core_voltage_offset: OffsetBounds::new(-50, 50),
        }
    }
}

/// Rejection reasons for a recommendation, serializable so apply
/// results can carry them verbatim
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TranslateError {
    #[error("{field} = {value} violates safe bound {bound}")]
    OutOfRange {
        field: String,
        value: f64,
        bound: f64,
    },
    #[error("unsupported recommendation type: {given}")]
    UnsupportedType { given: String },
    #[error("invalid recommendation payload: {detail}")]
    Invalid { detail: String },
}

/// Map a recommendation to the firmware command implementing it,
/// rejecting anything outside the declared safe envelope
pub fn validate_and_translate(
    recommendation: &Recommendation,
    capabilities: &DeviceCapabilities,
) -> Result<FirmwareCommand, TranslateError> {
    match recommendation {
        Recommendation::DynamicHashrateTuning {
            recommended_hashrate_percent,
            ..
        } => {
            check_percent("recommended_hashrate_percent", *recommended_hashrate_percent)?;
            Ok(FirmwareCommand::SetHashrateLimit {
                percent: *recommended_hashrate_percent,
            })
        }
        Recommendation::PowerOptimization {
            power_reduction_percent,
            ..
        } => {
            check_percent("power_reduction_percent", *power_reduction_percent)?;
            Ok(FirmwareCommand::SetPowerLimit {
                percent: 100.0 - power_reduction_percent,
            })
        }
        Recommendation::IntelligentOverclocking {
            core_clock_offset,
            memory_clock_offset,
            power_limit_percent,
            core_voltage_offset,
            ..
        } => {
            check_percent("power_limit_percent", *power_limit_percent)?;
            check_offset(
                "core_clock_offset",
                *core_clock_offset,
                capabilities.core_clock_offset,
            )?;
            check_offset(
                "memory_clock_offset",
                *memory_clock_offset,
                capabilities.memory_clock_offset,
            )?;
            check_offset(
                "core_voltage_offset",
                *core_voltage_offset,
                capabilities.core_voltage_offset,
            )?;
            Ok(FirmwareCommand::SetOverclock {
                core_clock_offset: *core_clock_offset,
                memory_clock_offset: *memory_clock_offset,
                power_limit_percent: *power_limit_percent,
                core_voltage_offset: *core_voltage_offset,
            })
        }
    }
}

/// Percentages are valid in [0, 100] inclusive; NaN never passes
fn check_percent(field: &str, value: f64) -> Result<(), TranslateError> {
    if (0.0..=100.0).contains(&value) {
        return Ok(());
    }
    let bound = if value > 100.0 { 100.0 } else { 0.0 };
    Err(TranslateError::OutOfRange {
        field: field.to_string(),
        value,
        bound,
    })
}

fn check_offset(field: &str, value: i32, bounds: OffsetBounds) -> Result<(), TranslateError> {
    if value < bounds.min {
        return Err(TranslateError::OutOfRange {
            field: field.to_string(),
            value: value as f64,
            bound: bounds.min as f64,
        });
    }
    if value > bounds.max {
        return Err(TranslateError::OutOfRange {
            field: field.to_string(),
            value: value as f64,
            bound: bounds.max as f64,
        });
    }
    Ok(())
}
