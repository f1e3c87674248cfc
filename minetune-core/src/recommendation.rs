//! Tuning recommendations consumed from the upstream engine
//!
//! A closed tagged enum, so adding a kind is a compile-time checked
//! change at the translator rather than a runtime string comparison.

use crate::translate::TranslateError;
use serde::{Deserialize, Serialize};

/// Abstract tuning instruction for one miner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recommendation {
    DynamicHashrateTuning {
        id: String,
        miner_id: String,
        recommended_hashrate_percent: f64,
    },
    PowerOptimization {
        id: String,
        miner_id: String,
        power_reduction_percent: f64,
    },
    IntelligentOverclocking {
        id: String,
        miner_id: String,
        core_clock_offset: i32,
        memory_clock_offset: i32,
        power_limit_percent: f64,
        core_voltage_offset: i32,
    },
}

const KNOWN_KINDS: &[&str] = &[
    "dynamic_hashrate_tuning",
    "power_optimization",
    "intelligent_overclocking",
];

impl Recommendation {
    /// Opaque idempotency/audit key assigned upstream
    pub fn id(&self) -> &str {
        match self {
            Self::DynamicHashrateTuning { id, .. }
            | Self::PowerOptimization { id, .. }
            | Self::IntelligentOverclocking { id, .. } => id,
        }
    }

    /// Logical miner identifier (distinct from the network host)
    pub fn miner_id(&self) -> &str {
        match self {
            Self::DynamicHashrateTuning { miner_id, .. }
            | Self::PowerOptimization { miner_id, .. }
            | Self::IntelligentOverclocking { miner_id, .. } => miner_id,
        }
    }

    /// Wire tag of this variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DynamicHashrateTuning { .. } => "dynamic_hashrate_tuning",
            Self::PowerOptimization { .. } => "power_optimization",
            Self::IntelligentOverclocking { .. } => "intelligent_overclocking",
        }
    }

    /// Decode an upstream recommendation mapping.
    ///
    /// The tag is inspected first so an unknown kind is reported as
    /// such instead of a generic decode failure.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, TranslateError> {
        let kind = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TranslateError::Invalid {
                detail: "missing \"type\" discriminator".to_string(),
            })?;
        if !KNOWN_KINDS.contains(&kind) {
            return Err(TranslateError::UnsupportedType {
                given: kind.to_string(),
            });
        }
        serde_json::from_value(value.clone()).map_err(|e| TranslateError::Invalid {
            detail: e.to_string(),
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, TranslateError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| TranslateError::Invalid {
                detail: e.to_string(),
            })?;
        Self::from_value(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hashrate_tuning() {
        let rec = Recommendation::from_json(
            r#"{
                "id": "rec-1",
                "type": "dynamic_hashrate_tuning",
                "miner_id": "miner_192.168.1.101",
                "recommended_hashrate_percent": 80.0
            }"#,
        )
        .unwrap();
        assert_eq!(rec.id(), "rec-1");
        assert_eq!(rec.kind(), "dynamic_hashrate_tuning");
        assert!(matches!(
            rec,
            Recommendation::DynamicHashrateTuning { recommended_hashrate_percent, .. }
                if recommended_hashrate_percent == 80.0
        ));
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        let err = Recommendation::from_json(
            r#"{"id": "x", "type": "quantum_tuning", "miner_id": "m"}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TranslateError::UnsupportedType { given } if given == "quantum_tuning"
        ));
    }

    #[test]
    fn test_missing_field_is_invalid() {
        let err = Recommendation::from_json(
            r#"{"id": "x", "type": "power_optimization", "miner_id": "m"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TranslateError::Invalid { .. }));
    }
}
