/*!
Builders producing recommendation payloads shaped like the upstream
tuning engine's output, with fresh ids for each build.
*/

use serde_json::{json, Value};
use uuid::Uuid;

/// Helper for composing recommendation payloads in tests and demos
pub struct RecommendationBuilder {
    miner_id: String,
}

impl RecommendationBuilder {
    pub fn for_miner<S: Into<String>>(miner_id: S) -> Self {
        Self {
            miner_id: miner_id.into(),
        }
    }

    /// `dynamic_hashrate_tuning` payload
    pub fn hashrate_tuning(&self, recommended_hashrate_percent: f64) -> Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "type": "dynamic_hashrate_tuning",
            "miner_id": self.miner_id,
            "recommended_hashrate_percent": recommended_hashrate_percent,
        })
    }

    /// `power_optimization` payload
    pub fn power_optimization(&self, power_reduction_percent: f64) -> Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "type": "power_optimization",
            "miner_id": self.miner_id,
            "power_reduction_percent": power_reduction_percent,
        })
    }

    /// `intelligent_overclocking` payload
    pub fn overclocking(
        &self,
        core_clock_offset: i32,
        memory_clock_offset: i32,
        power_limit_percent: f64,
        core_voltage_offset: i32,
    ) -> Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "type": "intelligent_overclocking",
            "miner_id": self.miner_id,
            "core_clock_offset": core_clock_offset,
            "memory_clock_offset": memory_clock_offset,
            "power_limit_percent": power_limit_percent,
            "core_voltage_offset": core_voltage_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_carry_miner_and_fresh_ids() {
        let builder = RecommendationBuilder::for_miner("miner_192.168.1.101");
        let first = builder.hashrate_tuning(80.0);
        let second = builder.hashrate_tuning(80.0);

        assert_eq!(first["type"], "dynamic_hashrate_tuning");
        assert_eq!(first["miner_id"], "miner_192.168.1.101");
        assert_eq!(first["recommended_hashrate_percent"], 80.0);
        assert_ne!(first["id"], second["id"]);
    }

    #[test]
    fn test_overclocking_shape() {
        let payload =
            RecommendationBuilder::for_miner("m1").overclocking(50, 200, 85.0, 10);
        assert_eq!(payload["type"], "intelligent_overclocking");
        assert_eq!(payload["core_clock_offset"], 50);
        assert_eq!(payload["memory_clock_offset"], 200);
        assert_eq!(payload["power_limit_percent"], 85.0);
        assert_eq!(payload["core_voltage_offset"], 10);
    }
}
