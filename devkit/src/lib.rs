/*!
# Minetune DevKit - Stubs and utilities for development

Helpers for developing and testing against miner firmware without real
hardware:
- In-process stub firmware device recording control writes
- Recommendation JSON builders for the known tuning kinds
*/

pub mod recommendations;
pub mod stub_miner;

pub use recommendations::RecommendationBuilder;
pub use stub_miner::{RecordedCommand, StubMiner};
