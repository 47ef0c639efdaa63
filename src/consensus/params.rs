use serde::{Deserialize, Serialize};

pub const COINBASE_AMOUNT: u64 = 50;
/// Target seconds between blocks.
pub const BLOCK_GENERATION_INTERVAL: u64 = 10;
/// Blocks between difficulty retargets.
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;
/// Allowed clock drift, in seconds, for block timestamps.
pub const TIMESTAMP_TOLERANCE: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub coinbase_amount: u64,
    pub block_generation_interval: u64,
    pub difficulty_adjustment_interval: u64,
    pub timestamp_tolerance: u64,
    /// Floor applied to the retarget result; zero disables it.
    #[serde(default)]
    pub minimum_difficulty: u32,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            coinbase_amount: COINBASE_AMOUNT,
            block_generation_interval: BLOCK_GENERATION_INTERVAL,
            difficulty_adjustment_interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
            timestamp_tolerance: TIMESTAMP_TOLERANCE,
            minimum_difficulty: 0,
        }
    }
}

impl ConsensusParams {
    /// Seconds one retarget window is expected to take.
    pub fn expected_window_time(&self) -> u64 {
        self.block_generation_interval * self.difficulty_adjustment_interval
    }
}
