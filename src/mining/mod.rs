//! Proof-of-work mining and difficulty retargeting

pub mod miner;
pub mod difficulty;

pub use miner::{EpochWatch, Miner, MiningOutcome, MiningStats, TipEpoch};
pub use difficulty::DifficultyCalculator;
