//! Consensus rules and parameters

pub mod params;
pub mod validation;

pub use params::ConsensusParams;
pub use validation::BlockValidator;
