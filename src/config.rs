use crate::consensus::ConsensusParams;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub consensus: ConsensusParams,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub mining: MiningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Keep a block-list snapshot in `data_dir`.
    pub persist: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_rest: bool,
    pub rest_port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Give up a mining attempt after this many nonces.
    pub max_nonces: Option<u64>,
    pub announce_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            consensus: ConsensusParams::default(),
            storage: StorageConfig {
                data_dir: Self::home_dir().join(".nomadcoin"),
                persist: true,
            },
            api: ApiConfig {
                enable_rest: true,
                rest_port: 3000,
                cors_origins: vec!["*".to_string()],
            },
            mining: MiningConfig {
                max_nonces: None,
                announce_capacity: 64,
            },
        }
    }
}

impl Config {
    /// Loads the default config file, writing defaults first if it is missing.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn chain_db_path(&self) -> PathBuf {
        self.storage.data_dir.join("chain")
    }

    pub fn config_path() -> PathBuf {
        Self::home_dir().join(".nomadcoin").join("config.json")
    }

    fn home_dir() -> PathBuf {
        PathBuf::from(env::var("HOME").unwrap_or_else(|_| ".".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_consensus_constants() {
        let config = Config::default();
        assert_eq!(config.consensus.coinbase_amount, 50);
        assert_eq!(config.consensus.block_generation_interval, 10);
        assert_eq!(config.consensus.difficulty_adjustment_interval, 10);
        assert_eq!(config.consensus.timestamp_tolerance, 60);
        assert!(config.mining.max_nonces.is_none());
    }

    #[test]
    fn test_load_creates_file_then_reads_it_back() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("config.json");

        let mut created = Config::load_from(&path)?;
        assert!(path.exists());

        created.api.rest_port = 4100;
        created.mining.max_nonces = Some(1_000);
        created.save_to(&path)?;

        let loaded = Config::load_from(&path)?;
        assert_eq!(loaded.api.rest_port, 4100);
        assert_eq!(loaded.mining.max_nonces, Some(1_000));
        Ok(())
    }

    #[test]
    fn test_malformed_file_is_an_error() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json")?;
        assert!(Config::load_from(&path).is_err());
        Ok(())
    }
}
