use crate::api::rest::RestApi;
use crate::config::Config;
use crate::core::Blockchain;
use crate::crypto::keys::KeyPair;
use crate::ledger::{unix_now, Ledger};
use crate::storage::Database;
use crate::{LedgerError, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser)]
#[command(name = "nomadcoind")]
#[command(about = "Nomadcoin node - single-node proof-of-work ledger")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Data directory")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, help = "REST API port")]
    pub port: Option<u16>,

    #[arg(long, help = "Enable debug logging")]
    pub debug: bool,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the ledger and its HTTP API
    Start {
        #[arg(long, env = "NOMADCOIN_PRIVATE_KEY", help = "Node private key (hex)")]
        private_key: String,

        #[arg(long, help = "Keep mining blocks in the background")]
        mine: bool,
    },

    /// Print the address belonging to a private key
    Address {
        #[arg(long, env = "NOMADCOIN_PRIVATE_KEY", help = "Private key (hex)")]
        private_key: String,
    },

    /// Replay the stored chain and report its tip
    Verify,

    /// Mine blocks paying the given key's address
    Mine {
        #[arg(long, env = "NOMADCOIN_PRIVATE_KEY", help = "Private key (hex)")]
        private_key: String,

        #[arg(long, default_value_t = 1, help = "Number of blocks to mine")]
        blocks: u64,
    },
}

pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging once
    let _ = if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).try_init()
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init()
    };

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Override config with CLI arguments
    if let Some(port) = cli.port {
        config.api.rest_port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    match cli.command {
        Commands::Start { private_key, mine } => start_node(config, &private_key, mine).await?,
        Commands::Address { private_key } => show_address(&private_key)?,
        Commands::Verify => verify_chain(&config)?,
        Commands::Mine { private_key, blocks } => mine_blocks(config, &private_key, blocks).await?,
    }

    Ok(())
}

fn show_address(private_key: &str) -> Result<()> {
    let keys = KeyPair::from_hex(private_key)?;
    println!("{}", keys.address);
    Ok(())
}

fn verify_chain(config: &Config) -> Result<()> {
    let db = Database::new(config.chain_db_path())?;
    let blocks = db.load_chain()?;
    if blocks.is_empty() {
        println!("No stored chain in {}", config.storage.data_dir.display());
        return Ok(());
    }

    let chain = Blockchain::from_blocks(blocks, config.consensus, unix_now())?;
    let info = chain.get_chain_info();
    println!("Chain valid");
    println!("  Height:     {}", info.height);
    println!("  Tip:        {}", info.tip);
    println!("  Work:       {}", info.total_work);
    println!("  Difficulty: {}", info.difficulty);
    println!("  UTXOs:      {}", info.utxo_count);
    Ok(())
}

async fn mine_blocks(config: Config, private_key: &str, count: u64) -> Result<()> {
    let keys = KeyPair::from_hex(private_key)?;
    let ledger = Arc::new(Ledger::open(&config)?);

    for _ in 0..count {
        let ledger = ledger.clone();
        let address = keys.address.clone();
        let block = tokio::task::spawn_blocking(move || ledger.create_and_broadcast_block(&address))
            .await
            .map_err(|e| LedgerError::InvalidInput(format!("Mining task failed: {}", e)))??;
        println!("Mined block {} ({})", block.index(), block.hash);
    }

    println!("Balance of {}: {}", keys.address, ledger.get_balance(&keys.address));
    Ok(())
}

async fn start_node(config: Config, private_key: &str, mine: bool) -> Result<()> {
    let keys = KeyPair::from_hex(private_key)?;
    let ledger = Arc::new(Ledger::open(&config)?);
    log::info!("Node address {}", keys.address);

    let mut handles = Vec::new();

    // Announcements would be relayed to peers here; the node only logs them.
    let mut announcements = ledger.subscribe();
    handles.push(tokio::spawn(async move {
        while let Ok(block) = announcements.recv().await {
            log::info!("Announcing block {} ({})", block.index(), block.hash);
        }
    }));

    if config.api.enable_rest {
        let rest_api = RestApi::new(ledger.clone(), keys.clone(), config.api.clone());
        handles.push(tokio::spawn(async move {
            if let Err(e) = rest_api.start().await {
                log::error!("REST API error: {}", e);
            }
        }));
    }

    if mine {
        let ledger = ledger.clone();
        let address = keys.address.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let worker = ledger.clone();
                let address = address.clone();
                match tokio::task::spawn_blocking(move || worker.create_and_broadcast_block(&address)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(LedgerError::MiningInterrupted(_))) if ledger.mining_stopped() => break,
                    Ok(Err(LedgerError::MiningInterrupted(nonce))) => {
                        log::debug!("Mining restarted after interruption at nonce {}", nonce);
                    }
                    Ok(Err(e)) => log::warn!("Mining attempt failed: {}", e),
                    Err(e) => {
                        log::error!("Mining task failed: {}", e);
                        break;
                    }
                }
            }
        }));
    }

    signal::ctrl_c().await?;

    log::info!("Shutting down");
    ledger.stop_mining();
    for handle in handles {
        handle.abort();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_mine_command() {
        let cli = Cli::try_parse_from([
            "nomadcoind",
            "--debug",
            "mine",
            "--private-key",
            "01",
            "--blocks",
            "3",
        ])
        .unwrap();

        assert!(cli.debug);
        assert!(matches!(cli.command, Commands::Mine { blocks: 3, .. }));
    }

    #[test]
    fn test_address_rejects_bad_key() {
        assert!(show_address("not-hex").is_err());
        assert!(show_address(&"00".repeat(32)).is_err());
        assert!(show_address(&format!("{}01", "00".repeat(31))).is_ok());
    }

    #[test]
    fn test_verify_without_snapshot() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_path_buf();
        verify_chain(&config)
    }
}
