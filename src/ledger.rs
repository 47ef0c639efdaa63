//! Owned ledger context: chain, UTXO set and mempool behind one writer lock.
//!
//! Every mutation (block append, chain replacement, mempool admission and the
//! reconcile that follows each tip change) takes the write lock for its whole
//! read-modify-write sequence. Queries take the read lock and return owned
//! copies. Mining runs outside the lock and is cancelled through the tip epoch.

use crate::config::{Config, MiningConfig};
use crate::consensus::ConsensusParams;
use crate::core::transaction::build_transaction;
use crate::core::{Block, Blockchain, ChainState, Mempool, Transaction, UtxoEntry};
use crate::crypto::hash::Hash256;
use crate::crypto::keys::{Address, PrivateKey};
use crate::mining::{Miner, MiningOutcome, MiningStats, TipEpoch};
use crate::storage::Database;
use crate::{LedgerError, Result};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

#[derive(Debug)]
struct LedgerState {
    chain: Blockchain,
    mempool: Mempool,
}

pub struct Ledger {
    state: RwLock<LedgerState>,
    epoch: TipEpoch,
    miner: Miner,
    announcer: broadcast::Sender<Block>,
    store: Option<Database>,
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

impl Ledger {
    /// Builds the ledger from `config`, opening the snapshot when persistence is on.
    pub fn open(config: &Config) -> Result<Self> {
        let store = if config.storage.persist {
            std::fs::create_dir_all(&config.storage.data_dir)?;
            Some(Database::new(config.chain_db_path())?)
        } else {
            None
        };

        Self::new(config.consensus, &config.mining, store)
    }

    /// Starts from the snapshot in `store` if it holds one, otherwise from
    /// genesis. A stored chain is replayed in full before it is trusted.
    pub fn new(params: ConsensusParams, mining: &MiningConfig, store: Option<Database>) -> Result<Self> {
        let chain = match &store {
            Some(db) => {
                let blocks = db.load_chain()?;
                if blocks.is_empty() {
                    let chain = Blockchain::new(params)?;
                    db.save_block(chain.tip())?;
                    chain
                } else {
                    log::info!("Replaying {} stored blocks", blocks.len());
                    Blockchain::from_blocks(blocks, params, unix_now())?
                }
            }
            None => Blockchain::new(params)?,
        };

        log::info!("Ledger ready at height {} ({})", chain.height(), chain.tip().hash);

        let (announcer, _) = broadcast::channel(mining.announce_capacity.max(1));

        Ok(Self {
            state: RwLock::new(LedgerState { chain, mempool: Mempool::new() }),
            epoch: TipEpoch::new(),
            miner: Miner::new(mining.max_nonces),
            announcer,
            store,
        })
    }

    // Mutations are atomic, so a panicking writer never leaves half-applied state behind.
    fn read_state(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `block` if it extends the current tip.
    pub fn submit_candidate_block(&self, block: Block) -> Result<()> {
        let mut state = self.write_state();
        let state = &mut *state;

        if let Err(e) = state.chain.add_block(block.clone(), unix_now()) {
            log::debug!("Candidate block {} rejected: {}", block.hash, e);
            return Err(e);
        }

        state.mempool.reconcile(state.chain.utxo_set());
        self.epoch.advance();

        if let Some(db) = &self.store {
            if let Err(e) = db.save_block(&block) {
                log::warn!("Failed to persist block {}: {}", block.index(), e);
            }
        }

        Ok(())
    }

    /// Adopts `blocks` if they form a valid chain with more work than ours.
    pub fn submit_candidate_chain(&self, blocks: Vec<Block>) -> Result<()> {
        let mut state = self.write_state();
        let state = &mut *state;

        if let Err(e) = state.chain.replace_chain(blocks, unix_now()) {
            log::debug!("Candidate chain rejected: {}", e);
            return Err(e);
        }

        let dropped = state.mempool.reconcile(state.chain.utxo_set());
        self.epoch.advance();
        log::info!(
            "Chain replaced, new height {} ({} pooled transactions dropped)",
            state.chain.height(),
            dropped
        );

        if let Some(db) = &self.store {
            if let Err(e) = db.replace_chain(state.chain.blocks()) {
                log::warn!("Failed to persist replaced chain: {}", e);
            }
        }

        Ok(())
    }

    pub fn submit_transaction(&self, tx: Transaction) -> Result<()> {
        let mut state = self.write_state();
        let state = &mut *state;

        let id = tx.id;
        state.mempool.add(tx, state.chain.utxo_set()).map_err(|e| {
            log::debug!("Transaction {} rejected: {}", id, e);
            e
        })
    }

    /// Builds a payment from `private_key`'s unspent, unpooled outputs and
    /// adds it to the mempool.
    pub fn create_and_submit_transaction(
        &self,
        private_key: &PrivateKey,
        receiver: &Address,
        amount: u64,
    ) -> Result<Transaction> {
        let mut state = self.write_state();
        let state = &mut *state;

        let tx = build_transaction(receiver, amount, private_key, state.chain.utxo_set(), &state.mempool)?;
        state.mempool.add(tx.clone(), state.chain.utxo_set())?;

        log::info!("Created transaction {} sending {} to {}", tx.id, amount, receiver);
        Ok(tx)
    }

    /// Assembles a block paying the coinbase to `coinbase_address` over the
    /// current mempool, mines it and appends it. The search is abandoned as
    /// soon as the tip changes underneath it. Blocks the calling thread.
    pub fn create_and_broadcast_block(&self, coinbase_address: &Address) -> Result<Block> {
        let (template, watch) = {
            let state = self.read_state();
            let template = state.chain.block_template(coinbase_address, state.mempool.transactions(), unix_now());
            (template, self.epoch.watch())
        };

        match self.miner.mine(template, &watch) {
            MiningOutcome::Found(block) => {
                self.submit_candidate_block(block.clone())?;
                self.miner.record_block_mined(block.header.timestamp);

                if self.announcer.send(block.clone()).is_err() {
                    log::debug!("No subscribers for block {}", block.index());
                }
                Ok(block)
            }
            MiningOutcome::Interrupted { nonce } | MiningOutcome::Exhausted { nonce } => {
                Err(LedgerError::MiningInterrupted(nonce))
            }
        }
    }

    /// Stops the current attempt and every later one.
    pub fn stop_mining(&self) {
        self.miner.stop_mining();
    }

    pub fn mining_stopped(&self) -> bool {
        self.miner.is_stopped()
    }

    /// Locally mined blocks, delivered after they are appended.
    pub fn subscribe(&self) -> broadcast::Receiver<Block> {
        self.announcer.subscribe()
    }

    pub fn get_chain(&self) -> Vec<Block> {
        self.read_state().chain.blocks().to_vec()
    }

    pub fn get_block_by_hash(&self, hash: &Hash256) -> Option<Block> {
        self.read_state().chain.get_block_by_hash(hash).cloned()
    }

    pub fn get_transaction_by_id(&self, id: &Hash256) -> Option<Transaction> {
        self.read_state().chain.get_transaction(id).cloned()
    }

    pub fn get_mempool(&self) -> Vec<Transaction> {
        self.read_state().mempool.transactions().to_vec()
    }

    pub fn get_balance(&self, address: &Address) -> u64 {
        self.read_state().chain.utxo_set().get_balance(address)
    }

    pub fn get_utxo_snapshot(&self) -> Vec<UtxoEntry> {
        self.read_state().chain.utxo_set().snapshot()
    }

    pub fn get_utxos_for_address(&self, address: &Address) -> Vec<UtxoEntry> {
        self.read_state().chain.utxo_set().utxos_for(address).cloned().collect()
    }

    pub fn get_latest_block(&self) -> Block {
        self.read_state().chain.tip().clone()
    }

    pub fn get_latest_blocks(&self, count: usize) -> Vec<Block> {
        self.read_state().chain.get_latest_blocks(count)
    }

    /// Difficulty the next block must meet.
    pub fn get_difficulty(&self) -> u32 {
        self.read_state().chain.next_difficulty()
    }

    pub fn get_chain_work(&self) -> u128 {
        self.read_state().chain.total_work()
    }

    pub fn get_chain_info(&self) -> ChainState {
        self.read_state().chain.get_chain_info()
    }

    pub fn mining_stats(&self) -> MiningStats {
        self.miner.get_stats()
    }
}
