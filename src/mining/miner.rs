use crate::core::block::{calculate_hash, transactions_data};
use crate::core::Block;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningStats {
    pub is_mining: bool,
    pub total_hashes: u64,
    pub blocks_mined: u64,
    pub interrupted_attempts: u64,
    pub last_block_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiningOutcome {
    Found(Block),
    /// The tip moved or a stop was requested before a solution was found.
    Interrupted { nonce: u64 },
    /// The external nonce cap ran out.
    Exhausted { nonce: u64 },
}

/// Counter bumped every time the chain tip changes.
#[derive(Debug, Clone, Default)]
pub struct TipEpoch(Arc<AtomicU64>);

impl TipEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn watch(&self) -> EpochWatch {
        EpochWatch { epoch: self.clone(), start: self.current() }
    }
}

/// Snapshot of a `TipEpoch` taken when a block template was assembled.
#[derive(Debug, Clone)]
pub struct EpochWatch {
    epoch: TipEpoch,
    start: u64,
}

impl EpochWatch {
    pub fn is_stale(&self) -> bool {
        self.epoch.current() != self.start
    }
}

#[derive(Debug, Default)]
pub struct Miner {
    max_nonces: Option<u64>,
    is_mining: AtomicBool,
    stopped: AtomicBool,
    hash_counter: AtomicU64,
    blocks_mined: AtomicU64,
    interrupted: AtomicU64,
    last_block_time: AtomicU64,
}

impl Miner {
    pub fn new(max_nonces: Option<u64>) -> Self {
        Self { max_nonces, ..Self::default() }
    }

    /// Searches nonces upward from 0 until the block hash has at least
    /// `difficulty` leading zero bits. `watch` and the stop flag are checked
    /// before every hash, so an interruption costs at most one hash. Once
    /// stopped, every later attempt is interrupted at nonce 0.
    pub fn mine(&self, mut block: Block, watch: &EpochWatch) -> MiningOutcome {
        self.is_mining.store(true, Ordering::SeqCst);

        let start_time = Instant::now();
        let tx_data = transactions_data(&block.transactions);
        let difficulty = block.header.difficulty;
        let mut nonce = 0u64;

        let outcome = loop {
            if watch.is_stale() || self.is_stopped() {
                self.interrupted.fetch_add(1, Ordering::Relaxed);
                log::warn!("Mining of block {} interrupted at nonce {}", block.index(), nonce);
                break MiningOutcome::Interrupted { nonce };
            }

            if self.max_nonces.is_some_and(|cap| nonce >= cap) {
                log::warn!("Mining of block {} gave up after {} nonces", block.index(), nonce);
                break MiningOutcome::Exhausted { nonce };
            }

            block.header.nonce = nonce;
            let hash = calculate_hash(&block.header, &tx_data);
            self.hash_counter.fetch_add(1, Ordering::Relaxed);

            if hash.meets_difficulty(difficulty) {
                block.hash = hash;
                let elapsed = start_time.elapsed().as_secs_f64();
                log::info!(
                    "Block {} mined! Nonce: {}, Difficulty: {}, Time: {:.2}s",
                    block.index(),
                    nonce,
                    difficulty,
                    elapsed
                );
                break MiningOutcome::Found(block);
            }

            nonce = nonce.wrapping_add(1);
        };

        self.is_mining.store(false, Ordering::SeqCst);
        outcome
    }

    /// Abandons the attempt in progress and refuses all later ones.
    pub fn stop_mining(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            log::info!("Stopping mining");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn is_mining(&self) -> bool {
        self.is_mining.load(Ordering::SeqCst)
    }

    pub fn record_block_mined(&self, timestamp: u64) {
        self.blocks_mined.fetch_add(1, Ordering::Relaxed);
        self.last_block_time.store(timestamp, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> MiningStats {
        let last = self.last_block_time.load(Ordering::Relaxed);
        MiningStats {
            is_mining: self.is_mining(),
            total_hashes: self.hash_counter.load(Ordering::Relaxed),
            blocks_mined: self.blocks_mined.load(Ordering::Relaxed),
            interrupted_attempts: self.interrupted.load(Ordering::Relaxed),
            last_block_time: (last > 0).then_some(last),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use crate::crypto::hash::Hash256;
    use crate::crypto::keys::PrivateKey;

    fn template(difficulty: u32) -> Block {
        let address = PrivateKey::from_bytes(&[1u8; 32]).unwrap().address();
        Block::new(1, Some(Hash256::hash(b"parent")), 1_700_000_000, vec![Transaction::new_coinbase(address, 1, 50)], difficulty)
    }

    #[test]
    fn test_mines_block_meeting_difficulty() {
        let miner = Miner::default();
        let epoch = TipEpoch::new();

        match miner.mine(template(8), &epoch.watch()) {
            MiningOutcome::Found(block) => {
                assert!(block.hash.leading_zero_bits() >= 8);
                assert_eq!(block.hash, block.compute_hash());
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let stats = miner.get_stats();
        assert!(stats.total_hashes >= 1);
        assert!(!stats.is_mining);
    }

    #[test]
    fn test_difficulty_zero_takes_first_nonce() {
        let miner = Miner::default();
        let outcome = miner.mine(template(0), &TipEpoch::new().watch());
        assert!(matches!(outcome, MiningOutcome::Found(ref b) if b.header.nonce == 0));
    }

    #[test]
    fn test_stale_tip_interrupts_immediately() {
        let miner = Miner::default();
        let epoch = TipEpoch::new();
        let watch = epoch.watch();
        epoch.advance();

        assert_eq!(miner.mine(template(255), &watch), MiningOutcome::Interrupted { nonce: 0 });
        assert_eq!(miner.get_stats().interrupted_attempts, 1);
    }

    #[test]
    fn test_interrupt_from_another_thread() {
        let miner = Arc::new(Miner::default());
        let epoch = TipEpoch::new();
        let watch = epoch.watch();

        let handle = {
            let miner = miner.clone();
            std::thread::spawn(move || miner.mine(template(255), &watch))
        };

        std::thread::sleep(std::time::Duration::from_millis(20));
        epoch.advance();

        assert!(matches!(handle.join().unwrap(), MiningOutcome::Interrupted { .. }));
    }

    #[test]
    fn test_stop_before_attempt_is_not_lost() {
        let miner = Miner::new(Some(2000));
        let epoch = TipEpoch::new();
        miner.stop_mining();

        assert_eq!(miner.mine(template(255), &epoch.watch()), MiningOutcome::Interrupted { nonce: 0 });
        assert_eq!(miner.mine(template(0), &epoch.watch()), MiningOutcome::Interrupted { nonce: 0 });
        assert!(miner.is_stopped());
        assert_eq!(miner.get_stats().interrupted_attempts, 2);
        assert_eq!(miner.get_stats().total_hashes, 0);
    }

    #[test]
    fn test_nonce_cap() {
        let miner = Miner::new(Some(16));
        assert_eq!(
            miner.mine(template(255), &TipEpoch::new().watch()),
            MiningOutcome::Exhausted { nonce: 16 }
        );
    }
}
