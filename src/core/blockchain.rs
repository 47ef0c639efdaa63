use crate::consensus::{BlockValidator, ConsensusParams};
use crate::core::{Block, Transaction, UtxoSet};
use crate::crypto::hash::Hash256;
use crate::crypto::keys::Address;
use crate::mining::DifficultyCalculator;
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Receives the genesis coinbase: the public key of secret key 1.
pub const GENESIS_ADDRESS: &str = "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8";
pub const GENESIS_TIMESTAMP: u64 = 1_542_119_980;

/// Blocks from genesis to tip together with the UTXO set they produce.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    utxo_set: UtxoSet,
    validator: BlockValidator,
    difficulty: DifficultyCalculator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainState {
    pub tip: Hash256,
    pub height: u64,
    pub total_work: u128,
    pub difficulty: u32,
    pub utxo_count: usize,
}

impl Blockchain {
    pub fn new(params: ConsensusParams) -> Result<Self> {
        let validator = BlockValidator::new(params);
        let genesis = Self::create_genesis_block(&params)?;
        let utxo_set = validator.process_transactions(&genesis.transactions, &UtxoSet::new(), 0)?;

        Ok(Self {
            blocks: vec![genesis],
            utxo_set,
            validator,
            difficulty: DifficultyCalculator::new(params),
        })
    }

    /// Rebuilds a chain from a full block list by replaying it from genesis.
    pub fn from_blocks(blocks: Vec<Block>, params: ConsensusParams, now: u64) -> Result<Self> {
        let validator = BlockValidator::new(params);
        let utxo_set = validate_chain(&blocks, &validator, now)?;

        Ok(Self {
            blocks,
            utxo_set,
            validator,
            difficulty: DifficultyCalculator::new(params),
        })
    }

    /// The fixed first block every valid chain starts with.
    pub fn create_genesis_block(params: &ConsensusParams) -> Result<Block> {
        let address = Address::parse(GENESIS_ADDRESS)?;
        let coinbase = Transaction::new_coinbase(address, 0, params.coinbase_amount);
        Ok(Block::new(0, None, GENESIS_TIMESTAMP, vec![coinbase], 0))
    }

    pub fn params(&self) -> &ConsensusParams {
        self.validator.params()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn tip(&self) -> &Block {
        // never empty: constructed with genesis, replaced only by validated chains
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn height(&self) -> u64 {
        self.tip().index()
    }

    pub fn utxo_set(&self) -> &UtxoSet {
        &self.utxo_set
    }

    pub fn next_difficulty(&self) -> u32 {
        self.difficulty.next_difficulty(&self.blocks)
    }

    pub fn total_work(&self) -> u128 {
        chain_work(&self.blocks)
    }

    /// Unmined successor of the tip: coinbase to `coinbase_address` followed by `pending`.
    pub fn block_template(&self, coinbase_address: &Address, pending: &[Transaction], now: u64) -> Block {
        let tip = self.tip();
        let index = tip.index() + 1;

        let mut transactions = Vec::with_capacity(pending.len() + 1);
        transactions.push(Transaction::new_coinbase(
            coinbase_address.clone(),
            index,
            self.params().coinbase_amount,
        ));
        transactions.extend_from_slice(pending);

        Block::new(index, Some(tip.hash), now, transactions, self.next_difficulty())
    }

    /// Appends `block` if it extends the tip and its transactions apply
    /// cleanly. On error nothing changes.
    pub fn add_block(&mut self, block: Block, now: u64) -> Result<()> {
        self.validator.validate_block(&block, self.tip(), now)?;
        let utxo_set = self.validator.process_transactions(&block.transactions, &self.utxo_set, block.index())?;

        log::info!("Block {} added to blockchain ({})", block.index(), block.hash);
        self.blocks.push(block);
        self.utxo_set = utxo_set;
        Ok(())
    }

    pub fn is_chain_valid(&self, candidate: &[Block], now: u64) -> bool {
        match validate_chain(candidate, &self.validator, now) {
            Ok(_) => true,
            Err(e) => {
                log::debug!("Candidate chain invalid: {}", e);
                false
            }
        }
    }

    /// Adopts `candidate` when it is valid from genesis and carries strictly
    /// more work. Costs a full replay of the candidate.
    pub fn replace_chain(&mut self, candidate: Vec<Block>, now: u64) -> Result<()> {
        let utxo_set = validate_chain(&candidate, &self.validator, now)
            .map_err(|e| LedgerError::ForkRejected(format!("Invalid candidate chain: {}", e)))?;

        let candidate_work = chain_work(&candidate);
        let current_work = self.total_work();
        if candidate_work <= current_work {
            return Err(LedgerError::ForkRejected(format!(
                "Candidate work {} does not exceed current work {}",
                candidate_work, current_work
            )));
        }

        log::info!(
            "Replacing chain: height {} -> {}, work {} -> {}",
            self.height(),
            candidate.len().saturating_sub(1),
            current_work,
            candidate_work
        );
        self.blocks = candidate;
        self.utxo_set = utxo_set;
        Ok(())
    }

    pub fn get_block_by_hash(&self, hash: &Hash256) -> Option<&Block> {
        self.blocks.iter().find(|block| &block.hash == hash)
    }

    /// Scans every block's transaction list.
    pub fn get_transaction(&self, id: &Hash256) -> Option<&Transaction> {
        self.blocks.iter().find_map(|block| block.find_transaction(id))
    }

    pub fn get_latest_blocks(&self, count: usize) -> Vec<Block> {
        self.blocks.iter().rev().take(count).cloned().collect()
    }

    pub fn get_chain_info(&self) -> ChainState {
        ChainState {
            tip: self.tip().hash,
            height: self.height(),
            total_work: self.total_work(),
            difficulty: self.next_difficulty(),
            utxo_count: self.utxo_set.len(),
        }
    }
}

/// Sum of `2^difficulty` over all blocks.
pub fn chain_work(blocks: &[Block]) -> u128 {
    blocks.iter().fold(0u128, |acc, block| acc.saturating_add(block.work()))
}

/// Replays `blocks` from an empty UTXO set, checking genesis, every link and
/// every block's transactions. Returns the resulting UTXO set.
pub fn validate_chain(blocks: &[Block], validator: &BlockValidator, now: u64) -> Result<UtxoSet> {
    let (genesis, rest) = blocks.split_first()
        .ok_or_else(|| LedgerError::Structural("Empty chain".to_string()))?;

    if genesis != &Blockchain::create_genesis_block(validator.params())? {
        return Err(LedgerError::Linkage("First block is not the genesis block".to_string()));
    }

    let mut utxo_set = validator.process_transactions(&genesis.transactions, &UtxoSet::new(), 0)?;
    let mut previous = genesis;

    for block in rest {
        validator.validate_block(block, previous, now)?;
        utxo_set = validator.process_transactions(&block.transactions, &utxo_set, block.index())?;
        previous = block;
    }

    Ok(utxo_set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::build_transaction;
    use crate::core::Mempool;
    use crate::crypto::keys::PrivateKey;
    use crate::mining::{Miner, MiningOutcome, TipEpoch};

    const NOW: u64 = 1_700_000_000;

    fn key(byte: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[byte; 32]).unwrap()
    }

    fn mine(mut template: Block, difficulty: Option<u32>) -> Block {
        if let Some(difficulty) = difficulty {
            template.header.difficulty = difficulty;
        }
        match Miner::default().mine(template, &TipEpoch::new().watch()) {
            MiningOutcome::Found(block) => block,
            other => panic!("mining failed: {:?}", other),
        }
    }

    fn extend(chain: &mut Blockchain, miner: &PrivateKey, pending: &[Transaction], difficulty: Option<u32>) -> Block {
        let block = mine(chain.block_template(&miner.address(), pending, NOW), difficulty);
        chain.add_block(block.clone(), NOW).unwrap();
        block
    }

    #[test]
    fn test_new_chain_starts_at_genesis() -> Result<()> {
        let chain = Blockchain::new(ConsensusParams::default())?;

        assert_eq!(chain.height(), 0);
        assert_eq!(chain.blocks()[0], Blockchain::create_genesis_block(&ConsensusParams::default())?);
        assert_eq!(chain.utxo_set().get_balance(&Address::parse(GENESIS_ADDRESS)?), 50);
        assert_eq!(chain.total_work(), 1);
        Ok(())
    }

    #[test]
    fn test_genesis_is_constant() -> Result<()> {
        let a = Blockchain::create_genesis_block(&ConsensusParams::default())?;
        let b = Blockchain::create_genesis_block(&ConsensusParams::default())?;
        assert_eq!(a, b);
        assert!(a.header.previous_hash.is_none());
        Ok(())
    }

    #[test]
    fn test_add_block_and_reject_replay() -> Result<()> {
        let mut chain = Blockchain::new(ConsensusParams::default())?;
        let miner = key(1);

        let block = extend(&mut chain, &miner, &[], None);
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.utxo_set().get_balance(&miner.address()), 50);

        // the same block no longer extends the tip
        assert!(matches!(chain.add_block(block, NOW), Err(LedgerError::Linkage(_))));
        assert_eq!(chain.height(), 1);
        Ok(())
    }

    #[test]
    fn test_rejected_block_leaves_state_untouched() -> Result<()> {
        let mut chain = Blockchain::new(ConsensusParams::default())?;
        let miner = key(1);
        let template = chain.block_template(&miner.address(), &[], NOW);

        let mut bad = mine(template, None);
        bad.transactions[0].outputs[0].amount = 5_000;
        bad.transactions[0].id = Transaction::compute_id(&bad.transactions[0].inputs, &bad.transactions[0].outputs);
        bad.hash = bad.compute_hash();

        let before = chain.utxo_set().clone();
        assert!(matches!(chain.add_block(bad, NOW), Err(LedgerError::InvalidCoinbase(_))));
        assert_eq!(chain.utxo_set(), &before);
        assert_eq!(chain.height(), 0);
        Ok(())
    }

    #[test]
    fn test_payment_flow() -> Result<()> {
        let mut chain = Blockchain::new(ConsensusParams::default())?;
        let (alice, bob) = (key(1), key(2));
        extend(&mut chain, &alice, &[], None);

        let tx = build_transaction(&bob.address(), 20, &alice, chain.utxo_set(), &Mempool::new())?;
        extend(&mut chain, &bob, &[tx.clone()], None);

        assert_eq!(chain.utxo_set().get_balance(&alice.address()), 30);
        assert_eq!(chain.utxo_set().get_balance(&bob.address()), 70);
        assert_eq!(chain.get_transaction(&tx.id), Some(&tx));
        Ok(())
    }

    #[test]
    fn test_replay_matches_incremental_state() -> Result<()> {
        let mut chain = Blockchain::new(ConsensusParams::default())?;
        let (alice, bob) = (key(1), key(2));
        extend(&mut chain, &alice, &[], None);
        let tx = build_transaction(&bob.address(), 35, &alice, chain.utxo_set(), &Mempool::new())?;
        extend(&mut chain, &alice, &[tx], None);
        extend(&mut chain, &bob, &[], None);

        let replayed = Blockchain::from_blocks(chain.blocks().to_vec(), ConsensusParams::default(), NOW)?;
        assert_eq!(replayed.utxo_set(), chain.utxo_set());
        assert!(chain.is_chain_valid(chain.blocks(), NOW));
        Ok(())
    }

    #[test]
    fn test_single_field_mutations_invalidate_chain() -> Result<()> {
        let mut chain = Blockchain::new(ConsensusParams::default())?;
        let (alice, bob) = (key(1), key(2));
        extend(&mut chain, &alice, &[], None);
        let pool = Mempool::new();
        let tx = build_transaction(&bob.address(), 10, &alice, chain.utxo_set(), &pool)?;
        extend(&mut chain, &alice, &[tx], None);
        let valid = chain.blocks().to_vec();
        assert!(chain.is_chain_valid(&valid, NOW));

        // flip one character of a hash
        let mut flipped = valid.clone();
        let mut hex = flipped[1].hash.to_hex();
        let replacement = if hex.starts_with('0') { "1" } else { "0" };
        hex.replace_range(0..1, replacement);
        flipped[1].hash = Hash256::from_hex(&hex).unwrap();
        assert!(!chain.is_chain_valid(&flipped, NOW));

        // change one amount
        let mut amount = valid.clone();
        amount[2].transactions[1].outputs[0].amount += 1;
        assert!(!chain.is_chain_valid(&amount, NOW));

        // swap two transactions
        let mut swapped = valid.clone();
        swapped[2].transactions.swap(0, 1);
        assert!(!chain.is_chain_valid(&swapped, NOW));

        // wrong genesis
        let mut genesis = valid.clone();
        genesis[0].header.timestamp += 1;
        genesis[0].hash = genesis[0].compute_hash();
        assert!(!chain.is_chain_valid(&genesis, NOW));

        assert!(!chain.is_chain_valid(&[], NOW));
        Ok(())
    }

    #[test]
    fn test_heavier_shorter_chain_wins() -> Result<()> {
        let params = ConsensusParams::default();
        let miner = key(1);

        let mut light = Blockchain::new(params)?;
        for _ in 0..4 {
            extend(&mut light, &miner, &[], Some(0));
        }
        assert_eq!(light.total_work(), 5);

        let mut heavy = Blockchain::new(params)?;
        for _ in 0..2 {
            extend(&mut heavy, &key(2), &[], Some(2));
        }
        assert_eq!(heavy.total_work(), 9);
        assert!(heavy.blocks().len() < light.blocks().len());

        light.replace_chain(heavy.blocks().to_vec(), NOW)?;
        assert_eq!(light.height(), 2);
        assert_eq!(light.utxo_set(), heavy.utxo_set());
        assert_eq!(light.utxo_set().get_balance(&miner.address()), 0);
        Ok(())
    }

    #[test]
    fn test_lighter_or_equal_chain_rejected() -> Result<()> {
        let params = ConsensusParams::default();
        let mut current = Blockchain::new(params)?;
        for _ in 0..3 {
            extend(&mut current, &key(1), &[], None);
        }

        let mut other = Blockchain::new(params)?;
        for _ in 0..3 {
            extend(&mut other, &key(2), &[], None);
        }

        let before = current.blocks().to_vec();
        assert!(matches!(
            current.replace_chain(other.blocks().to_vec(), NOW),
            Err(LedgerError::ForkRejected(_))
        ));
        assert_eq!(current.blocks(), before.as_slice());
        Ok(())
    }

    #[test]
    fn test_invalid_heavier_chain_rejected() -> Result<()> {
        let params = ConsensusParams::default();
        let mut current = Blockchain::new(params)?;
        let mut other = Blockchain::new(params)?;
        for _ in 0..3 {
            extend(&mut other, &key(2), &[], None);
        }

        let mut tampered = other.blocks().to_vec();
        tampered[2].transactions[0].outputs[0].amount = 1_000;
        assert!(matches!(current.replace_chain(tampered, NOW), Err(LedgerError::ForkRejected(_))));
        assert_eq!(current.height(), 0);
        Ok(())
    }

    #[test]
    fn test_difficulty_follows_retarget_schedule() -> Result<()> {
        let mut chain = Blockchain::new(ConsensusParams::default())?;
        for _ in 0..10 {
            extend(&mut chain, &key(1), &[], None);
        }
        // ten blocks stamped with the same second: far faster than target
        assert_eq!(chain.height(), 10);
        assert_eq!(chain.next_difficulty(), 1);
        Ok(())
    }
}
