use crate::consensus::ConsensusParams;
use crate::core::transaction::OutPoint;
use crate::core::{Block, Transaction, UtxoSet};
use crate::{LedgerError, Result};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct BlockValidator {
    params: ConsensusParams,
}

impl BlockValidator {
    pub fn new(params: ConsensusParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Header checks of `candidate` against the block it claims to extend.
    /// The declared hash must match a recomputation and meet the declared difficulty.
    pub fn validate_block(&self, candidate: &Block, previous: &Block, now: u64) -> Result<()> {
        log::debug!("Validating block at index {}", candidate.index());

        if candidate.transactions.is_empty() {
            return Err(LedgerError::Structural("Block must contain a coinbase transaction".to_string()));
        }

        let expected_index = previous.index() + 1;
        if candidate.index() != expected_index {
            return Err(LedgerError::Linkage(format!(
                "Invalid block index: expected {}, got {}",
                expected_index,
                candidate.index()
            )));
        }

        if candidate.header.previous_hash != Some(previous.hash) {
            return Err(LedgerError::Linkage(format!(
                "Block {} does not link to tip {}",
                candidate.index(),
                previous.hash
            )));
        }

        let computed = candidate.compute_hash();
        if computed != candidate.hash {
            return Err(LedgerError::Structural(format!(
                "Declared hash {} does not match computed {}",
                candidate.hash, computed
            )));
        }

        if !candidate.has_valid_proof_of_work() {
            return Err(LedgerError::ProofOfWork {
                hash: candidate.hash.to_hex(),
                difficulty: candidate.header.difficulty,
            });
        }

        self.validate_timestamp(candidate, previous, now)
    }

    /// `previous - tolerance < candidate` and `candidate - tolerance < now`.
    pub fn validate_timestamp(&self, candidate: &Block, previous: &Block, now: u64) -> Result<()> {
        let tolerance = self.params.timestamp_tolerance;
        let timestamp = candidate.header.timestamp;

        if previous.header.timestamp >= timestamp.saturating_add(tolerance) {
            return Err(LedgerError::Timestamp(format!(
                "Block timestamp {} is too far behind its predecessor {}",
                timestamp, previous.header.timestamp
            )));
        }

        if timestamp >= now.saturating_add(tolerance) {
            return Err(LedgerError::Timestamp(format!(
                "Block timestamp {} is too far in the future (now {})",
                timestamp, now
            )));
        }

        Ok(())
    }

    pub fn is_timestamp_valid(&self, candidate: &Block, previous: &Block, now: u64) -> bool {
        self.validate_timestamp(candidate, previous, now).is_ok()
    }

    pub fn is_block_valid(&self, candidate: &Block, previous: &Block, now: u64) -> bool {
        match self.validate_block(candidate, previous, now) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Block {} rejected: {}", candidate.index(), e);
                false
            }
        }
    }

    /// Coinbase first, no output referenced twice anywhere in the list, and
    /// every other transaction valid against `utxo_set` as it stood before the block.
    pub fn validate_block_transactions(
        &self,
        txs: &[Transaction],
        utxo_set: &UtxoSet,
        block_index: u64,
    ) -> Result<()> {
        let (coinbase, rest) = txs.split_first()
            .ok_or_else(|| LedgerError::Structural("Empty transaction list".to_string()))?;

        coinbase.validate_coinbase(block_index, self.params.coinbase_amount)?;

        let mut seen: HashSet<OutPoint> = HashSet::new();
        for input in txs.iter().flat_map(|tx| tx.inputs.iter()) {
            if !seen.insert(input.previous_output) {
                return Err(LedgerError::DuplicateSpend(input.previous_output.to_string()));
            }
        }

        for tx in rest {
            tx.validate(utxo_set)?;
        }

        Ok(())
    }

    /// Validates `txs` and returns the UTXO set after applying them. On any
    /// failure `utxo_set` is left as it was.
    pub fn process_transactions(
        &self,
        txs: &[Transaction],
        utxo_set: &UtxoSet,
        block_index: u64,
    ) -> Result<UtxoSet> {
        self.validate_block_transactions(txs, utxo_set, block_index)?;
        Ok(utxo_set.apply_transactions(txs))
    }
}
