use crate::core::Transaction;
use crate::crypto::hash::Hash256;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: Hash256,
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub index: u64,
    /// `None` only for genesis.
    pub previous_hash: Option<Hash256>,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Required leading zero bits of `hash`.
    pub difficulty: u32,
    pub nonce: u64,
}

impl Block {
    /// Unmined block with nonce 0 and its hash filled in.
    pub fn new(
        index: u64,
        previous_hash: Option<Hash256>,
        timestamp: u64,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> Self {
        let header = BlockHeader {
            index,
            previous_hash,
            timestamp,
            difficulty,
            nonce: 0,
        };
        let hash = calculate_hash(&header, &transactions_data(&transactions));

        Self { hash, header, transactions }
    }

    pub fn index(&self) -> u64 {
        self.header.index
    }

    pub fn compute_hash(&self) -> Hash256 {
        calculate_hash(&self.header, &transactions_data(&self.transactions))
    }

    pub fn has_valid_proof_of_work(&self) -> bool {
        self.hash.meets_difficulty(self.header.difficulty)
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn find_transaction(&self, id: &Hash256) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| &tx.id == id)
    }

    /// `2^difficulty`, saturating.
    pub fn work(&self) -> u128 {
        1u128.checked_shl(self.header.difficulty).unwrap_or(u128::MAX)
    }
}

/// Canonical encoding of a transaction list as covered by the block hash.
pub fn transactions_data(transactions: &[Transaction]) -> String {
    let mut data = String::new();
    for tx in transactions {
        tx.write_block_data(&mut data);
    }
    data
}

/// SHA-256 over index, previous hash (empty for genesis), timestamp, the
/// encoded transactions, difficulty and nonce, in that order.
pub fn calculate_hash(header: &BlockHeader, transactions_data: &str) -> Hash256 {
    let mut data = String::with_capacity(transactions_data.len() + 128);
    let _ = write!(data, "{}", header.index);
    if let Some(previous) = &header.previous_hash {
        data.push_str(&previous.to_hex());
    }
    let _ = write!(data, "{}", header.timestamp);
    data.push_str(transactions_data);
    let _ = write!(data, "{}{}", header.difficulty, header.nonce);

    Hash256::hash(data.as_bytes())
}
