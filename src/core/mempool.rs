use crate::core::transaction::{OutPoint, Transaction};
use crate::core::utxo::UtxoSet;
use crate::crypto::hash::Hash256;
use crate::{LedgerError, Result};
use std::collections::HashSet;

/// Validated transactions waiting for a block. No two pooled transactions
/// reference the same output.
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    transactions: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn contains(&self, id: &Hash256) -> bool {
        self.transactions.iter().any(|tx| &tx.id == id)
    }

    /// Every output referenced by a pooled transaction.
    pub fn spent_outpoints(&self) -> HashSet<OutPoint> {
        self.transactions.iter()
            .flat_map(|tx| tx.inputs.iter().map(|input| input.previous_output))
            .collect()
    }

    /// Fails with `PoolConflict` when any input of `tx` is already claimed in the pool.
    pub fn check_eligible(&self, tx: &Transaction) -> Result<()> {
        let pooled = self.spent_outpoints();
        match tx.inputs.iter().find(|input| pooled.contains(&input.previous_output)) {
            Some(input) => Err(LedgerError::PoolConflict(input.previous_output.to_string())),
            None => Ok(()),
        }
    }

    pub fn is_eligible(&self, tx: &Transaction) -> bool {
        self.check_eligible(tx).is_ok()
    }

    pub fn add(&mut self, tx: Transaction, utxo_set: &UtxoSet) -> Result<()> {
        tx.validate(utxo_set)?;
        self.check_eligible(&tx)?;

        log::debug!("Transaction {} added to mempool", tx.id);
        self.transactions.push(tx);
        Ok(())
    }

    /// Drops every transaction that references an output missing from
    /// `utxo_set`. Returns how many were dropped.
    pub fn reconcile(&mut self, utxo_set: &UtxoSet) -> usize {
        let before = self.transactions.len();
        self.transactions.retain(|tx| {
            tx.inputs.iter().all(|input| utxo_set.contains(&input.previous_output))
        });

        let dropped = before - self.transactions.len();
        if dropped > 0 {
            log::debug!("Dropped {} stale transactions from mempool", dropped);
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::build_transaction;
    use crate::core::utxo::UtxoEntry;
    use crate::crypto::keys::PrivateKey;

    fn key(byte: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[byte; 32]).unwrap()
    }

    fn funded(owner: &PrivateKey, tags: &[&str]) -> UtxoSet {
        UtxoSet::from_entries(tags.iter().map(|tag| UtxoEntry {
            txid: Hash256::hash(tag.as_bytes()),
            vout: 0,
            address: owner.address(),
            amount: 10,
        }))
    }

    #[test]
    fn test_add_valid_transaction() -> Result<()> {
        let sender = key(1);
        let set = funded(&sender, &["a"]);
        let mut pool = Mempool::new();

        let tx = build_transaction(&key(2).address(), 10, &sender, &set, &pool)?;
        pool.add(tx.clone(), &set)?;

        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&tx.id));
        Ok(())
    }

    #[test]
    fn test_reject_conflicting_transaction() -> Result<()> {
        let sender = key(1);
        let set = funded(&sender, &["a"]);
        let mut pool = Mempool::new();

        let first = build_transaction(&key(2).address(), 10, &sender, &set, &pool)?;
        let second = build_transaction(&key(3).address(), 10, &sender, &set, &pool)?;
        pool.add(first, &set)?;

        assert!(!pool.is_eligible(&second));
        assert!(matches!(pool.add(second, &set), Err(LedgerError::PoolConflict(_))));
        assert_eq!(pool.len(), 1);
        Ok(())
    }

    #[test]
    fn test_reject_invalid_transaction() -> Result<()> {
        let sender = key(1);
        let set = funded(&sender, &["a"]);
        let mut pool = Mempool::new();

        let mut tx = build_transaction(&key(2).address(), 10, &sender, &set, &pool)?;
        tx.inputs[0].signature = key(9).sign(&tx.id);

        assert!(matches!(pool.add(tx, &set), Err(LedgerError::Signature(_))));
        assert!(pool.is_empty());
        Ok(())
    }

    #[test]
    fn test_reconcile_drops_spent() -> Result<()> {
        let sender = key(1);
        let set = funded(&sender, &["a", "b"]);
        let mut pool = Mempool::new();

        let tx = build_transaction(&key(2).address(), 10, &sender, &set, &pool)?;
        pool.add(tx.clone(), &set)?;

        let kept = build_transaction(&key(2).address(), 10, &sender, &set, &pool)?;
        pool.add(kept.clone(), &set)?;

        // confirming `tx` elsewhere consumes its input
        let next = set.apply_transactions(&[tx]);
        assert_eq!(pool.reconcile(&next), 1);
        assert_eq!(pool.transactions(), &[kept]);
        Ok(())
    }
}
