use crate::core::transaction::{OutPoint, Transaction};
use crate::crypto::hash::Hash256;
use crate::crypto::keys::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub txid: Hash256,
    pub vout: u64,
    pub address: Address,
    pub amount: u64,
}

impl UtxoEntry {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

/// Unspent outputs keyed by `(txid, vout)`. Iteration order is the key order,
/// which keeps coin selection deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    entries: BTreeMap<OutPoint, UtxoEntry>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = UtxoEntry>) -> Self {
        let mut set = Self::new();
        for entry in entries {
            set.insert(entry);
        }
        set
    }

    pub fn insert(&mut self, entry: UtxoEntry) {
        self.entries.insert(entry.outpoint(), entry);
    }

    pub fn find_utxo(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.entries.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub fn get_balance(&self, address: &Address) -> u64 {
        self.utxos_for(address).map(|utxo| utxo.amount).sum()
    }

    pub fn utxos_for<'a>(&'a self, address: &'a Address) -> impl Iterator<Item = &'a UtxoEntry> + 'a {
        self.entries.values().filter(move |utxo| &utxo.address == address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UtxoEntry> {
        self.entries.values()
    }

    pub fn snapshot(&self) -> Vec<UtxoEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the set that results from committing `txs`: every consumed
    /// reference removed, one entry added per output. `self` is untouched.
    /// Callers validate `txs` first.
    pub fn apply_transactions(&self, txs: &[Transaction]) -> UtxoSet {
        let mut next = self.clone();

        for tx in txs {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    next.entries.remove(&input.previous_output);
                }
            }
        }

        for tx in txs {
            for (vout, output) in tx.outputs.iter().enumerate() {
                next.insert(UtxoEntry {
                    txid: tx.id,
                    vout: vout as u64,
                    address: output.address.clone(),
                    amount: output.amount,
                });
            }
        }

        next
    }
}
