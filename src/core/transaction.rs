use crate::core::mempool::Mempool;
use crate::core::utxo::UtxoSet;
use crate::crypto::hash::Hash256;
use crate::crypto::keys::{Address, PrivateKey};
use crate::crypto::signatures::Signature;
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Hash256,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub previous_output: OutPoint,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub amount: u64,
}

/// Reference to an output of an earlier transaction. A zero `txid` is the
/// null reference used by coinbase inputs, whose `vout` carries the block index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u64,
}

impl OutPoint {
    pub fn new(txid: Hash256, vout: u64) -> Self {
        Self { txid, vout }
    }

    pub fn coinbase(block_index: u64) -> Self {
        Self { txid: Hash256::zero(), vout: block_index }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero()
    }

    fn write_reference(&self, data: &mut String) {
        if !self.is_null() {
            data.push_str(&self.txid.to_hex());
        }
        let _ = write!(data, "{}", self.vout);
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl TxInput {
    pub fn unsigned(previous_output: OutPoint) -> Self {
        Self { previous_output, signature: Signature::empty() }
    }
}

impl TxOutput {
    pub fn new(address: Address, amount: u64) -> Self {
        Self { address, amount }
    }
}

impl Transaction {
    /// Builds a transaction with its id computed from `inputs` and `outputs`.
    /// Input signatures are not covered by the id.
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let id = Self::compute_id(&inputs, &outputs);
        Self { id, inputs, outputs }
    }

    pub fn new_coinbase(address: Address, block_index: u64, amount: u64) -> Self {
        Self::new(
            vec![TxInput::unsigned(OutPoint::coinbase(block_index))],
            vec![TxOutput::new(address, amount)],
        )
    }

    /// SHA-256 over every input reference (txid hex, empty for the null
    /// reference, then the decimal index) followed by every output (address
    /// then decimal amount).
    pub fn compute_id(inputs: &[TxInput], outputs: &[TxOutput]) -> Hash256 {
        let mut data = String::new();
        for input in inputs {
            input.previous_output.write_reference(&mut data);
        }
        for output in outputs {
            data.push_str(output.address.as_str());
            let _ = write!(data, "{}", output.amount);
        }
        Hash256::hash(data.as_bytes())
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    pub fn total_output_value(&self) -> Result<u64> {
        self.outputs.iter().try_fold(0u64, |acc, output| {
            acc.checked_add(output.amount)
                .ok_or_else(|| LedgerError::Structural("Output amounts overflow".to_string()))
        })
    }

    /// Appends the fields covered by the enclosing block's hash.
    pub(crate) fn write_block_data(&self, data: &mut String) {
        data.push_str(&self.id.to_hex());
        for input in &self.inputs {
            input.previous_output.write_reference(data);
            data.push_str(&input.signature.to_hex());
        }
        for output in &self.outputs {
            data.push_str(output.address.as_str());
            let _ = write!(data, "{}", output.amount);
        }
    }

    /// Signs input `index` over the transaction id. The key must own the
    /// referenced output.
    pub fn sign_input(&mut self, index: usize, private_key: &PrivateKey, utxo_set: &UtxoSet) -> Result<()> {
        let input = self.inputs.get(index)
            .ok_or_else(|| LedgerError::InvalidInput(format!("Input {} out of range", index)))?;

        let utxo = utxo_set.find_utxo(&input.previous_output)
            .ok_or_else(|| LedgerError::UnknownOutput(input.previous_output.to_string()))?;

        if utxo.address != private_key.address() {
            return Err(LedgerError::Signature(format!(
                "Key does not own output {}",
                input.previous_output
            )));
        }

        let signature = private_key.sign(&self.id);
        self.inputs[index].signature = signature;
        Ok(())
    }

    /// Shape checks: non-empty inputs and outputs, well formed addresses,
    /// and no coinbase-style null references in an ordinary transaction.
    pub fn validate_structure(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(LedgerError::Structural("Transaction has no inputs".to_string()));
        }

        if self.outputs.is_empty() {
            return Err(LedgerError::Structural("Transaction has no outputs".to_string()));
        }

        for output in &self.outputs {
            if !crate::crypto::keys::is_valid_address(output.address.as_str()) {
                return Err(LedgerError::Structural(format!("Invalid address: {}", output.address)));
            }
        }

        if self.inputs.iter().any(|input| input.previous_output.is_null()) {
            return Err(LedgerError::Structural("Null input reference outside coinbase".to_string()));
        }

        Ok(())
    }

    fn validate_id(&self) -> Result<()> {
        let computed = Self::compute_id(&self.inputs, &self.outputs);
        if computed != self.id {
            return Err(LedgerError::TxIdMismatch {
                declared: self.id.to_hex(),
                computed: computed.to_hex(),
            });
        }
        Ok(())
    }

    /// Full validation of an ordinary transaction against `utxo_set`.
    pub fn validate(&self, utxo_set: &UtxoSet) -> Result<()> {
        self.validate_structure()?;
        self.validate_id()?;

        let mut seen = HashSet::new();
        let mut total_input_value = 0u64;

        for input in &self.inputs {
            let outpoint = &input.previous_output;

            if !seen.insert(*outpoint) {
                return Err(LedgerError::DuplicateSpend(outpoint.to_string()));
            }

            let utxo = utxo_set.find_utxo(outpoint)
                .ok_or_else(|| LedgerError::UnknownOutput(outpoint.to_string()))?;

            input.signature.verify(&utxo.address, &self.id)?;

            total_input_value = total_input_value.checked_add(utxo.amount)
                .ok_or_else(|| LedgerError::Structural("Input amounts overflow".to_string()))?;
        }

        let total_output_value = self.total_output_value()?;
        if total_input_value != total_output_value {
            return Err(LedgerError::BalanceMismatch {
                inputs: total_input_value,
                outputs: total_output_value,
            });
        }

        Ok(())
    }

    /// Coinbase rules: one null input carrying `block_index`, no signature,
    /// and one output of exactly `reward`.
    pub fn validate_coinbase(&self, block_index: u64, reward: u64) -> Result<()> {
        self.validate_id()?;

        if self.inputs.len() != 1 {
            return Err(LedgerError::InvalidCoinbase(format!(
                "Expected one input, found {}",
                self.inputs.len()
            )));
        }

        let input = &self.inputs[0];
        if !input.previous_output.is_null() || !input.signature.is_empty() {
            return Err(LedgerError::InvalidCoinbase("Input must be an empty reference".to_string()));
        }

        if input.previous_output.vout != block_index {
            return Err(LedgerError::InvalidCoinbase(format!(
                "Input index {} does not match block index {}",
                input.previous_output.vout, block_index
            )));
        }

        if self.outputs.len() != 1 {
            return Err(LedgerError::InvalidCoinbase(format!(
                "Expected one output, found {}",
                self.outputs.len()
            )));
        }

        if self.outputs[0].amount != reward {
            return Err(LedgerError::InvalidCoinbase(format!(
                "Reward {} is not {}",
                self.outputs[0].amount, reward
            )));
        }

        Ok(())
    }
}

/// Builds signed payments from one key's spendable outputs.
#[derive(Debug)]
pub struct TransactionBuilder<'a> {
    private_key: &'a PrivateKey,
    utxo_set: &'a UtxoSet,
    mempool: &'a Mempool,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(private_key: &'a PrivateKey, utxo_set: &'a UtxoSet, mempool: &'a Mempool) -> Self {
        Self { private_key, utxo_set, mempool }
    }

    /// Greedily selects the sender's outputs not already spent by a pooled
    /// transaction, in UTXO set order, until `amount` is covered. Any excess
    /// returns to the sender as a change output.
    pub fn build(&self, receiver: &Address, amount: u64) -> Result<Transaction> {
        if amount == 0 {
            return Err(LedgerError::InvalidInput("Amount must be positive".to_string()));
        }

        let sender = self.private_key.address();
        let pooled = self.mempool.spent_outpoints();

        let mut selected = Vec::new();
        let mut accumulated = 0u64;

        for utxo in self.utxo_set.utxos_for(&sender) {
            if pooled.contains(&utxo.outpoint()) {
                continue;
            }
            selected.push(utxo.outpoint());
            accumulated = accumulated.saturating_add(utxo.amount);
            if accumulated >= amount {
                break;
            }
        }

        if accumulated < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let inputs = selected.into_iter().map(TxInput::unsigned).collect();

        let mut outputs = vec![TxOutput::new(receiver.clone(), amount)];
        let change = accumulated - amount;
        if change > 0 {
            outputs.push(TxOutput::new(sender, change));
        }

        // The id covers references only, so signing happens once it is fixed.
        let mut tx = Transaction::new(inputs, outputs);
        for index in 0..tx.inputs.len() {
            tx.sign_input(index, self.private_key, self.utxo_set)?;
        }

        Ok(tx)
    }
}

/// `buildTransaction(receiverAddress, amount, privateKey, utxoSet, mempool)`.
pub fn build_transaction(
    receiver: &Address,
    amount: u64,
    private_key: &PrivateKey,
    utxo_set: &UtxoSet,
    mempool: &Mempool,
) -> Result<Transaction> {
    TransactionBuilder::new(private_key, utxo_set, mempool).build(receiver, amount)
}
