//! Core ledger components

pub mod blockchain;
pub mod block;
pub mod mempool;
pub mod transaction;
pub mod utxo;

pub use blockchain::{Blockchain, ChainState};
pub use block::{Block, BlockHeader};
pub use mempool::Mempool;
pub use transaction::{OutPoint, Transaction, TxInput, TxOutput};
pub use utxo::{UtxoSet, UtxoEntry};
