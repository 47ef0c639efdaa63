use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Linkage error: {0}")]
    Linkage(String),

    #[error("Proof of work error: hash {hash} does not meet difficulty {difficulty}")]
    ProofOfWork { hash: String, difficulty: u32 },

    #[error("Timestamp error: {0}")]
    Timestamp(String),

    #[error("Signature error: {0}")]
    Signature(String),

    #[error("Balance mismatch: inputs {inputs}, outputs {outputs}")]
    BalanceMismatch { inputs: u64, outputs: u64 },

    #[error("Duplicate spend of output {0}")]
    DuplicateSpend(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Fork rejected: {0}")]
    ForkRejected(String),

    #[error("Transaction id mismatch: declared {declared}, computed {computed}")]
    TxIdMismatch { declared: String, computed: String },

    #[error("Referenced output not found: {0}")]
    UnknownOutput(String),

    #[error("Invalid coinbase: {0}")]
    InvalidCoinbase(String),

    #[error("Transaction conflicts with pooled input {0}")]
    PoolConflict(String),

    #[error("Mining interrupted at nonce {0}")]
    MiningInterrupted(u64),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LedgerError {
    /// True for rejections caused by the submitted data rather than by the node itself.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            LedgerError::Storage(_)
                | LedgerError::Database(_)
                | LedgerError::Io(_)
                | LedgerError::Serialization(_)
        )
    }
}
