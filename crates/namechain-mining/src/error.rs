use crate::pool::PoolError;
use namechain_chain::ChainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MinerError {
    #[error("pool: {0}")]
    Pool(#[from] PoolError),

    #[error("chain: {0}")]
    Chain(#[from] ChainError),

    #[error("job weight {weight} exceeds limit {limit}")]
    TooHeavy { weight: u64, limit: u64 },

    #[error("coinbase transactions cannot be pushed")]
    Coinbase,

    #[error("transaction {0} already in job")]
    DuplicateTx(String),

    #[error("claim for {0} already in job")]
    DuplicateClaim(String),

    #[error("airdrop {0} already in job")]
    DuplicateAirdrop(u32),

    #[error("tx {txid} input {index} spends an unknown coin")]
    MissingInput { txid: String, index: usize },

    #[error("tx {txid} spends more than its inputs")]
    Overspend { txid: String },

    #[error("nonce space exhausted")]
    Exhausted,

    #[error("mining worker failed: {0}")]
    Worker(String),
}
