// namechain-mining
//
// Transaction pool and block assembly. Proof-of-work search is a plain
// nonce scan; the interesting part is building a block the chain accepts.

pub mod error;
pub mod job;
pub mod miner;
pub mod pool;

pub use error::MinerError;
pub use job::{Job, COINBASE_RESERVE};
pub use miner::Miner;
pub use pool::{PoolEntry, PoolError, TxPool};
