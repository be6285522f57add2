// namechain-chain
//
// The block tree: header and contextual validation, block connection
// through the covenant engine, checkpoints, orphans, and reorganization.
// Consensus configuration arrives as an immutable `Network` value.

pub mod chain;
pub mod connect;
pub mod entry;
pub mod error;
pub mod network;
pub mod orphans;
pub mod pow;

pub use chain::{Chain, ChainEvent, ChainOptions, ConnectOutcome, TipSnapshot, BLOCK_VERSION};
pub use connect::{connect_block, verify_spend, AcceptingClaimVerifier, BlockContext, ClaimVerifier};
pub use entry::{skip_height, ChainEntry, EntryIndex};
pub use error::{ChainError, ErrorKind};
pub use network::{Network, NetworkKind, PowParams, COIN};
pub use orphans::OrphanPool;
pub use pow::{block_work, compact_to_target, meets_target, target_to_compact, within_limit};
