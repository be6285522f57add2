//! Core data structures for the namechain full node.
//!
//! Everything here is plain data plus the consensus wire encoding; no chain
//! state is consulted. Chain-level rules live in `namechain-chain`, name
//! rules in `namechain-covenants`.

pub mod airdrop;
pub mod block;
pub mod block_validation;
pub mod claim;
pub mod covenant;
pub mod encoding;
pub mod transaction;
pub mod types;

pub use airdrop::{airdrop_leaf, AirdropProof};
pub use block::{Block, BlockHeader};
pub use block_validation::{check_block_sanity, check_transaction_sanity, BlockError, TxError};
pub use claim::Claim;
pub use covenant::{Covenant, CovenantKind};
pub use encoding::{CodecError, Decodable, Encodable, Reader, Writer};
pub use namechain_crypto::{Hash, ZERO_HASH};
pub use transaction::{Input, Output, Transaction, MAX_MONEY};
pub use types::{Address, Outpoint};
