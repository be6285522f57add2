// namechain-state
//
// Persistent state of the node: a column-partitioned transactional store,
// overlay views that stage a block (or a whole reorganization) before one
// atomic commit, the UTXO and name sets, and per-block undo logs.

pub mod chain_state;
pub mod coins;
pub mod staging;
pub mod store;
pub mod undo;
pub mod view;

pub use chain_state::ChainState;
pub use coins::Coin;
pub use staging::{compute_tree_root, name_leaf, revert_block, StagedBlock};
pub use store::{Batch, BatchOp, Column, KvStore, MemoryStore, StateError};
pub use undo::{BlockUndo, UndoOp};
pub use view::StateView;
