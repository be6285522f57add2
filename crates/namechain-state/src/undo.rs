// Block undo log
//
// Every mutation a block makes is logged in application order. Reverting
// replays the log backwards, then restores the prior chain state wholesale,
// so connect followed by disconnect is an exact no-op.

use crate::chain_state::ChainState;
use crate::coins::Coin;
use namechain_core::Outpoint;
use namechain_covenants::NameRecord;
use namechain_crypto::Hash;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UndoOp {
    /// A coin was created; reverting deletes it
    AddCoin(Outpoint),
    /// A coin was spent; reverting restores it
    SpendCoin(Outpoint, Coin),
    /// A name record was written; reverting restores the prior value
    Name(Hash, Option<NameRecord>),
    /// An airdrop index was marked spent
    Airdrop(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUndo {
    pub ops: Vec<UndoOp>,
    pub prev_state: ChainState,
}

impl BlockUndo {
    pub fn new(prev_state: ChainState) -> Self {
        Self { ops: Vec::new(), prev_state }
    }
}
