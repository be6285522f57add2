// Chain state record
//
// Exactly one authoritative instance per chain, rewritten with every block
// connect or disconnect. Checkpoint sync and full sync must arrive at
// byte-identical values.

use namechain_crypto::{blake2b256, Hash, SetCommitment, ZERO_HASH};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    /// Active tip hash
    pub tip: Hash,
    pub height: u32,
    pub tx_count: u64,
    pub coin_count: u64,
    /// Value held in unspent coins
    pub value: u64,
    /// Value sent to unspendable outputs
    pub burned: u64,
    /// Multiset commitment over the UTXO set
    pub utxo: SetCommitment,
    /// Name-tree root committed at the last tree interval
    pub tree_root: Hash,
}

impl ChainState {
    pub fn genesis(tip: Hash) -> Self {
        Self {
            tip,
            height: 0,
            tx_count: 0,
            coin_count: 0,
            value: 0,
            burned: 0,
            utxo: SetCommitment::new(),
            tree_root: ZERO_HASH,
        }
    }

    pub fn utxo_root(&self) -> Hash {
        self.utxo.root()
    }

    /// Digest over every field, for cross-node comparison.
    pub fn digest(&self) -> Hash {
        match bincode::serialize(self) {
            Ok(bytes) => blake2b256(&bytes),
            Err(_) => ZERO_HASH,
        }
    }
}
