// Block staging and reversal
//
// A `StagedBlock` wraps a view while one block's effects are applied. Every
// mutation goes through it so the undo log and the running chain state
// always agree with what was written.
//
// SAFETY INVARIANTS:
// 1. Each undo op is pushed before its write lands in the overlay
// 2. Unspendable outputs never enter the coin set; their value counts as burned
// 3. `revert_block` applied to a finished block restores every touched key

use crate::chain_state::ChainState;
use crate::coins::Coin;
use crate::store::StateError;
use crate::undo::{BlockUndo, UndoOp};
use crate::view::StateView;
use log::{debug, trace};
use namechain_core::{Outpoint, Output};
use namechain_covenants::NameRecord;
use namechain_crypto::{blake2b256_parts, merkle_root, Hash};

/// Leaf hash of one name in the name tree.
pub fn name_leaf(record: &NameRecord) -> Hash {
    blake2b256_parts(&[&record.name_hash, &record.commitment()])
}

/// Root over every name record in the view, ordered by name hash.
pub async fn compute_tree_root(view: &StateView) -> Result<Hash, StateError> {
    let leaves: Vec<Hash> = view.all_names().await?.iter().map(name_leaf).collect();
    Ok(merkle_root(&leaves))
}

pub struct StagedBlock<'a> {
    view: &'a mut StateView,
    undo: BlockUndo,
    state: ChainState,
}

impl<'a> StagedBlock<'a> {
    /// Starts staging on top of the view's current chain state.
    pub async fn begin(view: &'a mut StateView) -> Result<StagedBlock<'a>, StateError> {
        let prev = view.chain_state().await?;
        Ok(Self { undo: BlockUndo::new(prev.clone()), state: prev, view })
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn view(&self) -> &StateView {
        self.view
    }

    pub fn count_tx(&mut self) {
        self.state.tx_count += 1;
    }

    // ==================== COINS ====================

    pub async fn coin(&self, outpoint: &Outpoint) -> Result<Option<Coin>, StateError> {
        self.view.get_coin(outpoint).await
    }

    /// Removes a coin, returning it. Missing coins are reported as `None`.
    pub async fn spend(&mut self, outpoint: &Outpoint) -> Result<Option<Coin>, StateError> {
        let coin = match self.view.get_coin(outpoint).await? {
            Some(coin) => coin,
            None => return Ok(None),
        };
        self.undo.ops.push(UndoOp::SpendCoin(*outpoint, coin.clone()));
        self.view.del_coin(outpoint);
        self.state.utxo.remove(&coin.commitment_bytes(outpoint));
        self.state.coin_count -= 1;
        self.state.value -= coin.value();
        trace!("spent {}", outpoint);
        Ok(Some(coin))
    }

    /// Adds an output to the coin set unless it can never be spent.
    pub fn add_coin(&mut self, outpoint: Outpoint, output: &Output, height: u32, coinbase: bool) -> Result<(), StateError> {
        if output.is_unspendable() {
            self.state.burned += output.value;
            return Ok(());
        }
        let coin = Coin::new(output.clone(), height, coinbase);
        self.undo.ops.push(UndoOp::AddCoin(outpoint));
        self.view.put_coin(&outpoint, &coin)?;
        self.state.utxo.insert(&coin.commitment_bytes(&outpoint));
        self.state.coin_count += 1;
        self.state.value += coin.value();
        Ok(())
    }

    // ==================== NAMES ====================

    pub async fn name(&self, name_hash: &Hash) -> Result<Option<NameRecord>, StateError> {
        self.view.get_name(name_hash).await
    }

    pub async fn set_name(&mut self, record: &NameRecord) -> Result<(), StateError> {
        let prior = self.view.get_name(&record.name_hash).await?;
        self.undo.ops.push(UndoOp::Name(record.name_hash, prior));
        self.view.put_name(record)
    }

    // ==================== AIRDROPS ====================

    pub async fn is_airdrop_spent(&self, index: u32) -> Result<bool, StateError> {
        self.view.is_airdrop_spent(index).await
    }

    pub fn mark_airdrop(&mut self, index: u32) {
        self.undo.ops.push(UndoOp::Airdrop(index));
        self.view.mark_airdrop(index);
    }

    // ==================== FINISH ====================

    /// Recomputes and records the name-tree root.
    pub async fn commit_tree(&mut self) -> Result<Hash, StateError> {
        let root = compute_tree_root(self.view).await?;
        self.state.tree_root = root;
        debug!("name tree committed: {}", hex::encode(root));
        Ok(root)
    }

    /// Writes the undo log and the advanced chain state.
    pub fn finish(mut self, hash: Hash, height: u32) -> Result<ChainState, StateError> {
        self.state.tip = hash;
        self.state.height = height;
        self.view.put_undo(&hash, &self.undo)?;
        self.view.put_chain_state(&self.state)?;
        debug!("staged block {} at height {} ({} undo ops)", hex::encode(hash), height, self.undo.ops.len());
        Ok(self.state)
    }
}

/// Undoes the block `hash`, which must be the view's current tip.
pub async fn revert_block(view: &mut StateView, hash: &Hash) -> Result<ChainState, StateError> {
    let undo = view
        .get_undo(hash)
        .await?
        .ok_or_else(|| StateError::Missing { what: format!("undo log for {}", hex::encode(hash)) })?;

    for op in undo.ops.into_iter().rev() {
        match op {
            UndoOp::AddCoin(outpoint) => view.del_coin(&outpoint),
            UndoOp::SpendCoin(outpoint, coin) => view.put_coin(&outpoint, &coin)?,
            UndoOp::Name(name_hash, Some(record)) => {
                debug_assert_eq!(name_hash, record.name_hash);
                view.put_name(&record)?
            }
            UndoOp::Name(name_hash, None) => view.del_name(&name_hash),
            UndoOp::Airdrop(index) => view.unmark_airdrop(index),
        }
    }

    view.del_undo(hash);
    view.put_chain_state(&undo.prev_state)?;
    debug!("reverted block {} to height {}", hex::encode(hash), undo.prev_state.height);
    Ok(undo.prev_state)
}
