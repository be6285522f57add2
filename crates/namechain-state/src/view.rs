// Overlay view
//
// Reads fall through to the store unless the overlay holds a newer value;
// writes only touch the overlay. `into_batch` turns the overlay into one
// atomic store commit. Dropping a view discards every staged write, which is
// how a failed block or a failed reorg leaves the store untouched.

use crate::chain_state::ChainState;
use crate::coins::Coin;
use crate::store::{Batch, Column, KvStore, StateError};
use crate::undo::BlockUndo;
use namechain_core::Outpoint;
use namechain_covenants::NameRecord;
use namechain_crypto::Hash;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

const CHAIN_STATE_KEY: &[u8] = b"chain-state";

pub struct StateView {
    store: Arc<dyn KvStore>,
    overlay: BTreeMap<(Column, Vec<u8>), Option<Vec<u8>>>,
}

impl StateView {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store, overlay: BTreeMap::new() }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub async fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        match self.overlay.get(&(column, key.to_vec())) {
            Some(staged) => Ok(staged.clone()),
            None => self.store.get(column, key).await,
        }
    }

    pub fn put(&mut self, column: Column, key: impl Into<Vec<u8>>, value: Vec<u8>) {
        self.overlay.insert((column, key.into()), Some(value));
    }

    pub fn del(&mut self, column: Column, key: impl Into<Vec<u8>>) {
        self.overlay.insert((column, key.into()), None);
    }

    /// Store scan merged with staged writes, in key order.
    pub async fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self.store.scan_prefix(column, prefix).await?.into_iter().collect();
        for ((c, key), staged) in self.overlay.range((column, prefix.to_vec())..) {
            if *c != column || !key.starts_with(prefix) {
                break;
            }
            match staged {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    pub fn staged_len(&self) -> usize {
        self.overlay.len()
    }

    pub fn into_batch(self) -> Batch {
        let mut batch = Batch::new();
        for ((column, key), staged) in self.overlay {
            match staged {
                Some(value) => batch.put(column, key, value),
                None => batch.del(column, key),
            }
        }
        batch
    }

    pub async fn get_typed<T: DeserializeOwned>(&self, column: Column, key: &[u8]) -> Result<Option<T>, StateError> {
        match self.get(column, key).await? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StateError::Corrupt { column, reason: e.to_string() }),
            None => Ok(None),
        }
    }

    pub fn put_typed<T: Serialize>(&mut self, column: Column, key: impl Into<Vec<u8>>, value: &T) -> Result<(), StateError> {
        let bytes = bincode::serialize(value)?;
        self.put(column, key, bytes);
        Ok(())
    }

    // ==================== COINS ====================

    pub async fn get_coin(&self, outpoint: &Outpoint) -> Result<Option<Coin>, StateError> {
        self.get_typed(Column::Coin, &outpoint.to_key()).await
    }

    pub fn put_coin(&mut self, outpoint: &Outpoint, coin: &Coin) -> Result<(), StateError> {
        self.put_typed(Column::Coin, outpoint.to_key().to_vec(), coin)
    }

    pub fn del_coin(&mut self, outpoint: &Outpoint) {
        self.del(Column::Coin, outpoint.to_key().to_vec());
    }

    // ==================== NAMES ====================

    pub async fn get_name(&self, name_hash: &Hash) -> Result<Option<NameRecord>, StateError> {
        self.get_typed(Column::Name, name_hash).await
    }

    pub fn put_name(&mut self, record: &NameRecord) -> Result<(), StateError> {
        self.put_typed(Column::Name, record.name_hash.to_vec(), record)
    }

    pub fn del_name(&mut self, name_hash: &Hash) {
        self.del(Column::Name, name_hash.to_vec());
    }

    /// Every name record, ordered by name hash.
    pub async fn all_names(&self) -> Result<Vec<NameRecord>, StateError> {
        self.scan_prefix(Column::Name, &[])
            .await?
            .into_iter()
            .map(|(_, bytes)| {
                bincode::deserialize(&bytes).map_err(|e| StateError::Corrupt { column: Column::Name, reason: e.to_string() })
            })
            .collect()
    }

    // ==================== AIRDROPS ====================

    pub async fn is_airdrop_spent(&self, index: u32) -> Result<bool, StateError> {
        Ok(self.get(Column::Airdrop, &index.to_be_bytes()).await?.is_some())
    }

    pub fn mark_airdrop(&mut self, index: u32) {
        self.put(Column::Airdrop, index.to_be_bytes().to_vec(), vec![1]);
    }

    pub fn unmark_airdrop(&mut self, index: u32) {
        self.del(Column::Airdrop, index.to_be_bytes().to_vec());
    }

    /// Spent airdrop positions as a little-endian bitfield.
    pub async fn airdrop_field(&self) -> Result<Vec<u8>, StateError> {
        let mut field = Vec::new();
        for (key, _) in self.scan_prefix(Column::Airdrop, &[]).await? {
            let index: [u8; 4] = key.as_slice().try_into().map_err(|_| StateError::Corrupt {
                column: Column::Airdrop,
                reason: format!("key of {} bytes", key.len()),
            })?;
            let index = u32::from_be_bytes(index) as usize;
            if field.len() <= index / 8 {
                field.resize(index / 8 + 1, 0);
            }
            field[index / 8] |= 1 << (index % 8);
        }
        Ok(field)
    }

    // ==================== CHAIN STATE & UNDO ====================

    pub async fn chain_state(&self) -> Result<ChainState, StateError> {
        self.get_typed(Column::Meta, CHAIN_STATE_KEY)
            .await?
            .ok_or_else(|| StateError::Missing { what: "chain state".into() })
    }

    pub fn put_chain_state(&mut self, state: &ChainState) -> Result<(), StateError> {
        self.put_typed(Column::Meta, CHAIN_STATE_KEY.to_vec(), state)
    }

    pub async fn get_undo(&self, block: &Hash) -> Result<Option<BlockUndo>, StateError> {
        self.get_typed(Column::Undo, block).await
    }

    pub fn put_undo(&mut self, block: &Hash, undo: &BlockUndo) -> Result<(), StateError> {
        self.put_typed(Column::Undo, block.to_vec(), undo)
    }

    pub fn del_undo(&mut self, block: &Hash) {
        self.del(Column::Undo, block.to_vec());
    }
}
