// Transactional key-value store
//
// SAFETY INVARIANTS:
// 1. `commit` applies a batch entirely or not at all
// 2. Readers never observe a partially applied batch
// 3. Keys are partitioned by column; scans never cross columns

use async_trait::async_trait;
use log::{debug, error};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("store backend failure: {0}")]
    Backend(String),

    #[error("corrupt {column:?} entry: {reason}")]
    Corrupt { column: Column, reason: String },

    #[error("missing {what}")]
    Missing { what: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

/// Logical partitions of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Column {
    /// Chain-state record
    Meta,
    /// Block hash -> chain entry
    Entry,
    /// Block hash -> encoded block
    Block,
    /// Block hash -> undo log
    Undo,
    /// Main-chain height -> block hash
    Height,
    /// Outpoint -> coin
    Coin,
    /// Name hash -> name record
    Name,
    /// Airdrop index -> spent marker
    Airdrop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { column: Column, key: Vec<u8>, value: Vec<u8> },
    Del { column: Column, key: Vec<u8> },
}

/// Ordered set of writes committed atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column: Column, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put { column, key: key.into(), value: value.into() });
    }

    pub fn del(&mut self, column: Column, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Del { column, key: key.into() });
    }

    pub fn extend(&mut self, other: Batch) {
        self.ops.extend(other.ops);
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Abstract transactional store consumed by the chain.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StateError>;

    /// All pairs in `column` whose key starts with `prefix`, in key order.
    async fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError>;

    async fn commit(&self, batch: Batch) -> Result<(), StateError>;

    async fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StateError> {
        let mut batch = Batch::new();
        batch.put(column, key, value);
        self.commit(batch).await
    }

    async fn del(&self, column: Column, key: &[u8]) -> Result<(), StateError> {
        let mut batch = Batch::new();
        batch.del(column, key);
        self.commit(batch).await
    }
}

/// In-memory store. Each commit is applied under a single write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<(Column, Vec<u8>), Vec<u8>>>,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail without applying anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Copy of every pair in `column`, for equality checks between stores.
    pub fn dump(&self, column: Column) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.data
            .read()
            .iter()
            .filter(|((c, _), _)| *c == column)
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self.data.read().get(&(column, key.to_vec())).cloned())
    }

    async fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError> {
        let data = self.data.read();
        Ok(data
            .range((column, prefix.to_vec())..)
            .take_while(|((c, k), _)| *c == column && k.starts_with(prefix))
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn commit(&self, batch: Batch) -> Result<(), StateError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            error!("Injected store failure, dropping batch of {} ops", batch.len());
            return Err(StateError::Backend("injected commit failure".into()));
        }
        let mut data = self.data.write();
        for op in batch.ops {
            match op {
                BatchOp::Put { column, key, value } => {
                    data.insert((column, key), value);
                }
                BatchOp::Del { column, key } => {
                    data.remove(&(column, key));
                }
            }
        }
        debug!("Committed batch, store holds {} keys", data.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn batch_is_atomic_and_ordered() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        batch.put(Column::Coin, b"a".to_vec(), b"1".to_vec());
        batch.put(Column::Coin, b"b".to_vec(), b"2".to_vec());
        batch.del(Column::Coin, b"a".to_vec());
        store.commit(batch).await.unwrap();
        assert_eq!(store.get(Column::Coin, b"a").await.unwrap(), None);
        assert_eq!(store.get(Column::Coin, b"b").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn failed_commit_leaves_store_untouched() {
        let store = MemoryStore::new();
        store.put(Column::Name, b"x", b"old").await.unwrap();
        store.fail_next_commit();
        let mut batch = Batch::new();
        batch.put(Column::Name, b"x".to_vec(), b"new".to_vec());
        batch.put(Column::Name, b"y".to_vec(), b"new".to_vec());
        assert!(store.commit(batch).await.is_err());
        assert_eq!(store.get(Column::Name, b"x").await.unwrap(), Some(b"old".to_vec()));
        assert_eq!(store.get(Column::Name, b"y").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scans_stay_within_column_and_prefix() {
        let store = MemoryStore::new();
        store.put(Column::Coin, b"ab1", b"1").await.unwrap();
        store.put(Column::Coin, b"ab2", b"2").await.unwrap();
        store.put(Column::Coin, b"ac", b"3").await.unwrap();
        store.put(Column::Name, b"ab3", b"4").await.unwrap();
        let found = store.scan_prefix(Column::Coin, b"ab").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, b"ab1".to_vec());
    }
}
