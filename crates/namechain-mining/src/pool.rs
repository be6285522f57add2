// Transaction pool
//
// Holds unconfirmed transactions ordered by fee rate. The pool guarantees
// structural sanity and the absence of in-pool double spends; the chain
// remains the authority on everything else.
//
// SAFETY INVARIANTS:
// 1. No two pooled transactions spend the same outpoint
// 2. The pool never grows beyond `max_size`
// 3. Selection never places a transaction before an in-pool parent

use log::{debug, warn};
use namechain_core::{check_transaction_sanity, Block, Outpoint, Output, Transaction, TxError};
use namechain_crypto::Hash;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool at capacity ({max})")]
    Full { max: usize },

    #[error("transaction {0} already pooled")]
    Duplicate(String),

    #[error("transaction {txid} conflicts with pooled spend of {outpoint}")]
    Conflict { txid: String, outpoint: Outpoint },

    #[error("coinbase transactions cannot be pooled")]
    Coinbase,

    #[error("invalid transaction: {0}")]
    Invalid(#[from] TxError),
}

#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub tx: Transaction,
    pub txid: Hash,
    pub fee: u64,
    pub weight: u64,
    /// Arrival order, for stable ties
    seq: u64,
}

impl PoolEntry {
    /// Higher fee per weight unit sorts first; earlier arrival breaks ties.
    fn priority(&self, other: &Self) -> Ordering {
        let mine = self.fee as u128 * other.weight as u128;
        let theirs = other.fee as u128 * self.weight as u128;
        theirs.cmp(&mine).then(self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    entries: HashMap<Hash, PoolEntry>,
    spends: HashMap<Outpoint, Hash>,
    next_seq: u64,
}

impl PoolInner {
    fn remove(&mut self, txid: &Hash) -> Option<PoolEntry> {
        let entry = self.entries.remove(txid)?;
        for input in &entry.tx.inputs {
            self.spends.remove(&input.prevout);
        }
        Some(entry)
    }
}

pub struct TxPool {
    inner: Mutex<PoolInner>,
    max_size: usize,
}

impl TxPool {
    pub fn new(max_size: usize) -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new(PoolInner::default()), max_size })
    }

    /// Adds `tx` paying `fee`.
    pub async fn add(&self, tx: Transaction, fee: u64) -> Result<Hash, PoolError> {
        if tx.is_coinbase() {
            return Err(PoolError::Coinbase);
        }
        check_transaction_sanity(&tx)?;

        let txid = tx.txid();
        let mut inner = self.inner.lock().await;
        if inner.entries.contains_key(&txid) {
            return Err(PoolError::Duplicate(hex::encode(txid)));
        }
        for input in &tx.inputs {
            if inner.spends.contains_key(&input.prevout) {
                warn!("Rejecting {}: double spend of {}", hex::encode(txid), input.prevout);
                return Err(PoolError::Conflict { txid: hex::encode(txid), outpoint: input.prevout });
            }
        }
        if inner.entries.len() >= self.max_size {
            warn!("Transaction pool at capacity ({}), rejecting transaction", self.max_size);
            return Err(PoolError::Full { max: self.max_size });
        }

        for input in &tx.inputs {
            inner.spends.insert(input.prevout, txid);
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let weight = tx.weight();
        inner.entries.insert(txid, PoolEntry { tx, txid, fee, weight, seq });
        debug!("Transaction added to pool. Pool size: {}/{}", inner.entries.len(), self.max_size);
        Ok(txid)
    }

    pub async fn remove(&self, txid: &Hash) -> Option<Transaction> {
        self.inner.lock().await.remove(txid).map(|entry| entry.tx)
    }

    pub async fn contains(&self, txid: &Hash) -> bool {
        self.inner.lock().await.entries.contains_key(txid)
    }

    pub async fn get(&self, txid: &Hash) -> Option<PoolEntry> {
        self.inner.lock().await.entries.get(txid).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Drops transactions confirmed by `block` or conflicting with its spends.
    pub async fn remove_for_block(&self, block: &Block) -> usize {
        let mut inner = self.inner.lock().await;
        let mut removed = 0;
        for tx in &block.txs {
            if inner.remove(&tx.txid()).is_some() {
                removed += 1;
            }
            if tx.is_coinbase() {
                continue;
            }
            for input in &tx.inputs {
                if let Some(conflict) = inner.spends.get(&input.prevout).copied() {
                    inner.remove(&conflict);
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            debug!("Removed {} pooled transactions for block {}", removed, hex::encode(block.hash()));
        }
        removed
    }

    /// Best transactions fitting in `max_weight`, parents before children.
    pub async fn select(&self, max_weight: u64) -> Vec<PoolEntry> {
        let inner = self.inner.lock().await;
        let mut ranked: Vec<&PoolEntry> = inner.entries.values().collect();
        ranked.sort_by(|a, b| a.priority(b));

        let mut chosen: Vec<PoolEntry> = Vec::new();
        let mut included: HashSet<Hash> = HashSet::new();
        let mut weight = 0u64;
        let mut progress = true;
        while progress {
            progress = false;
            for entry in &ranked {
                if included.contains(&entry.txid) || weight + entry.weight > max_weight {
                    continue;
                }
                let waiting = entry.tx.inputs.iter().any(|input| {
                    inner.entries.contains_key(&input.prevout.txid) && !included.contains(&input.prevout.txid)
                });
                if waiting {
                    continue;
                }
                weight += entry.weight;
                included.insert(entry.txid);
                chosen.push((*entry).clone());
                progress = true;
            }
        }
        chosen
    }

    /// Outputs created by a pooled transaction, for spending its change.
    pub async fn output(&self, outpoint: &Outpoint) -> Option<Output> {
        let inner = self.inner.lock().await;
        let entry = inner.entries.get(&outpoint.txid)?;
        entry.tx.outputs.get(outpoint.index as usize).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use namechain_core::{Address, BlockHeader, Input};

    fn tx(prev: u8, index: u32, value: u64) -> Transaction {
        let mut input = Input::new(Outpoint::new([prev; 32], index));
        input.witness = vec![vec![0u8; 64], vec![0u8; 32]];
        Transaction::new(vec![input], vec![Output::new(value, Address { version: 0, hash: vec![prev; 20] })])
    }

    #[tokio::test]
    async fn rejects_double_spends_and_duplicates() {
        let pool = TxPool::new(10);
        pool.add(tx(1, 0, 10), 1).await.unwrap();
        assert!(matches!(pool.add(tx(1, 0, 10), 1).await, Err(PoolError::Duplicate(_))));
        assert!(matches!(pool.add(tx(1, 0, 9), 2).await, Err(PoolError::Conflict { .. })));
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let pool = TxPool::new(1);
        pool.add(tx(1, 0, 10), 1).await.unwrap();
        assert_eq!(pool.add(tx(2, 0, 10), 1).await, Err(PoolError::Full { max: 1 }));
    }

    #[tokio::test]
    async fn selection_orders_by_fee_rate_and_respects_parents() {
        let pool = TxPool::new(10);
        let cheap = tx(1, 0, 10);
        let rich = tx(2, 0, 10);
        pool.add(cheap.clone(), 1).await.unwrap();
        pool.add(rich.clone(), 100).await.unwrap();

        // Child of the cheap transaction paying a high fee.
        let mut child = tx(3, 0, 5);
        child.inputs[0].prevout = cheap.outpoint(0);
        pool.add(child.clone(), 1_000).await.unwrap();

        let order: Vec<Hash> = pool.select(u64::MAX).await.iter().map(|e| e.txid).collect();
        assert_eq!(order.len(), 3);
        let pos = |t: &Transaction| order.iter().position(|h| *h == t.txid()).unwrap();
        assert!(pos(&rich) < pos(&cheap));
        assert!(pos(&cheap) < pos(&child));

        let limited = pool.select(rich.weight()).await;
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].txid, rich.txid());
    }

    #[tokio::test]
    async fn block_confirmation_evicts_and_conflicts() {
        let pool = TxPool::new(10);
        let pooled = tx(1, 0, 10);
        pool.add(pooled.clone(), 1).await.unwrap();
        let other = tx(2, 0, 10);
        pool.add(other.clone(), 1).await.unwrap();

        // A different transaction in the block spends the same coin as `pooled`.
        let rival = tx(1, 0, 7);
        let block = Block { header: empty_header(), txs: vec![rival, other.clone()] };
        assert_eq!(pool.remove_for_block(&block).await, 2);
        assert!(pool.is_empty().await);
    }

    fn empty_header() -> BlockHeader {
        BlockHeader {
            version: 0,
            prev_block: [0u8; 32],
            merkle_root: [0u8; 32],
            witness_root: [0u8; 32],
            tree_root: [0u8; 32],
            reserved_root: [0u8; 32],
            time: 0,
            bits: 0,
            nonce: 0,
            extra_nonce: 0,
        }
    }
}
