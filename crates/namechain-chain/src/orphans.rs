// Orphan pool
//
// Blocks whose parent is not yet known. Bounded; the oldest orphan is
// evicted first.

use log::debug;
use namechain_core::Block;
use namechain_crypto::Hash;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub struct OrphanPool {
    blocks: HashMap<Hash, Block>,
    by_prev: HashMap<Hash, Vec<Hash>>,
    order: VecDeque<Hash>,
    max: usize,
}

impl OrphanPool {
    pub fn new(max: usize) -> Self {
        Self { max, ..Self::default() }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn insert(&mut self, block: Block) {
        if self.max == 0 {
            return;
        }
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return;
        }
        while self.blocks.len() >= self.max {
            match self.order.pop_front() {
                Some(oldest) => self.remove(&oldest),
                None => break,
            }
        }
        self.by_prev.entry(*block.prev_block()).or_default().push(hash);
        self.order.push_back(hash);
        self.blocks.insert(hash, block);
    }

    /// Removes and returns every orphan whose parent is `prev`.
    pub fn take_children(&mut self, prev: &Hash) -> Vec<Block> {
        let hashes = self.by_prev.remove(prev).unwrap_or_default();
        let mut out = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(block) = self.blocks.remove(&hash) {
                self.order.retain(|h| *h != hash);
                out.push(block);
            }
        }
        out
    }

    fn remove(&mut self, hash: &Hash) {
        if let Some(block) = self.blocks.remove(hash) {
            if let Some(siblings) = self.by_prev.get_mut(block.prev_block()) {
                siblings.retain(|h| h != hash);
                if siblings.is_empty() {
                    self.by_prev.remove(block.prev_block());
                }
            }
            debug!("evicted orphan {}", hex::encode(hash));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use namechain_core::BlockHeader;
    use namechain_crypto::ZERO_HASH;

    fn block(prev: Hash, nonce: u32) -> Block {
        Block {
            header: BlockHeader {
                version: 0,
                prev_block: prev,
                merkle_root: ZERO_HASH,
                witness_root: ZERO_HASH,
                tree_root: ZERO_HASH,
                reserved_root: ZERO_HASH,
                time: 0,
                bits: 0,
                nonce,
                extra_nonce: 0,
            },
            txs: Vec::new(),
        }
    }

    #[test]
    fn children_are_released_by_parent() {
        let mut pool = OrphanPool::new(10);
        pool.insert(block([1u8; 32], 1));
        pool.insert(block([1u8; 32], 2));
        pool.insert(block([2u8; 32], 3));
        assert_eq!(pool.take_children(&[1u8; 32]).len(), 2);
        assert_eq!(pool.len(), 1);
        assert!(pool.take_children(&[1u8; 32]).is_empty());
    }

    #[test]
    fn oldest_is_evicted_at_capacity() {
        let mut pool = OrphanPool::new(2);
        let first = block([1u8; 32], 1);
        let first_hash = first.hash();
        pool.insert(first);
        pool.insert(block([1u8; 32], 2));
        pool.insert(block([3u8; 32], 3));
        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(&first_hash));
        assert_eq!(pool.take_children(&[1u8; 32]).len(), 1);
    }
}
