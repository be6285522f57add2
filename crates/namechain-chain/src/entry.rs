// Chain entries
//
// One entry per known header, forming a tree rooted at genesis. Each entry
// carries a skip pointer to an ancestor at a height chosen so that walking
// to any ancestor takes O(log n) hops.
//
// SAFETY INVARIANTS:
// 1. Entries are immutable once indexed
// 2. `skip` always names an ancestor at `skip_height(height)`
// 3. `chainwork` equals the parent's chainwork plus this header's work

use crate::pow::block_work;
use namechain_core::BlockHeader;
use namechain_crypto::{Hash, ZERO_HASH};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub hash: Hash,
    pub height: u32,
    pub header: BlockHeader,
    /// Cumulative work up to and including this entry
    pub chainwork: BigUint,
    /// Hash of the ancestor at `skip_height(height)`
    pub skip: Hash,
}

impl ChainEntry {
    pub fn genesis(header: BlockHeader) -> Self {
        Self {
            hash: header.hash(),
            height: 0,
            chainwork: block_work(header.bits),
            header,
            skip: ZERO_HASH,
        }
    }

    pub fn prev(&self) -> &Hash {
        &self.header.prev_block
    }

    pub fn time(&self) -> u64 {
        self.header.time
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}

fn invert_lowest_one(n: u32) -> u32 {
    n & n.wrapping_sub(1)
}

/// Height the skip pointer of an entry at `height` points to.
pub fn skip_height(height: u32) -> u32 {
    if height < 2 {
        return 0;
    }
    if height & 1 == 1 {
        invert_lowest_one(invert_lowest_one(height - 1)) + 1
    } else {
        invert_lowest_one(height)
    }
}

/// Every known entry by hash, main chain or not.
#[derive(Debug, Default)]
pub struct EntryIndex {
    entries: HashMap<Hash, Arc<ChainEntry>>,
}

impl EntryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, hash: &Hash) -> Option<&Arc<ChainEntry>> {
        self.entries.get(hash)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn insert(&mut self, entry: Arc<ChainEntry>) {
        self.entries.insert(entry.hash, entry);
    }

    /// Builds the entry for `header` on top of `prev`.
    pub fn child_of(&self, prev: &ChainEntry, header: BlockHeader) -> ChainEntry {
        let height = prev.height + 1;
        let skip = self
            .ancestor(prev, skip_height(height))
            .map_or(ZERO_HASH, |entry| entry.hash);
        ChainEntry {
            hash: header.hash(),
            height,
            chainwork: &prev.chainwork + block_work(header.bits),
            header,
            skip,
        }
    }

    /// Ancestor of `entry` at `height`, following skip pointers.
    pub fn ancestor(&self, entry: &ChainEntry, height: u32) -> Option<Arc<ChainEntry>> {
        if height > entry.height {
            return None;
        }
        let mut current = self.get(&entry.hash).cloned().unwrap_or_else(|| Arc::new(entry.clone()));
        while current.height > height {
            let here = skip_height(current.height);
            let below = skip_height(current.height - 1);
            let take_skip = current.skip != ZERO_HASH
                && (here == height || (here > height && !(below + 2 < here && below >= height)));
            let next = if take_skip { self.get(&current.skip) } else { self.get(current.prev()) };
            current = next?.clone();
        }
        Some(current)
    }

    /// Most recent common ancestor of `a` and `b`.
    ///
    /// Binary search over heights: below the fork every height has the same
    /// ancestor on both branches, above it none does.
    pub fn find_fork(&self, a: &ChainEntry, b: &ChainEntry) -> Option<Arc<ChainEntry>> {
        let top = a.height.min(b.height);
        let same_at = |height: u32| -> Option<bool> {
            let left = self.ancestor(a, height)?;
            let right = self.ancestor(b, height)?;
            Some(left.hash == right.hash)
        };

        if !same_at(0)? {
            return None;
        }
        let (mut lo, mut hi) = (0u32, top);
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if same_at(mid)? {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        self.ancestor(a, lo)
    }

    /// Median timestamp of the last eleven entries ending at `entry`.
    pub fn median_time_past(&self, entry: &ChainEntry) -> u64 {
        const SPAN: usize = 11;
        let mut times = Vec::with_capacity(SPAN);
        times.push(entry.time());
        let mut walk = self.get(entry.prev()).cloned();
        while times.len() < SPAN {
            match walk {
                Some(current) => {
                    times.push(current.time());
                    walk = if current.is_genesis() { None } else { self.get(current.prev()).cloned() };
                }
                None => break,
            }
        }
        times.sort_unstable();
        times[times.len() / 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(prev: Hash, nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 0,
            prev_block: prev,
            merkle_root: ZERO_HASH,
            witness_root: ZERO_HASH,
            tree_root: ZERO_HASH,
            reserved_root: ZERO_HASH,
            time: 1_000 + nonce as u64,
            bits: 0x207f_ffff,
            nonce,
            extra_nonce: 0,
        }
    }

    fn build(index: &mut EntryIndex, from: &Arc<ChainEntry>, len: u32, salt: u32) -> Vec<Arc<ChainEntry>> {
        let mut out = Vec::new();
        let mut tip = from.clone();
        for i in 0..len {
            let entry = Arc::new(index.child_of(&tip, header(tip.hash, salt * 100_000 + i)));
            index.insert(entry.clone());
            out.push(entry.clone());
            tip = entry;
        }
        out
    }

    fn genesis(index: &mut EntryIndex) -> Arc<ChainEntry> {
        let entry = Arc::new(ChainEntry::genesis(header(ZERO_HASH, 0)));
        index.insert(entry.clone());
        entry
    }

    #[test]
    fn skip_heights_point_backwards() {
        assert_eq!(skip_height(0), 0);
        assert_eq!(skip_height(1), 0);
        for h in 2..5_000u32 {
            assert!(skip_height(h) < h);
        }
        assert_eq!(skip_height(8), 0);
        assert_eq!(skip_height(12), 8);
    }

    #[test]
    fn ancestor_matches_linear_walk() {
        let mut index = EntryIndex::new();
        let g = genesis(&mut index);
        let chain = build(&mut index, &g, 300, 1);
        let tip = chain.last().unwrap();
        for height in [0u32, 1, 2, 63, 64, 65, 150, 299, 300] {
            let found = index.ancestor(tip, height).unwrap();
            assert_eq!(found.height, height);
            let expected = if height == 0 { g.hash } else { chain[height as usize - 1].hash };
            assert_eq!(found.hash, expected);
        }
        assert!(index.ancestor(tip, 301).is_none());
    }

    #[test]
    fn fork_point_between_branches() {
        let mut index = EntryIndex::new();
        let g = genesis(&mut index);
        let trunk = build(&mut index, &g, 40, 1);
        let left = build(&mut index, &trunk[24], 30, 2);
        let right = build(&mut index, &trunk[24], 7, 3);
        let fork = index.find_fork(left.last().unwrap(), right.last().unwrap()).unwrap();
        assert_eq!(fork.hash, trunk[24].hash);
        assert_eq!(fork.height, 25);

        let fork = index.find_fork(trunk.last().unwrap(), &trunk[10]).unwrap();
        assert_eq!(fork.hash, trunk[10].hash);
    }

    #[test]
    fn chainwork_accumulates() {
        let mut index = EntryIndex::new();
        let g = genesis(&mut index);
        let chain = build(&mut index, &g, 3, 1);
        assert_eq!(chain[2].chainwork, &g.chainwork * BigUint::from(4u8));
    }

    #[test]
    fn median_time_past_uses_eleven_entries() {
        let mut index = EntryIndex::new();
        let g = genesis(&mut index);
        let chain = build(&mut index, &g, 20, 0);
        // Times are 1000 + i for the i-th built entry (i from 0).
        assert_eq!(index.median_time_past(chain.last().unwrap()), 1_000 + 14);
    }
}
