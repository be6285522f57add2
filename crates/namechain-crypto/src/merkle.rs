// Merkle commitments
//
// SAFETY INVARIANTS:
// 1. Leaves and interior nodes are hashed under distinct prefixes, so an
//    interior node can never be replayed as a leaf
// 2. Odd levels are padded with the zero sentinel rather than by duplicating
//    the last node; two different leaf lists never share a root
// 3. The empty tree commits to ZERO_HASH

use crate::hash::{blake2b256_parts, Hash, ZERO_HASH};
use serde::{Deserialize, Serialize};

const LEAF_PREFIX: [u8; 1] = [0x00];
const NODE_PREFIX: [u8; 1] = [0x01];

/// Sibling hashes from the leaf level up to (excluding) the root.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MerklePath {
    pub siblings: Vec<Hash>,
}

pub fn merkle_leaf(data: &Hash) -> Hash {
    blake2b256_parts(&[&LEAF_PREFIX, data])
}

pub fn merkle_node(left: &Hash, right: &Hash) -> Hash {
    blake2b256_parts(&[&NODE_PREFIX, left, right])
}

fn next_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => merkle_node(left, right),
            [left] => merkle_node(left, &ZERO_HASH),
            _ => ZERO_HASH,
        })
        .collect()
}

/// Computes the root over already-hashed leaves (txids, record hashes).
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return ZERO_HASH;
    }
    let mut level: Vec<Hash> = leaves.iter().map(merkle_leaf).collect();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Builds the inclusion path for `leaves[index]`.
pub fn merkle_branch(leaves: &[Hash], index: usize) -> Option<MerklePath> {
    if index >= leaves.len() {
        return None;
    }
    let mut siblings = Vec::new();
    let mut level: Vec<Hash> = leaves.iter().map(merkle_leaf).collect();
    let mut position = index;
    while level.len() > 1 {
        let sibling = position ^ 1;
        siblings.push(level.get(sibling).copied().unwrap_or(ZERO_HASH));
        level = next_level(&level);
        position >>= 1;
    }
    Some(MerklePath { siblings })
}

/// Verifies that `leaf` sits at `index` under `root`.
///
/// The index must fit in the path depth; otherwise a single proof could be
/// presented under several positions.
pub fn verify_merkle_path(root: &Hash, leaf: &Hash, index: u32, path: &MerklePath) -> bool {
    let depth = path.siblings.len();
    if depth < 32 && (index as u64) >> depth != 0 {
        return false;
    }
    let mut node = merkle_leaf(leaf);
    let mut position = index;
    for sibling in &path.siblings {
        node = if position & 1 == 1 {
            merkle_node(sibling, &node)
        } else {
            merkle_node(&node, sibling)
        };
        position >>= 1;
    }
    &node == root
}
