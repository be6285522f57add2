// UTXO set commitment
//
// A multiset hash: the commitment is the wrapping sum of BLAKE2b-256 digests
// of each member, taken as four little-endian u64 limbs with carries.
//
// SAFETY INVARIANTS:
// 1. insert and remove are exact inverses, so disconnecting a block restores
//    the prior commitment bit for bit
// 2. The result is independent of insertion order

use crate::hash::{blake2b256, blake2b256_parts, Hash};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetCommitment {
    limbs: [u64; 4],
}

fn limbs_of(hash: &Hash) -> [u64; 4] {
    let mut limbs = [0u64; 4];
    for (i, chunk) in hash.chunks_exact(8).enumerate() {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        limbs[i] = u64::from_le_bytes(word);
    }
    limbs
}

impl SetCommitment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, member: &[u8]) {
        let other = limbs_of(&blake2b256(member));
        let mut carry = false;
        for (limb, add) in self.limbs.iter_mut().zip(other) {
            let (sum, c1) = limb.overflowing_add(add);
            let (sum, c2) = sum.overflowing_add(carry as u64);
            *limb = sum;
            carry = c1 || c2;
        }
    }

    pub fn remove(&mut self, member: &[u8]) {
        let other = limbs_of(&blake2b256(member));
        let mut borrow = false;
        for (limb, sub) in self.limbs.iter_mut().zip(other) {
            let (diff, b1) = limb.overflowing_sub(sub);
            let (diff, b2) = diff.overflowing_sub(borrow as u64);
            *limb = diff;
            borrow = b1 || b2;
        }
    }

    /// The 32-byte root published in chain state.
    pub fn root(&self) -> Hash {
        let mut bytes = [0u8; 32];
        for (i, limb) in self.limbs.iter().enumerate() {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&limb.to_le_bytes());
        }
        blake2b256_parts(&[b"utxo", &bytes])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn order_independent() {
        let mut a = SetCommitment::new();
        a.insert(b"one");
        a.insert(b"two");
        let mut b = SetCommitment::new();
        b.insert(b"two");
        b.insert(b"one");
        assert_eq!(a.root(), b.root());
    }

    proptest! {
        #[test]
        fn remove_undoes_insert(members in proptest::collection::vec(any::<Vec<u8>>(), 0..16), extra in any::<Vec<u8>>()) {
            let mut set = SetCommitment::new();
            for m in &members {
                set.insert(m);
            }
            let before = set;
            set.insert(&extra);
            set.remove(&extra);
            prop_assert_eq!(before, set);
        }
    }
}
