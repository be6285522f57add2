// Digest helpers
//
// All consensus hashes are 32 bytes. Address hashes are 20 bytes.

use blake2::digest::consts::{U20, U32};
use blake2::{Blake2b, Digest};
use sha3::Sha3_256;

/// A 32-byte consensus hash (block hash, txid, name hash, merkle root).
pub type Hash = [u8; 32];

/// The all-zero hash. Used for the genesis parent and null outpoints.
pub const ZERO_HASH: Hash = [0u8; 32];

type Blake2b256 = Blake2b<U32>;
type Blake2b160 = Blake2b<U20>;

pub fn blake2b256(data: &[u8]) -> Hash {
    blake2b256_parts(&[data])
}

/// BLAKE2b-256 over the concatenation of `parts` without allocating.
pub fn blake2b256_parts(parts: &[&[u8]]) -> Hash {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

pub fn blake2b160(data: &[u8]) -> [u8; 20] {
    let mut hasher = Blake2b160::new();
    hasher.update(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hasher.finalize());
    out
}

pub fn sha3_256(data: &[u8]) -> Hash {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha3_256::digest(data));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_match_concatenation() {
        let joined = blake2b256(b"namechain");
        let split = blake2b256_parts(&[b"name", b"chain"]);
        assert_eq!(joined, split);
    }

    #[test]
    fn digests_differ_by_function() {
        assert_ne!(blake2b256(b"x"), sha3_256(b"x"));
        assert_eq!(blake2b160(b"x").len(), 20);
    }
}
