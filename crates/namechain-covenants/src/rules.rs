// Name rules: validity, hashing, bid blinds and the rollout schedule

use crate::params::NameParams;
use namechain_core::covenant::MAX_NAME_SIZE;
use namechain_crypto::{blake2b256_parts, sha3_256, Hash};

const ROLLOUT_WEEKS: u32 = 52;
const GRIND_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Lowercase ASCII letters, digits, `-` and `_`; at most 63 bytes; no
/// leading or trailing `-` or `_`.
pub fn is_valid_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_NAME_SIZE {
        return false;
    }
    let last = bytes.len() - 1;
    bytes.iter().enumerate().all(|(i, &ch)| match ch {
        b'a'..=b'z' | b'0'..=b'9' => true,
        b'-' | b'_' => i != 0 && i != last,
        _ => false,
    })
}

pub fn hash_name(name: &str) -> Hash {
    sha3_256(name.as_bytes())
}

/// Commitment hiding a bid value: BLAKE2b-256(value LE || nonce).
pub fn create_blind(value: u64, nonce: &Hash) -> Hash {
    blake2b256_parts(&[&value.to_le_bytes(), nonce])
}

fn hash_mod(hash: &Hash, m: u32) -> u32 {
    hash.iter().fold(0u32, |acc, &b| (acc * 256 + b as u32) % m)
}

/// Height from which a name may be opened and the rollout week it falls in.
pub fn rollout(name_hash: &Hash, params: &NameParams) -> (u32, u32) {
    if params.no_rollout {
        return (params.auction_start, 0);
    }
    let week = hash_mod(name_hash, ROLLOUT_WEEKS);
    (params.auction_start + week * params.rollout_interval, week)
}

pub fn has_rollout(name_hash: &Hash, height: u32, params: &NameParams) -> bool {
    height >= rollout(name_hash, params).0
}

/// Deterministically derives an openable, non-reserved name of `size`
/// characters for `height`.
pub fn grind_name(size: usize, height: u32, params: &NameParams) -> Option<String> {
    if size == 0 || size > MAX_NAME_SIZE {
        return None;
    }
    for attempt in 0u32..100_000 {
        let mut name = String::with_capacity(size);
        let mut counter = 0u32;
        while name.len() < size {
            let seed = blake2b256_parts(&[
                b"grind",
                &height.to_le_bytes(),
                &attempt.to_le_bytes(),
                &counter.to_le_bytes(),
            ]);
            for b in seed.iter().take(size - name.len()) {
                name.push(GRIND_ALPHABET[*b as usize % GRIND_ALPHABET.len()] as char);
            }
            counter += 1;
        }
        if !is_valid_name(&name) || params.is_reserved(&name) {
            continue;
        }
        if has_rollout(&hash_name(&name), height, params) {
            return Some(name);
        }
    }
    None
}
