// Proof-of-work arithmetic
//
// Compact "bits" encode a 256-bit target as a base-256 float: the high byte
// is the exponent, the low three bytes the mantissa. Block hashes are read
// as big-endian integers and must not exceed the target.

use num_bigint::BigUint;
use namechain_crypto::Hash;

/// Decodes compact bits. Returns None for negative or overflowing values.
pub fn compact_to_target(bits: u32) -> Option<BigUint> {
    let exponent = bits >> 24;
    let mantissa = bits & 0x007f_ffff;
    if bits & 0x0080_0000 != 0 && mantissa != 0 {
        return None;
    }
    let target = if exponent <= 3 {
        BigUint::from(mantissa >> (8 * (3 - exponent)))
    } else {
        BigUint::from(mantissa) << ((8 * (exponent - 3)) as usize)
    };
    if target.bits() > 256 {
        return None;
    }
    Some(target)
}

pub fn target_to_compact(target: &BigUint) -> u32 {
    let mut size = ((target.bits() + 7) / 8) as u32;
    let mut mantissa: u32 = if size <= 3 {
        let low = target.to_u32_digits().first().copied().unwrap_or(0);
        low << (8 * (3 - size))
    } else {
        let shifted: BigUint = target >> ((8 * (size - 3)) as usize);
        shifted.to_u32_digits().first().copied().unwrap_or(0)
    };
    // Keep the sign bit clear.
    if mantissa & 0x0080_0000 != 0 {
        mantissa >>= 8;
        size += 1;
    }
    (size << 24) | (mantissa & 0x007f_ffff)
}

pub fn hash_to_int(hash: &Hash) -> BigUint {
    BigUint::from_bytes_be(hash)
}

pub fn meets_target(hash: &Hash, bits: u32) -> bool {
    match compact_to_target(bits) {
        Some(target) if target != BigUint::default() => hash_to_int(hash) <= target,
        _ => false,
    }
}

/// Whether `bits` is no easier than the network's proof-of-work limit.
pub fn within_limit(bits: u32, limit_bits: u32) -> bool {
    match (compact_to_target(bits), compact_to_target(limit_bits)) {
        (Some(target), Some(limit)) => target <= limit,
        _ => false,
    }
}

/// Expected number of hashes to find a block at `bits`: 2^256 / (target + 1).
pub fn block_work(bits: u32) -> BigUint {
    match compact_to_target(bits) {
        Some(target) if target != BigUint::default() => (BigUint::from(1u8) << 256usize) / (target + 1u8),
        _ => BigUint::default(),
    }
}

/// Bitcoin-style retarget, clamping the observed timespan to a factor of four.
pub fn retarget(prev_bits: u32, actual_timespan: u64, target_timespan: u64, limit_bits: u32) -> u32 {
    let actual = actual_timespan.clamp(target_timespan / 4, target_timespan.saturating_mul(4));
    let (Some(prev), Some(limit)) = (compact_to_target(prev_bits), compact_to_target(limit_bits)) else {
        return limit_bits;
    };
    let next = prev * BigUint::from(actual) / BigUint::from(target_timespan.max(1));
    if next > limit {
        limit_bits
    } else {
        target_to_compact(&next)
    }
}
