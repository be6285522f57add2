// Outpoints and addresses

use crate::encoding::{CodecError, Decodable, Encodable, Reader, Writer};
use namechain_crypto::{blake2b160, Hash, ZERO_HASH};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a transaction output: (txid, output index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Outpoint {
    pub txid: Hash,
    pub index: u32,
}

impl Outpoint {
    pub const SIZE: usize = 36;

    pub fn new(txid: Hash, index: u32) -> Self {
        Self { txid, index }
    }

    /// The prevout used by coinbase inputs and by unowned name records.
    pub fn null() -> Self {
        Self { txid: ZERO_HASH, index: u32::MAX }
    }

    pub fn is_null(&self) -> bool {
        self.txid == ZERO_HASH && self.index == u32::MAX
    }

    /// Fixed-width key form (txid followed by big-endian index) so that
    /// outputs of one transaction sort together.
    pub fn to_key(&self) -> [u8; Self::SIZE] {
        let mut key = [0u8; Self::SIZE];
        key[..32].copy_from_slice(&self.txid);
        key[32..].copy_from_slice(&self.index.to_be_bytes());
        key
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", hex::encode(self.txid), self.index)
    }
}

impl Encodable for Outpoint {
    fn encode_into(&self, w: &mut Writer) {
        w.write_hash(&self.txid);
        w.write_u32(self.index);
    }
}

impl Decodable for Outpoint {
    fn decode_from(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self { txid: r.read_hash()?, index: r.read_u32()? })
    }
}

/// Versioned output address.
///
/// Version 0 with a 20-byte hash commits to an ed25519 public key.
/// Version 31 is null-data: provably unspendable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub version: u8,
    pub hash: Vec<u8>,
}

impl Address {
    pub const MAX_VERSION: u8 = 31;
    pub const NULL_DATA_VERSION: u8 = 31;
    pub const MIN_HASH_SIZE: usize = 2;
    pub const MAX_HASH_SIZE: usize = 40;

    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self { version: 0, hash: blake2b160(public_key).to_vec() }
    }

    /// Null-data address carrying `data` (padded to the minimum size).
    pub fn null_data(data: &[u8]) -> Self {
        let mut hash = data[..data.len().min(Self::MAX_HASH_SIZE)].to_vec();
        hash.resize(hash.len().max(Self::MIN_HASH_SIZE), 0);
        Self { version: Self::NULL_DATA_VERSION, hash }
    }

    pub fn is_null_data(&self) -> bool {
        self.version == Self::NULL_DATA_VERSION
    }

    pub fn is_pubkey_hash(&self) -> bool {
        self.version == 0 && self.hash.len() == 20
    }

    pub fn is_valid(&self) -> bool {
        self.version <= Self::MAX_VERSION
            && (Self::MIN_HASH_SIZE..=Self::MAX_HASH_SIZE).contains(&self.hash.len())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}:{}", self.version, hex::encode(&self.hash))
    }
}

impl Encodable for Address {
    fn encode_into(&self, w: &mut Writer) {
        w.write_u8(self.version);
        w.write_u8(self.hash.len() as u8);
        w.write_bytes(&self.hash);
    }
}

impl Decodable for Address {
    fn decode_from(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let version = r.read_u8()?;
        if version > Self::MAX_VERSION {
            return Err(CodecError::Invalid {
                field: "address version",
                reason: format!("{} exceeds {}", version, Self::MAX_VERSION),
            });
        }
        let len = r.read_u8()? as usize;
        if len < Self::MIN_HASH_SIZE {
            return Err(CodecError::TooShort { field: "address hash", len, min: Self::MIN_HASH_SIZE });
        }
        if len > Self::MAX_HASH_SIZE {
            return Err(CodecError::TooLong { field: "address hash", len, max: Self::MAX_HASH_SIZE });
        }
        Ok(Self { version, hash: r.read_bytes(len)?.to_vec() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_outpoint() {
        assert!(Outpoint::null().is_null());
        assert!(!Outpoint::new(ZERO_HASH, 0).is_null());
    }

    #[test]
    fn outpoint_keys_sort_by_index_within_tx() {
        let a = Outpoint::new([1u8; 32], 1).to_key();
        let b = Outpoint::new([1u8; 32], 256).to_key();
        assert!(a < b);
    }

    #[test]
    fn address_length_bounds() {
        let mut bytes = vec![0u8, 1, 0xaa];
        assert!(matches!(Address::decode(&bytes), Err(CodecError::TooShort { .. })));
        bytes = vec![32u8, 2, 0, 0];
        assert!(matches!(Address::decode(&bytes), Err(CodecError::Invalid { .. })));
        let nulldata = Address::null_data(b"x");
        assert!(nulldata.is_valid() && nulldata.is_null_data());
    }
}
