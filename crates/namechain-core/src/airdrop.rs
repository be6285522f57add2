// Airdrop proofs
//
// An airdrop proof mints a plain coinbase output for one leaf of the
// network's airdrop merkle tree. The leaf index is the one-shot key.
//
// Wire format (version 0):
//   u8 version | u32 index | u8 depth | depth * sibling[32] |
//   u16 key_len | key | u64 value | u64 fee | address | u16 sig_len | sig

use crate::encoding::{CodecError, Decodable, Encodable, Reader, Writer};
use crate::transaction::{Output, MAX_MONEY};
use crate::types::Address;
use namechain_crypto::signature::SignatureError;
use namechain_crypto::{blake2b256, blake2b256_parts, verify_merkle_path, verify_signature, Hash, Keypair, MerklePath};
use serde::{Deserialize, Serialize};

pub const AIRDROP_VERSION: u8 = 0;
pub const MAX_AIRDROP_DEPTH: usize = 32;
pub const MAX_AIRDROP_KEY_SIZE: usize = 1024;
pub const MAX_AIRDROP_SIGNATURE_SIZE: usize = 1024;

/// Leaf committed in the airdrop tree for `key` entitled to `value`.
pub fn airdrop_leaf(key: &[u8], value: u64) -> Hash {
    blake2b256_parts(&[key, &value.to_le_bytes()])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirdropProof {
    /// Leaf position in the airdrop tree
    pub index: u32,
    pub path: MerklePath,
    /// ed25519 public key of the recipient
    pub key: Vec<u8>,
    pub value: u64,
    pub fee: u64,
    pub address: Address,
    pub signature: Vec<u8>,
}

impl AirdropProof {
    pub fn hash(&self) -> Hash {
        blake2b256(&self.encode())
    }

    pub fn leaf(&self) -> Hash {
        airdrop_leaf(&self.key, self.value)
    }

    pub fn verify_inclusion(&self, root: &Hash) -> bool {
        verify_merkle_path(root, &self.leaf(), self.index, &self.path)
    }

    /// Digest the key holder signs: the encoding without the signature.
    pub fn signing_hash(&self) -> Hash {
        let mut w = Writer::new();
        self.encode_unsigned(&mut w);
        blake2b256(&w.into_inner())
    }

    pub fn verify_signature(&self) -> Result<(), SignatureError> {
        verify_signature(&self.key, &self.signing_hash(), &self.signature)
    }

    pub fn sign(&mut self, keypair: &Keypair) {
        self.signature = keypair.sign(&self.signing_hash()).to_vec();
    }

    /// The plain coinbase output minted by this proof.
    pub fn to_output(&self) -> Output {
        Output::new(self.value.saturating_sub(self.fee), self.address.clone())
    }

    fn encode_unsigned(&self, w: &mut Writer) {
        w.write_u8(AIRDROP_VERSION);
        w.write_u32(self.index);
        w.write_u8(self.path.siblings.len() as u8);
        for sibling in &self.path.siblings {
            w.write_hash(sibling);
        }
        w.write_u16(self.key.len() as u16);
        w.write_bytes(&self.key);
        w.write_u64(self.value);
        w.write_u64(self.fee);
        self.address.encode_into(w);
    }
}

impl Encodable for AirdropProof {
    fn encode_into(&self, w: &mut Writer) {
        self.encode_unsigned(w);
        w.write_u16(self.signature.len() as u16);
        w.write_bytes(&self.signature);
    }
}

impl Decodable for AirdropProof {
    fn decode_from(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let version = r.read_u8()?;
        if version != AIRDROP_VERSION {
            return Err(CodecError::UnknownVersion { object: "airdrop proof", version });
        }
        let index = r.read_u32()?;

        let depth = r.read_u8()? as usize;
        if depth > MAX_AIRDROP_DEPTH {
            return Err(CodecError::TooLong { field: "airdrop path", len: depth, max: MAX_AIRDROP_DEPTH });
        }
        let mut siblings = Vec::with_capacity(depth);
        for _ in 0..depth {
            siblings.push(r.read_hash()?);
        }

        let key_len = r.read_u16()? as usize;
        if key_len == 0 {
            return Err(CodecError::TooShort { field: "airdrop key", len: 0, min: 1 });
        }
        if key_len > MAX_AIRDROP_KEY_SIZE {
            return Err(CodecError::TooLong { field: "airdrop key", len: key_len, max: MAX_AIRDROP_KEY_SIZE });
        }
        let key = r.read_bytes(key_len)?.to_vec();

        let value = r.read_u64()?;
        let fee = r.read_u64()?;
        if value > MAX_MONEY || fee > value {
            return Err(CodecError::Invalid {
                field: "airdrop value",
                reason: format!("value {} fee {}", value, fee),
            });
        }
        let address = Address::decode_from(r)?;

        let sig_len = r.read_u16()? as usize;
        if sig_len > MAX_AIRDROP_SIGNATURE_SIZE {
            return Err(CodecError::TooLong {
                field: "airdrop signature",
                len: sig_len,
                max: MAX_AIRDROP_SIGNATURE_SIZE,
            });
        }
        let signature = r.read_bytes(sig_len)?.to_vec();

        Ok(Self { index, path: MerklePath { siblings }, key, value, fee, address, signature })
    }
}
