// Reserved-name claims
//
// A claim mints a CLAIM output in the coinbase for a reserved legacy name.
// The ownership proof is opaque here; chains verify it through an injected
// verifier.
//
// Wire format (version 0):
//   u8 version | u8 name_len | name | u8 flags | commit_hash[32] |
//   u32 commit_height | u64 value | u64 fee | address | u16 proof_len | proof

use crate::covenant::{Covenant, MAX_NAME_SIZE};
use crate::encoding::{CodecError, Decodable, Encodable, Reader, Writer};
use crate::transaction::{Output, MAX_MONEY};
use crate::types::Address;
use namechain_crypto::{blake2b256, sha3_256, Hash};
use serde::{Deserialize, Serialize};

pub const CLAIM_VERSION: u8 = 0;
pub const MAX_CLAIM_PROOF_SIZE: usize = 10_000;

/// Claim flag: the ownership proof relies on a weak (RSA-1024) key.
pub const CLAIM_FLAG_WEAK: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub name: String,
    pub flags: u8,
    /// Block hash the proof commits to
    pub commit_hash: Hash,
    pub commit_height: u32,
    /// Total value minted; `fee` of it goes to the miner
    pub value: u64,
    pub fee: u64,
    /// Recipient of the CLAIM output
    pub address: Address,
    pub proof: Vec<u8>,
}

impl Claim {
    /// Unique key of this claim.
    pub fn hash(&self) -> Hash {
        blake2b256(&self.encode())
    }

    pub fn name_hash(&self) -> Hash {
        sha3_256(self.name.as_bytes())
    }

    pub fn is_weak(&self) -> bool {
        self.flags & CLAIM_FLAG_WEAK != 0
    }

    /// The coinbase output minted by this claim at `height`.
    pub fn to_output(&self, height: u32) -> Output {
        Output::with_covenant(
            self.value.saturating_sub(self.fee),
            self.address.clone(),
            Covenant::Claim {
                name_hash: self.name_hash(),
                height,
                name: self.name.clone(),
                flags: self.flags,
                commit_hash: self.commit_hash,
                commit_height: self.commit_height,
            },
        )
    }
}

impl Encodable for Claim {
    fn encode_into(&self, w: &mut Writer) {
        w.write_u8(CLAIM_VERSION);
        w.write_u8(self.name.len() as u8);
        w.write_bytes(self.name.as_bytes());
        w.write_u8(self.flags);
        w.write_hash(&self.commit_hash);
        w.write_u32(self.commit_height);
        w.write_u64(self.value);
        w.write_u64(self.fee);
        self.address.encode_into(w);
        w.write_u16(self.proof.len() as u16);
        w.write_bytes(&self.proof);
    }
}

impl Decodable for Claim {
    fn decode_from(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let version = r.read_u8()?;
        if version != CLAIM_VERSION {
            return Err(CodecError::UnknownVersion { object: "claim", version });
        }

        let name_len = r.read_u8()? as usize;
        if name_len == 0 {
            return Err(CodecError::TooShort { field: "claim name", len: 0, min: 1 });
        }
        if name_len > MAX_NAME_SIZE {
            return Err(CodecError::TooLong { field: "claim name", len: name_len, max: MAX_NAME_SIZE });
        }
        let name = r.read_bytes(name_len)?;
        if !name.is_ascii() {
            return Err(CodecError::Invalid { field: "claim name", reason: "non-ascii name".into() });
        }
        let name = String::from_utf8_lossy(name).into_owned();

        let flags = r.read_u8()?;
        let commit_hash = r.read_hash()?;
        let commit_height = r.read_u32()?;
        let value = r.read_u64()?;
        let fee = r.read_u64()?;
        if value > MAX_MONEY || fee > value {
            return Err(CodecError::Invalid {
                field: "claim value",
                reason: format!("value {} fee {}", value, fee),
            });
        }
        let address = Address::decode_from(r)?;

        let proof_len = r.read_u16()? as usize;
        if proof_len > MAX_CLAIM_PROOF_SIZE {
            return Err(CodecError::TooLong { field: "claim proof", len: proof_len, max: MAX_CLAIM_PROOF_SIZE });
        }
        let proof = r.read_bytes(proof_len)?.to_vec();

        Ok(Self { name, flags, commit_hash, commit_height, value, fee, address, proof })
    }
}
