// Covenants
//
// A covenant is a typed directive attached to an output. On the wire it is a
// type byte followed by a vector of byte-string items; each variant knows how
// to turn its fields into items and back.
//
// SAFETY INVARIANTS:
// 1. Decoding is exhaustive over the known type bytes; anything else is
//    `CodecError::UnknownCovenant`
// 2. Each variant requires exactly its item count with exact item widths

use crate::encoding::{CodecError, Decodable, Encodable, Reader, Writer};
use crate::types::Address;
use namechain_crypto::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_COVENANT_ITEMS: usize = 16;
pub const MAX_COVENANT_ITEM_SIZE: usize = 1024;
pub const MAX_NAME_SIZE: usize = 63;
pub const MAX_RESOURCE_SIZE: usize = 512;

/// Wire type numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum CovenantKind {
    None = 0,
    Claim = 1,
    Open = 2,
    Bid = 3,
    Reveal = 4,
    Redeem = 5,
    Register = 6,
    Update = 7,
    Renew = 8,
    Transfer = 9,
    Finalize = 10,
    Revoke = 11,
}

impl CovenantKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::None,
            1 => Self::Claim,
            2 => Self::Open,
            3 => Self::Bid,
            4 => Self::Reveal,
            5 => Self::Redeem,
            6 => Self::Register,
            7 => Self::Update,
            8 => Self::Renew,
            9 => Self::Transfer,
            10 => Self::Finalize,
            11 => Self::Revoke,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Claim => "CLAIM",
            Self::Open => "OPEN",
            Self::Bid => "BID",
            Self::Reveal => "REVEAL",
            Self::Redeem => "REDEEM",
            Self::Register => "REGISTER",
            Self::Update => "UPDATE",
            Self::Renew => "RENEW",
            Self::Transfer => "TRANSFER",
            Self::Finalize => "FINALIZE",
            Self::Revoke => "REVOKE",
        }
    }
}

impl fmt::Display for CovenantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Covenant attached to a transaction output.
///
/// `height` is the auction (or claim) start height the covenant is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Covenant {
    None,
    Claim { name_hash: Hash, height: u32, name: String, flags: u8, commit_hash: Hash, commit_height: u32 },
    Open { name_hash: Hash, height: u32, name: String },
    Bid { name_hash: Hash, height: u32, name: String, blind: Hash },
    Reveal { name_hash: Hash, height: u32, nonce: Hash },
    Redeem { name_hash: Hash, height: u32 },
    Register { name_hash: Hash, height: u32, resource: Vec<u8> },
    Update { name_hash: Hash, height: u32, resource: Vec<u8> },
    Renew { name_hash: Hash, height: u32 },
    Transfer { name_hash: Hash, height: u32, address: Address },
    Finalize { name_hash: Hash, height: u32, name: String, flags: u8, claimed: u32, renewals: u32 },
    Revoke { name_hash: Hash, height: u32 },
}

impl Default for Covenant {
    fn default() -> Self {
        Covenant::None
    }
}

impl Covenant {
    pub fn kind(&self) -> CovenantKind {
        match self {
            Covenant::None => CovenantKind::None,
            Covenant::Claim { .. } => CovenantKind::Claim,
            Covenant::Open { .. } => CovenantKind::Open,
            Covenant::Bid { .. } => CovenantKind::Bid,
            Covenant::Reveal { .. } => CovenantKind::Reveal,
            Covenant::Redeem { .. } => CovenantKind::Redeem,
            Covenant::Register { .. } => CovenantKind::Register,
            Covenant::Update { .. } => CovenantKind::Update,
            Covenant::Renew { .. } => CovenantKind::Renew,
            Covenant::Transfer { .. } => CovenantKind::Transfer,
            Covenant::Finalize { .. } => CovenantKind::Finalize,
            Covenant::Revoke { .. } => CovenantKind::Revoke,
        }
    }

    pub fn is_name(&self) -> bool {
        !matches!(self, Covenant::None)
    }

    /// REVOKE outputs are burned and never enter the UTXO set.
    pub fn is_unspendable(&self) -> bool {
        matches!(self, Covenant::Revoke { .. })
    }

    pub fn name_hash(&self) -> Option<&Hash> {
        match self {
            Covenant::None => None,
            Covenant::Claim { name_hash, .. }
            | Covenant::Open { name_hash, .. }
            | Covenant::Bid { name_hash, .. }
            | Covenant::Reveal { name_hash, .. }
            | Covenant::Redeem { name_hash, .. }
            | Covenant::Register { name_hash, .. }
            | Covenant::Update { name_hash, .. }
            | Covenant::Renew { name_hash, .. }
            | Covenant::Transfer { name_hash, .. }
            | Covenant::Finalize { name_hash, .. }
            | Covenant::Revoke { name_hash, .. } => Some(name_hash),
        }
    }

    pub fn height(&self) -> Option<u32> {
        match self {
            Covenant::None => None,
            Covenant::Claim { height, .. }
            | Covenant::Open { height, .. }
            | Covenant::Bid { height, .. }
            | Covenant::Reveal { height, .. }
            | Covenant::Redeem { height, .. }
            | Covenant::Register { height, .. }
            | Covenant::Update { height, .. }
            | Covenant::Renew { height, .. }
            | Covenant::Transfer { height, .. }
            | Covenant::Finalize { height, .. }
            | Covenant::Revoke { height, .. } => Some(*height),
        }
    }

    /// Raw name carried by CLAIM, OPEN, BID and FINALIZE.
    pub fn name(&self) -> Option<&str> {
        match self {
            Covenant::Claim { name, .. }
            | Covenant::Open { name, .. }
            | Covenant::Bid { name, .. }
            | Covenant::Finalize { name, .. } => Some(name),
            _ => None,
        }
    }

    fn items(&self) -> Vec<Vec<u8>> {
        let mut items = Items::default();
        match self {
            Covenant::None => {}
            Covenant::Claim { name_hash, height, name, flags, commit_hash, commit_height } => {
                items.push(name_hash).push(height).push(name).push(flags).push(commit_hash).push(commit_height);
            }
            Covenant::Open { name_hash, height, name } => {
                items.push(name_hash).push(height).push(name);
            }
            Covenant::Bid { name_hash, height, name, blind } => {
                items.push(name_hash).push(height).push(name).push(blind);
            }
            Covenant::Reveal { name_hash, height, nonce } => {
                items.push(name_hash).push(height).push(nonce);
            }
            Covenant::Redeem { name_hash, height }
            | Covenant::Renew { name_hash, height }
            | Covenant::Revoke { name_hash, height } => {
                items.push(name_hash).push(height);
            }
            Covenant::Register { name_hash, height, resource }
            | Covenant::Update { name_hash, height, resource } => {
                items.push(name_hash).push(height).push(resource);
            }
            Covenant::Transfer { name_hash, height, address } => {
                items.push(name_hash).push(height).push(&address.version).push(&address.hash);
            }
            Covenant::Finalize { name_hash, height, name, flags, claimed, renewals } => {
                items.push(name_hash).push(height).push(name).push(flags).push(claimed).push(renewals);
            }
        }
        items.0
    }

    fn from_items(kind: CovenantKind, items: Vec<Vec<u8>>) -> Result<Self, CodecError> {
        let mut r = ItemReader { items, pos: 0 };
        let cov = match kind {
            CovenantKind::None => Covenant::None,
            CovenantKind::Claim => Covenant::Claim {
                name_hash: r.next("name hash")?,
                height: r.next("height")?,
                name: r.next("name")?,
                flags: r.next("flags")?,
                commit_hash: r.next("commit hash")?,
                commit_height: r.next("commit height")?,
            },
            CovenantKind::Open => Covenant::Open {
                name_hash: r.next("name hash")?,
                height: r.next("height")?,
                name: r.next("name")?,
            },
            CovenantKind::Bid => Covenant::Bid {
                name_hash: r.next("name hash")?,
                height: r.next("height")?,
                name: r.next("name")?,
                blind: r.next("blind")?,
            },
            CovenantKind::Reveal => Covenant::Reveal {
                name_hash: r.next("name hash")?,
                height: r.next("height")?,
                nonce: r.next("nonce")?,
            },
            CovenantKind::Redeem => Covenant::Redeem { name_hash: r.next("name hash")?, height: r.next("height")? },
            CovenantKind::Register => Covenant::Register {
                name_hash: r.next("name hash")?,
                height: r.next("height")?,
                resource: r.next("resource")?,
            },
            CovenantKind::Update => Covenant::Update {
                name_hash: r.next("name hash")?,
                height: r.next("height")?,
                resource: r.next("resource")?,
            },
            CovenantKind::Renew => Covenant::Renew { name_hash: r.next("name hash")?, height: r.next("height")? },
            CovenantKind::Transfer => {
                let name_hash = r.next("name hash")?;
                let height = r.next("height")?;
                let version: u8 = r.next("address version")?;
                let hash: Vec<u8> = r.next("address hash")?;
                let address = Address { version, hash };
                if !address.is_valid() {
                    return Err(CodecError::Invalid { field: "transfer address", reason: address.to_string() });
                }
                Covenant::Transfer { name_hash, height, address }
            }
            CovenantKind::Finalize => Covenant::Finalize {
                name_hash: r.next("name hash")?,
                height: r.next("height")?,
                name: r.next("name")?,
                flags: r.next("flags")?,
                claimed: r.next("claimed")?,
                renewals: r.next("renewals")?,
            },
            CovenantKind::Revoke => Covenant::Revoke { name_hash: r.next("name hash")?, height: r.next("height")? },
        };
        r.finish(kind)?;
        Ok(cov)
    }
}

impl Encodable for Covenant {
    fn encode_into(&self, w: &mut Writer) {
        w.write_u8(self.kind() as u8);
        let items = self.items();
        w.write_varint(items.len() as u64);
        for item in &items {
            w.write_var_bytes(item);
        }
    }
}

impl Decodable for Covenant {
    fn decode_from(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let ty = r.read_u8()?;
        let kind = CovenantKind::from_u8(ty).ok_or(CodecError::UnknownCovenant(ty))?;
        let count = r.read_count("covenant items", MAX_COVENANT_ITEMS)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(r.read_var_bytes("covenant item", MAX_COVENANT_ITEM_SIZE)?);
        }
        Covenant::from_items(kind, items)
    }
}

/// Field types that can appear as a covenant item.
trait Item: Sized {
    fn to_item(&self) -> Vec<u8>;
    fn from_item(field: &'static str, bytes: Vec<u8>) -> Result<Self, CodecError>;
}

fn exact<const N: usize>(field: &'static str, bytes: &[u8]) -> Result<[u8; N], CodecError> {
    bytes.try_into().map_err(|_| CodecError::Invalid {
        field,
        reason: format!("expected {} bytes, got {}", N, bytes.len()),
    })
}

impl Item for Hash {
    fn to_item(&self) -> Vec<u8> {
        self.to_vec()
    }
    fn from_item(field: &'static str, bytes: Vec<u8>) -> Result<Self, CodecError> {
        exact::<32>(field, &bytes)
    }
}

impl Item for u32 {
    fn to_item(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
    fn from_item(field: &'static str, bytes: Vec<u8>) -> Result<Self, CodecError> {
        Ok(u32::from_le_bytes(exact::<4>(field, &bytes)?))
    }
}

impl Item for u8 {
    fn to_item(&self) -> Vec<u8> {
        vec![*self]
    }
    fn from_item(field: &'static str, bytes: Vec<u8>) -> Result<Self, CodecError> {
        Ok(exact::<1>(field, &bytes)?[0])
    }
}

impl Item for String {
    fn to_item(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
    fn from_item(field: &'static str, bytes: Vec<u8>) -> Result<Self, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::TooShort { field, len: 0, min: 1 });
        }
        if bytes.len() > MAX_NAME_SIZE {
            return Err(CodecError::TooLong { field, len: bytes.len(), max: MAX_NAME_SIZE });
        }
        if !bytes.is_ascii() {
            return Err(CodecError::Invalid { field, reason: "non-ascii name".into() });
        }
        String::from_utf8(bytes).map_err(|e| CodecError::Invalid { field, reason: e.to_string() })
    }
}

impl Item for Vec<u8> {
    fn to_item(&self) -> Vec<u8> {
        self.clone()
    }
    fn from_item(field: &'static str, bytes: Vec<u8>) -> Result<Self, CodecError> {
        if bytes.len() > MAX_RESOURCE_SIZE {
            return Err(CodecError::TooLong { field, len: bytes.len(), max: MAX_RESOURCE_SIZE });
        }
        Ok(bytes)
    }
}

#[derive(Default)]
struct Items(Vec<Vec<u8>>);

impl Items {
    fn push<T: Item>(&mut self, value: &T) -> &mut Self {
        self.0.push(value.to_item());
        self
    }
}

struct ItemReader {
    items: Vec<Vec<u8>>,
    pos: usize,
}

impl ItemReader {
    fn next<T: Item>(&mut self, field: &'static str) -> Result<T, CodecError> {
        let item = self.items.get_mut(self.pos).ok_or_else(|| CodecError::Invalid {
            field: "covenant items",
            reason: format!("missing {}", field),
        })?;
        self.pos += 1;
        T::from_item(field, std::mem::take(item))
    }

    fn finish(&self, kind: CovenantKind) -> Result<(), CodecError> {
        if self.pos != self.items.len() {
            return Err(CodecError::Invalid {
                field: "covenant items",
                reason: format!("{} expects {} items, got {}", kind, self.pos, self.items.len()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_is_rejected() {
        assert_eq!(Covenant::decode(&[12, 0]), Err(CodecError::UnknownCovenant(12)));
    }

    #[test]
    fn extra_item_is_rejected() {
        let cov = Covenant::Redeem { name_hash: [3u8; 32], height: 9 };
        let mut bytes = cov.encode();
        bytes[1] = 3;
        bytes.extend_from_slice(&[1, 0xaa]);
        assert!(matches!(Covenant::decode(&bytes), Err(CodecError::Invalid { .. })));
    }

    #[test]
    fn transfer_carries_address() {
        let cov = Covenant::Transfer {
            name_hash: [1u8; 32],
            height: 4,
            address: Address { version: 0, hash: vec![9u8; 20] },
        };
        let decoded = Covenant::decode(&cov.encode()).unwrap();
        assert_eq!(decoded, cov);
        assert_eq!(decoded.kind(), CovenantKind::Transfer);
    }

    #[test]
    fn width_mismatch_is_rejected() {
        // OPEN with a 3-byte height item
        let mut w = Writer::new();
        w.write_u8(CovenantKind::Open as u8);
        w.write_varint(3);
        w.write_var_bytes(&[0u8; 32]);
        w.write_var_bytes(&[0u8; 3]);
        w.write_var_bytes(b"name");
        assert!(matches!(Covenant::decode(&w.into_inner()), Err(CodecError::Invalid { field: "height", .. })));
    }
}
