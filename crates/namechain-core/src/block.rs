// Block header and block body

use crate::encoding::{CodecError, Decodable, Encodable, Reader, Writer};
use crate::transaction::Transaction;
use namechain_crypto::{blake2b256, merkle_root, Hash};
use serde::{Deserialize, Serialize};

pub const HEADER_SIZE: usize = 188;
pub const MAX_BLOCK_TXS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    /// Hash of the parent header
    pub prev_block: Hash,
    /// Merkle root over txids
    pub merkle_root: Hash,
    /// Merkle root over wtxids
    pub witness_root: Hash,
    /// Last committed name-tree root
    pub tree_root: Hash,
    pub reserved_root: Hash,
    /// Seconds since the unix epoch
    pub time: u64,
    /// Compact proof-of-work target
    pub bits: u32,
    pub nonce: u32,
    pub extra_nonce: u64,
}

impl BlockHeader {
    pub fn hash(&self) -> Hash {
        blake2b256(&self.encode())
    }
}

impl Encodable for BlockHeader {
    fn encode_into(&self, w: &mut Writer) {
        w.write_u32(self.version);
        w.write_hash(&self.prev_block);
        w.write_hash(&self.merkle_root);
        w.write_hash(&self.witness_root);
        w.write_hash(&self.tree_root);
        w.write_hash(&self.reserved_root);
        w.write_u64(self.time);
        w.write_u32(self.bits);
        w.write_u32(self.nonce);
        w.write_u64(self.extra_nonce);
    }
}

impl Decodable for BlockHeader {
    fn decode_from(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            version: r.read_u32()?,
            prev_block: r.read_hash()?,
            merkle_root: r.read_hash()?,
            witness_root: r.read_hash()?,
            tree_root: r.read_hash()?,
            reserved_root: r.read_hash()?,
            time: r.read_u64()?,
            bits: r.read_u32()?,
            nonce: r.read_u32()?,
            extra_nonce: r.read_u64()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn prev_block(&self) -> &Hash {
        &self.header.prev_block
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.txs.first().filter(|tx| tx.is_coinbase())
    }

    pub fn compute_merkle_root(&self) -> Hash {
        compute_merkle_root(&self.txs)
    }

    pub fn compute_witness_root(&self) -> Hash {
        compute_witness_root(&self.txs)
    }

    pub fn weight(&self) -> u64 {
        HEADER_SIZE as u64 * 4 + 4 + self.txs.iter().map(Transaction::weight).sum::<u64>()
    }
}

pub fn compute_merkle_root(txs: &[Transaction]) -> Hash {
    let ids: Vec<Hash> = txs.iter().map(Transaction::txid).collect();
    merkle_root(&ids)
}

pub fn compute_witness_root(txs: &[Transaction]) -> Hash {
    let ids: Vec<Hash> = txs.iter().map(Transaction::wtxid).collect();
    merkle_root(&ids)
}

impl Encodable for Block {
    fn encode_into(&self, w: &mut Writer) {
        self.header.encode_into(w);
        w.write_varint(self.txs.len() as u64);
        for tx in &self.txs {
            tx.encode_into(w);
        }
    }
}

impl Decodable for Block {
    fn decode_from(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let header = BlockHeader::decode_from(r)?;
        let n = r.read_count("transactions", MAX_BLOCK_TXS)?;
        let mut txs = Vec::with_capacity(n.min(1024));
        for _ in 0..n {
            txs.push(Transaction::decode_from(r)?);
        }
        Ok(Self { header, txs })
    }
}
