// Transactions
//
// The txid commits to everything except witnesses; the wtxid commits to the
// full encoding. Weight counts base bytes four times and witness bytes once.

use crate::covenant::Covenant;
use crate::encoding::{CodecError, Decodable, Encodable, Reader, Writer};
use crate::types::{Address, Outpoint};
use namechain_crypto::{blake2b256, blake2b256_parts, Hash};
use serde::{Deserialize, Serialize};

pub const MAX_TX_INPUTS: usize = 10_000;
pub const MAX_TX_OUTPUTS: usize = 10_000;
pub const MAX_WITNESS_ITEMS: usize = 64;
pub const MAX_WITNESS_ITEM_SIZE: usize = 16_384;

/// Upper bound on any single value or sum of values, in base units.
pub const MAX_MONEY: u64 = 2_040_000_000 * 1_000_000;

pub const WITNESS_SCALE_FACTOR: u64 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub prevout: Outpoint,
    pub sequence: u32,
    pub witness: Vec<Vec<u8>>,
}

impl Input {
    pub fn new(prevout: Outpoint) -> Self {
        Self { prevout, sequence: u32::MAX, witness: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub value: u64,
    pub address: Address,
    pub covenant: Covenant,
}

impl Output {
    pub fn new(value: u64, address: Address) -> Self {
        Self { value, address, covenant: Covenant::None }
    }

    pub fn with_covenant(value: u64, address: Address, covenant: Covenant) -> Self {
        Self { value, address, covenant }
    }

    /// Null-data and REVOKE outputs never enter the UTXO set.
    pub fn is_unspendable(&self) -> bool {
        self.address.is_null_data() || self.covenant.is_unspendable()
    }
}

impl Encodable for Output {
    fn encode_into(&self, w: &mut Writer) {
        w.write_u64(self.value);
        self.address.encode_into(w);
        self.covenant.encode_into(w);
    }
}

impl Decodable for Output {
    fn decode_from(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            value: r.read_u64()?,
            address: Address::decode_from(r)?,
            covenant: Covenant::decode_from(r)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub locktime: u32,
}

impl Transaction {
    pub fn new(inputs: Vec<Input>, outputs: Vec<Output>) -> Self {
        Self { version: 0, inputs, outputs, locktime: 0 }
    }

    /// The first input of a coinbase spends the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.first().map_or(false, |input| input.prevout.is_null())
    }

    fn encode_base(&self, w: &mut Writer) {
        w.write_u32(self.version);
        w.write_varint(self.inputs.len() as u64);
        for input in &self.inputs {
            input.prevout.encode_into(w);
            w.write_u32(input.sequence);
        }
        w.write_varint(self.outputs.len() as u64);
        for output in &self.outputs {
            output.encode_into(w);
        }
        w.write_u32(self.locktime);
    }

    fn encode_witness(&self, w: &mut Writer) {
        for input in &self.inputs {
            w.write_varint(input.witness.len() as u64);
            for item in &input.witness {
                w.write_var_bytes(item);
            }
        }
    }

    pub fn base_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode_base(&mut w);
        w.into_inner()
    }

    pub fn txid(&self) -> Hash {
        blake2b256(&self.base_bytes())
    }

    pub fn wtxid(&self) -> Hash {
        blake2b256(&self.encode())
    }

    pub fn base_size(&self) -> usize {
        self.base_bytes().len()
    }

    pub fn size(&self) -> usize {
        self.encode().len()
    }

    pub fn weight(&self) -> u64 {
        let base = self.base_size() as u64;
        let total = self.size() as u64;
        base * (WITNESS_SCALE_FACTOR - 1) + total
    }

    pub fn output_value(&self) -> Option<u64> {
        self.outputs.iter().try_fold(0u64, |acc, o| acc.checked_add(o.value))
    }

    /// Digest signed by the owner of the coin spent at `index`.
    pub fn signature_hash(&self, index: usize, spent_value: u64) -> Hash {
        let txid = self.txid();
        blake2b256_parts(&[&txid, &(index as u32).to_le_bytes(), &spent_value.to_le_bytes()])
    }

    pub fn outpoint(&self, index: u32) -> Outpoint {
        Outpoint::new(self.txid(), index)
    }
}

impl Encodable for Transaction {
    fn encode_into(&self, w: &mut Writer) {
        self.encode_base(w);
        self.encode_witness(w);
    }
}

impl Decodable for Transaction {
    fn decode_from(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let version = r.read_u32()?;
        let n_in = r.read_count("inputs", MAX_TX_INPUTS)?;
        let mut inputs = Vec::with_capacity(n_in);
        for _ in 0..n_in {
            let prevout = Outpoint::decode_from(r)?;
            let sequence = r.read_u32()?;
            inputs.push(Input { prevout, sequence, witness: Vec::new() });
        }
        let n_out = r.read_count("outputs", MAX_TX_OUTPUTS)?;
        let mut outputs = Vec::with_capacity(n_out);
        for _ in 0..n_out {
            outputs.push(Output::decode_from(r)?);
        }
        let locktime = r.read_u32()?;
        for input in &mut inputs {
            let n = r.read_count("witness items", MAX_WITNESS_ITEMS)?;
            for _ in 0..n {
                input.witness.push(r.read_var_bytes("witness item", MAX_WITNESS_ITEM_SIZE)?);
            }
        }
        Ok(Self { version, inputs, outputs, locktime })
    }
}
