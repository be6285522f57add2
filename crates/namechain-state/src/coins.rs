// Unspent coins

use namechain_core::{Encodable, Outpoint, Output, Writer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub output: Output,
    /// Height of the block that created the coin
    pub height: u32,
    pub coinbase: bool,
}

impl Coin {
    pub fn new(output: Output, height: u32, coinbase: bool) -> Self {
        Self { output, height, coinbase }
    }

    pub fn value(&self) -> u64 {
        self.output.value
    }

    /// Member bytes fed into the UTXO set commitment.
    pub fn commitment_bytes(&self, outpoint: &Outpoint) -> Vec<u8> {
        let mut w = Writer::with_capacity(96);
        outpoint.encode_into(&mut w);
        self.output.encode_into(&mut w);
        w.write_u32(self.height);
        w.write_u8(self.coinbase as u8);
        w.into_inner()
    }
}
