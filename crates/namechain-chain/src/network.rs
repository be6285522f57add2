// Network parameters
//
// An immutable value describing one chain: consensus constants, name
// auction parameters, checkpoints and the genesis block. Tests refine a
// preset through the consuming `with_*` builders before handing it to the
// chain; nothing here is mutated after construction.

use namechain_core::block::{compute_merkle_root, compute_witness_root};
use namechain_core::{Address, Block, BlockHeader, Input, Outpoint, Output, Transaction, ZERO_HASH};
use namechain_covenants::NameParams;
use namechain_crypto::Hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const COIN: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkKind {
    Main,
    Testnet,
    Regtest,
}

impl NetworkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkKind::Main => "main",
            NetworkKind::Testnet => "testnet",
            NetworkKind::Regtest => "regtest",
        }
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NetworkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" | "mainnet" => Ok(NetworkKind::Main),
            "testnet" => Ok(NetworkKind::Testnet),
            "regtest" => Ok(NetworkKind::Regtest),
            other => Err(format!("unknown network {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowParams {
    /// Easiest allowed target, compact form
    pub limit_bits: u32,
    /// Seconds between blocks
    pub target_spacing: u64,
    /// Blocks between difficulty adjustments
    pub retarget_interval: u32,
    pub no_retargeting: bool,
    /// Seconds a header may run ahead of the local clock
    pub max_future_drift: u64,
}

impl PowParams {
    pub fn target_timespan(&self) -> u64 {
        self.target_spacing * self.retarget_interval as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub kind: NetworkKind,
    pub pow: PowParams,
    pub names: NameParams,
    /// Height -> expected block hash
    pub checkpoints: BTreeMap<u32, Hash>,
    pub coinbase_maturity: u32,
    pub initial_reward: u64,
    pub halving_interval: u32,
    pub max_block_weight: u64,
    /// Root of the airdrop merkle tree
    pub airdrop_root: Hash,
    pub genesis_time: u64,
}

impl Network {
    pub fn main() -> Self {
        Self {
            kind: NetworkKind::Main,
            pow: PowParams {
                limit_bits: 0x1d00_ffff,
                target_spacing: 600,
                retarget_interval: 2016,
                no_retargeting: false,
                max_future_drift: 2 * 60 * 60,
            },
            names: NameParams::main(),
            checkpoints: BTreeMap::new(),
            coinbase_maturity: 100,
            initial_reward: 2_000 * COIN,
            halving_interval: 170_000,
            max_block_weight: 4_000_000,
            airdrop_root: ZERO_HASH,
            genesis_time: 1_580_745_078,
        }
    }

    pub fn testnet() -> Self {
        Self {
            kind: NetworkKind::Testnet,
            pow: PowParams {
                limit_bits: 0x1f00_ffff,
                target_spacing: 600,
                retarget_interval: 2016,
                no_retargeting: false,
                max_future_drift: 2 * 60 * 60,
            },
            names: NameParams::testnet(),
            coinbase_maturity: 100,
            halving_interval: 170_000,
            genesis_time: 1_580_745_079,
            ..Self::main()
        }
    }

    pub fn regtest() -> Self {
        Self {
            kind: NetworkKind::Regtest,
            pow: PowParams {
                limit_bits: 0x207f_ffff,
                target_spacing: 600,
                retarget_interval: 2016,
                no_retargeting: true,
                max_future_drift: 2 * 60 * 60,
            },
            names: NameParams::regtest(),
            coinbase_maturity: 2,
            halving_interval: 2_500,
            genesis_time: 1_580_745_080,
            ..Self::main()
        }
    }

    pub fn from_kind(kind: NetworkKind) -> Self {
        match kind {
            NetworkKind::Main => Self::main(),
            NetworkKind::Testnet => Self::testnet(),
            NetworkKind::Regtest => Self::regtest(),
        }
    }

    pub fn with_checkpoints(mut self, checkpoints: BTreeMap<u32, Hash>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn with_checkpoint(mut self, height: u32, hash: Hash) -> Self {
        self.checkpoints.insert(height, hash);
        self
    }

    pub fn with_names(mut self, names: NameParams) -> Self {
        self.names = names;
        self
    }

    pub fn with_airdrop_root(mut self, root: Hash) -> Self {
        self.airdrop_root = root;
        self
    }

    pub fn with_coinbase_maturity(mut self, maturity: u32) -> Self {
        self.coinbase_maturity = maturity;
        self
    }

    /// Height of the highest configured checkpoint.
    pub fn last_checkpoint(&self) -> u32 {
        self.checkpoints.keys().next_back().copied().unwrap_or(0)
    }

    /// Block subsidy at `height`.
    pub fn subsidy(&self, height: u32) -> u64 {
        let halvings = height / self.halving_interval.max(1);
        if halvings >= 64 {
            return 0;
        }
        self.initial_reward >> halvings
    }

    pub fn genesis_block(&self) -> Block {
        let mut coinbase = Transaction::new(
            vec![Input::new(Outpoint::null())],
            vec![Output::new(0, Address::null_data(self.kind.as_str().as_bytes()))],
        );
        coinbase.inputs[0].witness = vec![b"namechain genesis".to_vec()];
        let txs = vec![coinbase];
        let header = BlockHeader {
            version: 0,
            prev_block: ZERO_HASH,
            merkle_root: compute_merkle_root(&txs),
            witness_root: compute_witness_root(&txs),
            tree_root: ZERO_HASH,
            reserved_root: ZERO_HASH,
            time: self.genesis_time,
            bits: self.pow.limit_bits,
            nonce: 0,
            extra_nonce: 0,
        };
        Block { header, txs }
    }

    /// Validates internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        self.names.validate()?;
        if self.halving_interval == 0 {
            return Err("halving_interval must be > 0".to_string());
        }
        if self.pow.target_spacing == 0 || self.pow.retarget_interval == 0 {
            return Err("target_spacing and retarget_interval must be > 0".to_string());
        }
        if crate::pow::compact_to_target(self.pow.limit_bits).is_none() {
            return Err(format!("invalid pow limit {:08x}", self.pow.limit_bits));
        }
        if self.checkpoints.contains_key(&0) {
            return Err("genesis cannot be a checkpoint".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        for network in [Network::main(), Network::testnet(), Network::regtest()] {
            assert!(network.validate().is_ok(), "{}", network.kind);
        }
    }

    #[test]
    fn genesis_is_deterministic_and_per_network() {
        assert_eq!(Network::regtest().genesis_block().hash(), Network::regtest().genesis_block().hash());
        assert_ne!(Network::regtest().genesis_block().hash(), Network::main().genesis_block().hash());
    }

    #[test]
    fn builders_do_not_touch_presets() {
        let custom = Network::regtest().with_checkpoint(5, [1u8; 32]);
        assert_eq!(custom.last_checkpoint(), 5);
        assert!(Network::regtest().checkpoints.is_empty());
    }

    #[test]
    fn subsidy_halves() {
        let network = Network::regtest();
        assert_eq!(network.subsidy(0), network.initial_reward);
        assert_eq!(network.subsidy(2_500), network.initial_reward / 2);
        assert_eq!(network.subsidy(2_500 * 64), 0);
    }
}
