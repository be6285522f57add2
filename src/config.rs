// Node configuration
//
// Layered with the `config` crate: built-in defaults, then an optional TOML
// file, then NAMECHAIN_* environment variables. The binary applies CLI
// flags on top. Consensus parameters are not configurable here; the
// network name selects an immutable `Network` preset.

use crate::node::NodeError;
use config::{Config, Environment, File, FileFormat};
use namechain_chain::{ChainOptions, Network, NetworkKind};
use namechain_core::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const ENV_PREFIX: &str = "NAMECHAIN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// main, testnet or regtest
    pub network: String,

    /// Skip script checks at or below the last checkpoint and pin history
    pub checkpoints: bool,

    /// Default env_logger filter when RUST_LOG is unset
    pub log_level: String,

    /// Hex BLAKE2b-160 of the miner's public key
    #[serde(default)]
    pub miner_address: Option<String>,

    /// Blocks to mine after startup
    pub generate: u32,

    pub max_orphans: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: NetworkKind::Regtest.as_str().to_string(),
            checkpoints: false,
            log_level: "info".to_string(),
            miner_address: None,
            generate: 0,
            max_orphans: ChainOptions::default().max_orphans,
        }
    }
}

impl NodeConfig {
    /// Loads defaults, `path` (if given) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, NodeError> {
        Self::load_with_env(path, None)
    }

    /// Same as `load`, reading environment variables from `env` instead of
    /// the process when it is `Some`.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self, NodeError> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("network", defaults.network)?
            .set_default("checkpoints", defaults.checkpoints)?
            .set_default("log_level", defaults.log_level)?
            .set_default("generate", defaults.generate as i64)?
            .set_default("max_orphans", defaults.max_orphans as i64)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()).format(FileFormat::Toml).required(true));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true).source(env));

        let config: NodeConfig = builder.build()?.try_deserialize()?;
        config.validate().map_err(NodeError::Invalid)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.network_kind()?;
        if self.max_orphans == 0 {
            return Err("max_orphans must be > 0".to_string());
        }
        let address = self.miner_address()?;
        if self.generate > 0 && address.is_none() {
            return Err("miner_address is required to generate blocks".to_string());
        }
        Ok(())
    }

    pub fn network_kind(&self) -> Result<NetworkKind, String> {
        self.network.parse()
    }

    pub fn network(&self) -> Result<Network, String> {
        Ok(Network::from_kind(self.network_kind()?))
    }

    pub fn chain_options(&self) -> ChainOptions {
        ChainOptions { checkpoints: self.checkpoints, max_orphans: self.max_orphans }
    }

    pub fn miner_address(&self) -> Result<Option<Address>, String> {
        let Some(encoded) = &self.miner_address else {
            return Ok(None);
        };
        let hash = hex::decode(encoded).map_err(|e| format!("miner_address: {}", e))?;
        let address = Address { version: 0, hash };
        if !address.is_pubkey_hash() {
            return Err(format!("miner_address must be 20 bytes, got {}", address.hash.len()));
        }
        Ok(Some(address))
    }
}
