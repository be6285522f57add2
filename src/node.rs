// Node bootstrap
//
// Wires a configured `Network` and in-memory store into a `Chain`, and a
// `Miner` on top of it when a miner address is configured.

use crate::config::NodeConfig;
use log::info;
use namechain_chain::{AcceptingClaimVerifier, Chain, ChainError, ClaimVerifier};
use namechain_covenants::{hash_name, NameStatus};
use namechain_mining::{Miner, MinerError, TxPool};
use namechain_state::{KvStore, MemoryStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_POOL_SIZE: usize = 10_000;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("chain: {0}")]
    Chain(#[from] ChainError),

    #[error("miner: {0}")]
    Miner(#[from] MinerError),

    #[error("no miner address configured")]
    NoMiner,
}

/// Tip summary printed by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub network: String,
    pub height: u32,
    pub tip: String,
    pub tx_count: u64,
    pub coin_count: u64,
    pub value: u64,
    pub burned: u64,
    pub utxo_root: String,
    pub tree_root: String,
    pub orphans: usize,
}

pub struct Node {
    config: NodeConfig,
    chain: Arc<Chain>,
    miner: Option<Miner>,
}

impl Node {
    /// Starts a node on a fresh in-memory store.
    pub async fn start(config: NodeConfig) -> Result<Self, NodeError> {
        Self::start_with(config, Arc::new(MemoryStore::new()), Arc::new(AcceptingClaimVerifier)).await
    }

    pub async fn start_with(
        config: NodeConfig,
        store: Arc<dyn KvStore>,
        claims: Arc<dyn ClaimVerifier>,
    ) -> Result<Self, NodeError> {
        config.validate().map_err(NodeError::Invalid)?;
        let network = config.network().map_err(NodeError::Invalid)?;
        let chain = Arc::new(Chain::open(store, network, config.chain_options(), claims).await?);
        let miner = config
            .miner_address()
            .map_err(NodeError::Invalid)?
            .map(|address| Miner::new(chain.clone(), TxPool::new(DEFAULT_POOL_SIZE), address));

        info!(
            "node started on {} at height {} (checkpoints {})",
            config.network,
            chain.height().await,
            if config.checkpoints { "on" } else { "off" }
        );
        Ok(Self { config, chain, miner })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    pub fn miner(&self) -> Option<&Miner> {
        self.miner.as_ref()
    }

    /// Mines `count` blocks to the configured address.
    pub async fn generate(&self, count: u32) -> Result<u32, NodeError> {
        let miner = self.miner.as_ref().ok_or(NodeError::NoMiner)?;
        let blocks = miner.mine_blocks(count).await?;
        info!("generated {} blocks, height {}", blocks.len(), self.chain.height().await);
        Ok(blocks.len() as u32)
    }

    pub async fn status(&self) -> NodeStatus {
        let snapshot = self.chain.snapshot().await;
        NodeStatus {
            network: self.chain.network().kind.to_string(),
            height: snapshot.tip.height,
            tip: hex::encode(snapshot.tip.hash),
            tx_count: snapshot.state.tx_count,
            coin_count: snapshot.state.coin_count,
            value: snapshot.state.value,
            burned: snapshot.state.burned,
            utxo_root: hex::encode(snapshot.state.utxo_root()),
            tree_root: hex::encode(snapshot.state.tree_root),
            orphans: self.chain.orphan_count().await,
        }
    }

    /// Status of `name` at the next block height.
    pub async fn name_status(&self, name: &str) -> Result<Option<NameStatus>, NodeError> {
        let height = self.chain.height().await + 1;
        Ok(self.chain.get_name_status(&hash_name(name), height).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mining_config() -> NodeConfig {
        NodeConfig { miner_address: Some(hex::encode([4u8; 20])), ..NodeConfig::default() }
    }

    #[tokio::test]
    async fn generates_and_reports_status() {
        let node = Node::start(mining_config()).await.unwrap();
        assert_eq!(node.generate(3).await.unwrap(), 3);

        let status = node.status().await;
        assert_eq!(status.network, "regtest");
        assert_eq!(status.height, 3);
        assert_eq!(status.tip, hex::encode(node.chain().tip().await.hash));
        assert_eq!(status.coin_count, 3);
        assert!(node.name_status("example").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn generate_needs_a_miner() {
        let node = Node::start(NodeConfig::default()).await.unwrap();
        assert!(matches!(node.generate(1).await, Err(NodeError::NoMiner)));
    }
}
