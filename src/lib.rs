//! Namechain node: configuration loading and bootstrap on top of the
//! library crates.
//!
//! - `config`: layered `NodeConfig` (defaults, TOML file, NAMECHAIN_* env)
//! - `node`: opens the chain and miner for a config, reports status

pub mod config;
pub mod node;

pub use crate::config::{NodeConfig, ENV_PREFIX};
pub use crate::node::{Node, NodeError, NodeStatus, DEFAULT_POOL_SIZE};
