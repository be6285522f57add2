// Shared fixtures for the end-to-end tests: a deterministic wallet and a
// chain + miner harness.

#![allow(dead_code)]

use namechain_chain::{AcceptingClaimVerifier, Chain, ChainError, ChainOptions, Network};
use namechain_core::{Address, Block, Covenant, Input, Outpoint, Output, Transaction};
use namechain_covenants::{create_blind, hash_name, NameParams};
use namechain_crypto::{Hash, Keypair};
use namechain_mining::{Miner, MinerError, TxPool};
use namechain_state::MemoryStore;
use std::sync::Arc;

/// ed25519 wallet derived from a fixed seed.
pub struct Wallet {
    keypair: Keypair,
    pub address: Address,
}

impl Wallet {
    pub fn new(seed: u8) -> Self {
        let keypair = Keypair::from_seed([seed; 32]);
        let address = Address::from_public_key(&keypair.public_key());
        Self { keypair, address }
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Signs every input; `values[i]` is the value of the coin input i spends.
    pub fn sign(&self, tx: &mut Transaction, values: &[u64]) {
        for (i, value) in values.iter().enumerate() {
            let digest = tx.signature_hash(i, *value);
            tx.inputs[i].witness = vec![self.keypair.sign(&digest).to_vec(), self.keypair.public_key().to_vec()];
        }
    }

    /// A signed one-input transaction.
    pub fn spend(&self, prevout: Outpoint, value: u64, outputs: Vec<Output>) -> Transaction {
        let mut tx = Transaction::new(vec![Input::new(prevout)], outputs);
        self.sign(&mut tx, &[value]);
        tx
    }

    pub fn output(&self, value: u64, covenant: Covenant) -> Output {
        Output::with_covenant(value, self.address.clone(), covenant)
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub chain: Arc<Chain>,
    pub miner: Miner,
}

impl Harness {
    pub async fn open(network: Network, options: ChainOptions, payout: &Address) -> Self {
        let store = Arc::new(MemoryStore::new());
        let chain = Chain::open(store.clone(), network, options, Arc::new(AcceptingClaimVerifier))
            .await
            .unwrap();
        let chain = Arc::new(chain);
        let miner = Miner::new(chain.clone(), TxPool::new(1_000), payout.clone());
        Self { store, chain, miner }
    }

    /// Another miner on the same chain paying `payout`.
    pub fn miner_for(&self, payout: &Address) -> Miner {
        Miner::new(self.chain.clone(), TxPool::new(1_000), payout.clone())
    }

    pub async fn mine(&self, count: u32) -> Vec<Block> {
        self.miner.mine_blocks(count).await.unwrap()
    }

    /// Mines one block holding exactly `txs`, bypassing the pool.
    pub async fn mine_txs(&self, txs: Vec<(Transaction, u64)>) -> Result<Block, MinerError> {
        let mut job = self.miner.create_job().await?;
        for (tx, fee) in txs {
            job.push_tx(tx, fee)?;
        }
        let (block, _) = self.miner.submit_job(job).await?;
        Ok(block)
    }

    /// Mines until the tip is at `height`.
    pub async fn mine_to(&self, height: u32) {
        let tip = self.chain.height().await;
        if height > tip {
            self.mine(height - tip).await;
        }
    }

    pub async fn height(&self) -> u32 {
        self.chain.height().await
    }

    /// Every block on the active chain above genesis.
    pub async fn blocks(&self) -> Vec<Block> {
        let mut blocks = Vec::new();
        for height in 1..=self.height().await {
            let hash = self.chain.get_hash(height).await.unwrap();
            blocks.push(self.chain.get_block(&hash).await.unwrap().unwrap());
        }
        blocks
    }
}

pub fn chain_error(err: MinerError) -> ChainError {
    match err {
        MinerError::Chain(err) => err,
        other => panic!("expected a chain error, got {other:?}"),
    }
}

/// Regtest with a one-block opening period so bidding starts right after OPEN.
pub fn auction_network() -> Network {
    let mut names = NameParams::regtest();
    names.tree_interval = 1;
    Network::regtest().with_names(names)
}

pub fn open_covenant(name: &str) -> Covenant {
    Covenant::Open { name_hash: hash_name(name), height: 0, name: name.to_string() }
}

pub fn bid_covenant(name: &str, auction: u32, value: u64, nonce: &Hash) -> Covenant {
    Covenant::Bid {
        name_hash: hash_name(name),
        height: auction,
        name: name.to_string(),
        blind: create_blind(value, nonce),
    }
}

pub fn reveal_covenant(name: &str, auction: u32, nonce: &Hash) -> Covenant {
    Covenant::Reveal { name_hash: hash_name(name), height: auction, nonce: *nonce }
}

pub fn register_covenant(name: &str, auction: u32) -> Covenant {
    Covenant::Register { name_hash: hash_name(name), height: auction, resource: Vec::new() }
}

pub fn redeem_covenant(name: &str, auction: u32) -> Covenant {
    Covenant::Redeem { name_hash: hash_name(name), height: auction }
}
