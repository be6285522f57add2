// Block template job
//
// A job is a candidate block under construction on a fixed parent. Pushes
// accumulate transactions and credentials; `refresh` rebuilds the coinbase,
// commitments and template after the contents change. Proof-of-work search
// runs on the blocking pool so async callers are never stalled.

use crate::error::MinerError;
use log::{debug, info};
use namechain_chain::{meets_target, Network, TipSnapshot, BLOCK_VERSION};
use namechain_core::block::{compute_merkle_root, compute_witness_root};
use namechain_core::{
    Address, AirdropProof, Block, BlockHeader, Claim, Encodable, Input, Outpoint, Output, Transaction, ZERO_HASH,
};
use namechain_crypto::Hash;
use std::sync::Arc;

/// Weight reserved for the header and coinbase.
pub const COINBASE_RESERVE: u64 = 4_000;

pub struct Job {
    network: Arc<Network>,
    pub prev_block: Hash,
    pub height: u32,
    pub bits: u32,
    pub time: u64,
    pub tree_root: Hash,
    pub address: Address,
    pub extra_nonce: u64,
    txs: Vec<(Transaction, u64)>,
    claims: Vec<Claim>,
    airdrops: Vec<AirdropProof>,
    weight: u64,
    template: Block,
    dirty: bool,
}

impl Job {
    pub fn new(network: Arc<Network>, snapshot: &TipSnapshot, address: Address) -> Self {
        let time = (snapshot.median_time + 1).max(snapshot.tip.time() + network.pow.target_spacing);
        let mut job = Self {
            prev_block: snapshot.tip.hash,
            height: snapshot.next_height(),
            bits: snapshot.next_bits,
            time,
            tree_root: snapshot.state.tree_root,
            address,
            extra_nonce: 0,
            txs: Vec::new(),
            claims: Vec::new(),
            airdrops: Vec::new(),
            weight: COINBASE_RESERVE,
            template: Block { header: empty_header(), txs: Vec::new() },
            dirty: true,
            network,
        };
        job.refresh();
        job
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn tx_count(&self) -> usize {
        self.txs.len()
    }

    /// Transaction and credential fees collected by the coinbase.
    pub fn fees(&self) -> u64 {
        let tx_fees = self.txs.iter().fold(0u64, |acc, (_, fee)| acc.saturating_add(*fee));
        let claim_fees = self.claims.iter().fold(0u64, |acc, c| acc.saturating_add(c.fee));
        let airdrop_fees = self.airdrops.iter().fold(0u64, |acc, a| acc.saturating_add(a.fee));
        tx_fees.saturating_add(claim_fees).saturating_add(airdrop_fees)
    }

    pub fn reward(&self) -> u64 {
        self.network.subsidy(self.height).saturating_add(self.fees())
    }

    fn reserve(&mut self, weight: u64) -> Result<(), MinerError> {
        let total = self.weight + weight;
        if total > self.network.max_block_weight {
            return Err(MinerError::TooHeavy { weight: total, limit: self.network.max_block_weight });
        }
        self.weight = total;
        self.dirty = true;
        Ok(())
    }

    pub fn push_tx(&mut self, tx: Transaction, fee: u64) -> Result<(), MinerError> {
        if tx.is_coinbase() {
            return Err(MinerError::Coinbase);
        }
        let txid = tx.txid();
        if self.txs.iter().any(|(pushed, _)| pushed.txid() == txid) {
            return Err(MinerError::DuplicateTx(hex::encode(txid)));
        }
        self.reserve(tx.weight())?;
        self.txs.push((tx, fee));
        Ok(())
    }

    pub fn push_claim(&mut self, claim: Claim) -> Result<(), MinerError> {
        if self.claims.iter().any(|c| c.name == claim.name) {
            return Err(MinerError::DuplicateClaim(claim.name));
        }
        // Input witness plus output, counted at full weight.
        self.reserve(claim.encode().len() as u64 * 4 + 256)?;
        self.claims.push(claim);
        Ok(())
    }

    pub fn push_airdrop(&mut self, proof: AirdropProof) -> Result<(), MinerError> {
        if self.airdrops.iter().any(|a| a.index == proof.index) {
            return Err(MinerError::DuplicateAirdrop(proof.index));
        }
        self.reserve(proof.encode().len() as u64 * 4 + 256)?;
        self.airdrops.push(proof);
        Ok(())
    }

    /// The coinbase paying the reward and minting every credential.
    pub fn coinbase(&self) -> Transaction {
        let mut inputs = vec![Input::new(Outpoint::null())];
        let mut outputs = vec![Output::new(self.reward(), self.address.clone())];
        for claim in &self.claims {
            let mut input = Input::new(Outpoint::null());
            input.witness = vec![claim.encode()];
            inputs.push(input);
            outputs.push(claim.to_output(self.height));
        }
        for proof in &self.airdrops {
            let mut input = Input::new(Outpoint::null());
            input.witness = vec![proof.encode()];
            inputs.push(input);
            outputs.push(proof.to_output());
        }
        let mut coinbase = Transaction::new(inputs, outputs);
        coinbase.locktime = self.height;
        coinbase
    }

    /// Rebuilds the template from the current contents.
    pub fn refresh(&mut self) {
        let mut txs = Vec::with_capacity(self.txs.len() + 1);
        txs.push(self.coinbase());
        txs.extend(self.txs.iter().map(|(tx, _)| tx.clone()));
        let header = BlockHeader {
            version: BLOCK_VERSION,
            prev_block: self.prev_block,
            merkle_root: compute_merkle_root(&txs),
            witness_root: compute_witness_root(&txs),
            tree_root: self.tree_root,
            reserved_root: ZERO_HASH,
            time: self.time,
            bits: self.bits,
            nonce: 0,
            extra_nonce: self.extra_nonce,
        };
        self.template = Block { header, txs };
        self.dirty = false;
        debug!(
            "job at height {} refreshed: {} txs, {} claims, {} airdrops, reward {}",
            self.height,
            self.txs.len(),
            self.claims.len(),
            self.airdrops.len(),
            self.reward()
        );
    }

    /// The current template, refreshed if contents changed.
    pub fn block(&mut self) -> &Block {
        if self.dirty {
            self.refresh();
        }
        &self.template
    }

    /// Searches nonces, then extra nonces, until the header meets its target.
    pub fn mine(&mut self) -> Result<Block, MinerError> {
        let mut block = self.block().clone();
        for extra_nonce in self.extra_nonce..=u64::MAX {
            block.header.extra_nonce = extra_nonce;
            for nonce in 0..=u32::MAX {
                block.header.nonce = nonce;
                if meets_target(&block.header.hash(), block.header.bits) {
                    info!(
                        "mined block {} at height {} (nonce {}, extra nonce {})",
                        hex::encode(block.hash()),
                        self.height,
                        nonce,
                        extra_nonce
                    );
                    return Ok(block);
                }
            }
        }
        Err(MinerError::Exhausted)
    }

    /// Runs `mine` on the blocking thread pool.
    pub async fn mine_async(mut self) -> Result<Block, MinerError> {
        tokio::task::spawn_blocking(move || self.mine())
            .await
            .map_err(|e| MinerError::Worker(e.to_string()))?
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("height", &self.height)
            .field("prev_block", &hex::encode(self.prev_block))
            .field("txs", &self.txs.len())
            .field("claims", &self.claims.len())
            .field("airdrops", &self.airdrops.len())
            .field("weight", &self.weight)
            .finish()
    }
}

fn empty_header() -> BlockHeader {
    BlockHeader {
        version: BLOCK_VERSION,
        prev_block: ZERO_HASH,
        merkle_root: ZERO_HASH,
        witness_root: ZERO_HASH,
        tree_root: ZERO_HASH,
        reserved_root: ZERO_HASH,
        time: 0,
        bits: 0,
        nonce: 0,
        extra_nonce: 0,
    }
}
