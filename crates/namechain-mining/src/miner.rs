// Miner
//
// Builds jobs on the current tip from the pool plus externally supplied
// credentials, and feeds mined blocks back through `Chain::add`. The miner
// only reads chain state; the chain re-validates everything it submits.

use crate::error::MinerError;
use crate::job::Job;
use crate::pool::TxPool;
use log::{debug, info};
use namechain_chain::{Chain, ConnectOutcome};
use namechain_core::{Address, Block, Transaction};
use namechain_crypto::Hash;
use std::sync::Arc;

pub struct Miner {
    chain: Arc<Chain>,
    pool: Arc<TxPool>,
    address: Address,
}

impl Miner {
    pub fn new(chain: Arc<Chain>, pool: Arc<TxPool>, address: Address) -> Self {
        Self { chain, pool, address }
    }

    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    pub fn pool(&self) -> &Arc<TxPool> {
        &self.pool
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Pools `tx`, computing its fee from chain coins and pooled parents.
    pub async fn submit_tx(&self, tx: Transaction) -> Result<Hash, MinerError> {
        let txid = tx.txid();
        let mut input_value: u64 = 0;
        for (index, input) in tx.inputs.iter().enumerate() {
            let value = match self.chain.get_coin(&input.prevout).await? {
                Some(coin) => coin.value(),
                None => self
                    .pool
                    .output(&input.prevout)
                    .await
                    .map(|output| output.value)
                    .ok_or_else(|| MinerError::MissingInput { txid: hex::encode(txid), index })?,
            };
            input_value = input_value.saturating_add(value);
        }
        let output_value = tx.output_value().unwrap_or(u64::MAX);
        if output_value > input_value {
            return Err(MinerError::Overspend { txid: hex::encode(txid) });
        }
        Ok(self.pool.add(tx, input_value - output_value).await?)
    }

    /// A job on the current tip, filled from the pool.
    pub async fn create_job(&self) -> Result<Job, MinerError> {
        let snapshot = self.chain.snapshot().await;
        let mut job = Job::new(Arc::new(self.chain.network().clone()), &snapshot, self.address.clone());
        let budget = self.chain.network().max_block_weight.saturating_sub(job.weight());
        for entry in self.pool.select(budget).await {
            job.push_tx(entry.tx, entry.fee)?;
        }
        job.refresh();
        debug!("created job at height {} with {} txs", job.height, job.tx_count());
        Ok(job)
    }

    /// Mines `job` and submits the result.
    pub async fn submit_job(&self, job: Job) -> Result<(Block, ConnectOutcome), MinerError> {
        let block = job.mine_async().await?;
        let outcome = self.chain.add(block.clone()).await?;
        self.pool.remove_for_block(&block).await;
        info!("submitted block {} ({:?})", hex::encode(block.hash()), outcome);
        Ok((block, outcome))
    }

    /// Mines one block from the pool on the current tip.
    pub async fn mine_block(&self) -> Result<Block, MinerError> {
        let job = self.create_job().await?;
        let (block, _) = self.submit_job(job).await?;
        Ok(block)
    }

    pub async fn mine_blocks(&self, count: u32) -> Result<Vec<Block>, MinerError> {
        let mut blocks = Vec::with_capacity(count as usize);
        for _ in 0..count {
            blocks.push(self.mine_block().await?);
        }
        Ok(blocks)
    }
}
