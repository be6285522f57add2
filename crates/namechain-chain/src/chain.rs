// Block tree and active chain
//
// `Chain` owns the entry index, the active chain, the orphan pool and the
// committed chain state. One writer at a time: `add` holds the write lock
// from the first check until the store commit (or rejection), so readers
// only ever see the state as of the last committed tip.
//
// SAFETY INVARIANTS:
// 1. A block's effects, or a whole reorganization's, reach the store in a
//    single batch; a failure anywhere discards the staged overlay
// 2. The in-memory tip and active chain change only after that batch commits
// 3. With checkpoints enabled, a block at a checkpoint height must carry the
//    configured hash, and no branch may fork below the highest checkpoint on
//    the active chain
// 4. A block that failed validation is never connected later, unless the
//    failure came from its body or an early timestamp

use crate::connect::{connect_block, BlockContext, ClaimVerifier};
use crate::entry::{ChainEntry, EntryIndex};
use crate::error::ChainError;
use crate::network::Network;
use crate::orphans::OrphanPool;
use crate::pow::{meets_target, retarget, within_limit};
use log::{debug, error, info, warn};
use namechain_core::{check_block_sanity, Block, Outpoint};
use namechain_covenants::NameStatus;
use namechain_crypto::Hash;
use namechain_state::{revert_block, ChainState, Coin, Column, KvStore, StateError, StateView};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, RwLock};

pub const BLOCK_VERSION: u32 = 0;
const EVENT_CAPACITY: usize = 1024;

/// Construction-time chain options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainOptions {
    /// Trust the network's checkpoints
    pub checkpoints: bool,
    pub max_orphans: usize,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self { checkpoints: false, max_orphans: 100 }
    }
}

/// How an accepted block was placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Extended the active chain
    Connected { hash: Hash, height: u32 },
    /// Stored on a branch with less work than the tip
    SideChain { hash: Hash, height: u32 },
    /// Became the tip of a heavier branch
    Reorganized { hash: Hash, height: u32, fork_height: u32, disconnected: usize, connected: usize },
    /// Parent unknown; held until it arrives
    Orphan { hash: Hash },
}

impl ConnectOutcome {
    pub fn hash(&self) -> &Hash {
        match self {
            ConnectOutcome::Connected { hash, .. }
            | ConnectOutcome::SideChain { hash, .. }
            | ConnectOutcome::Reorganized { hash, .. }
            | ConnectOutcome::Orphan { hash } => hash,
        }
    }

    pub fn is_main_chain(&self) -> bool {
        matches!(self, ConnectOutcome::Connected { .. } | ConnectOutcome::Reorganized { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    Connect { hash: Hash, height: u32 },
    Disconnect { hash: Hash, height: u32 },
    Reorganize { old_tip: Hash, new_tip: Hash, fork_height: u32 },
}

/// Everything a block assembler needs to build on the current tip.
#[derive(Debug, Clone)]
pub struct TipSnapshot {
    pub tip: Arc<ChainEntry>,
    pub state: ChainState,
    /// Bits the next block must carry
    pub next_bits: u32,
    /// The next block's time must exceed this
    pub median_time: u64,
}

impl TipSnapshot {
    pub fn next_height(&self) -> u32 {
        self.tip.height + 1
    }
}

struct ChainInner {
    index: EntryIndex,
    /// Active chain, indexed by height
    main: Vec<Hash>,
    tip: Arc<ChainEntry>,
    state: ChainState,
    orphans: OrphanPool,
    invalid: HashSet<Hash>,
}

pub struct Chain {
    network: Arc<Network>,
    options: ChainOptions,
    store: Arc<dyn KvStore>,
    claims: Arc<dyn ClaimVerifier>,
    inner: RwLock<ChainInner>,
    events: broadcast::Sender<ChainEvent>,
}

fn height_key(height: u32) -> Vec<u8> {
    height.to_be_bytes().to_vec()
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, ChainError> {
    bincode::serialize(value).map_err(|e| ChainError::Store(StateError::Serialization(e)))
}

fn decode_value<T: serde::de::DeserializeOwned>(column: Column, bytes: &[u8]) -> Result<T, ChainError> {
    bincode::deserialize(bytes).map_err(|e| ChainError::Store(StateError::Corrupt { column, reason: e.to_string() }))
}

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

impl Chain {
    /// Opens the chain stored in `store`, writing genesis into an empty one.
    pub async fn open(
        store: Arc<dyn KvStore>,
        network: Network,
        options: ChainOptions,
        claims: Arc<dyn ClaimVerifier>,
    ) -> Result<Self, ChainError> {
        network.validate().map_err(ChainError::Config)?;
        let genesis = network.genesis_block();
        let genesis_hash = genesis.hash();

        let view = StateView::new(store.clone());
        let inner = match view.chain_state().await {
            Ok(state) => Self::load(&store, state, &genesis_hash).await?,
            Err(StateError::Missing { .. }) => Self::init(&store, &genesis).await?,
            Err(e) => return Err(e.into()),
        };

        info!(
            "chain opened on {} at height {} (tip {}, checkpoints {})",
            network.kind,
            inner.tip.height,
            hex::encode(inner.tip.hash),
            if options.checkpoints { "on" } else { "off" }
        );

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            network: Arc::new(network),
            inner: RwLock::new(ChainInner { orphans: OrphanPool::new(options.max_orphans), ..inner }),
            options,
            store,
            claims,
            events,
        })
    }

    async fn init(store: &Arc<dyn KvStore>, genesis: &Block) -> Result<ChainInner, ChainError> {
        let entry = Arc::new(ChainEntry::genesis(genesis.header.clone()));
        let mut state = ChainState::genesis(entry.hash);
        state.tx_count = genesis.txs.len() as u64;

        let mut view = StateView::new(store.clone());
        view.put(Column::Entry, entry.hash.to_vec(), encode_value(entry.as_ref())?);
        view.put(Column::Block, entry.hash.to_vec(), encode_value(genesis)?);
        view.put(Column::Height, height_key(0), entry.hash.to_vec());
        view.put_chain_state(&state)?;
        store.commit(view.into_batch()).await?;

        let mut index = EntryIndex::new();
        index.insert(entry.clone());
        Ok(ChainInner {
            index,
            main: vec![entry.hash],
            tip: entry,
            state,
            orphans: OrphanPool::default(),
            invalid: HashSet::new(),
        })
    }

    async fn load(store: &Arc<dyn KvStore>, state: ChainState, genesis_hash: &Hash) -> Result<ChainInner, ChainError> {
        let mut index = EntryIndex::new();
        for (_, bytes) in store.scan_prefix(Column::Entry, &[]).await? {
            let entry: ChainEntry = decode_value(Column::Entry, &bytes)?;
            index.insert(Arc::new(entry));
        }

        let mut main = Vec::new();
        for (key, value) in store.scan_prefix(Column::Height, &[]).await? {
            let hash: Hash = value.as_slice().try_into().map_err(|_| {
                ChainError::Store(StateError::Corrupt { column: Column::Height, reason: format!("value at {}", hex::encode(&key)) })
            })?;
            main.push(hash);
        }
        if main.first() != Some(genesis_hash) {
            return Err(ChainError::Config("store holds a different network's chain".to_string()));
        }

        let tip = index
            .get(&state.tip)
            .cloned()
            .ok_or_else(|| ChainError::Store(StateError::Missing { what: "tip entry".to_string() }))?;
        if main.len() != tip.height as usize + 1 {
            return Err(ChainError::Store(StateError::Corrupt {
                column: Column::Height,
                reason: format!("{} heights indexed for tip at {}", main.len(), tip.height),
            }));
        }

        Ok(ChainInner { index, main, tip, state, orphans: OrphanPool::default(), invalid: HashSet::new() })
    }

    // ==================== READ INTERFACE ====================

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn options(&self) -> &ChainOptions {
        &self.options
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    pub async fn tip(&self) -> Arc<ChainEntry> {
        self.inner.read().await.tip.clone()
    }

    pub async fn height(&self) -> u32 {
        self.inner.read().await.tip.height
    }

    pub async fn state(&self) -> ChainState {
        self.inner.read().await.state.clone()
    }

    /// Active-chain entry at `height`.
    pub async fn get_entry(&self, height: u32) -> Option<Arc<ChainEntry>> {
        let inner = self.inner.read().await;
        let hash = inner.main.get(height as usize)?;
        inner.index.get(hash).cloned()
    }

    pub async fn get_hash(&self, height: u32) -> Option<Hash> {
        self.inner.read().await.main.get(height as usize).copied()
    }

    /// Any known entry, main chain or not.
    pub async fn get_entry_by_hash(&self, hash: &Hash) -> Option<Arc<ChainEntry>> {
        self.inner.read().await.index.get(hash).cloned()
    }

    pub async fn is_main_chain(&self, hash: &Hash) -> bool {
        let inner = self.inner.read().await;
        match inner.index.get(hash) {
            Some(entry) => inner.main.get(entry.height as usize) == Some(hash),
            None => false,
        }
    }

    pub async fn get_ancestor(&self, entry: &ChainEntry, height: u32) -> Option<Arc<ChainEntry>> {
        self.inner.read().await.index.ancestor(entry, height)
    }

    pub async fn get_block(&self, hash: &Hash) -> Result<Option<Block>, ChainError> {
        match self.store.get(Column::Block, hash).await? {
            Some(bytes) => Ok(Some(decode_value(Column::Block, &bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn get_coin(&self, outpoint: &Outpoint) -> Result<Option<Coin>, ChainError> {
        let _guard = self.inner.read().await;
        Ok(StateView::new(self.store.clone()).get_coin(outpoint).await?)
    }

    /// Name record and derived auction status as seen at `height`.
    pub async fn get_name_status(&self, name_hash: &Hash, height: u32) -> Result<Option<NameStatus>, ChainError> {
        let _guard = self.inner.read().await;
        let record = StateView::new(self.store.clone()).get_name(name_hash).await?;
        Ok(record.map(|record| NameStatus::new(record, height, &self.network.names)))
    }

    /// Spent airdrop positions as a bitfield.
    pub async fn airdrop_field(&self) -> Result<Vec<u8>, ChainError> {
        let _guard = self.inner.read().await;
        Ok(StateView::new(self.store.clone()).airdrop_field().await?)
    }

    pub async fn is_invalid(&self, hash: &Hash) -> bool {
        self.inner.read().await.invalid.contains(hash)
    }

    pub async fn orphan_count(&self) -> usize {
        self.inner.read().await.orphans.len()
    }

    pub async fn snapshot(&self) -> TipSnapshot {
        let inner = self.inner.read().await;
        TipSnapshot {
            tip: inner.tip.clone(),
            state: inner.state.clone(),
            next_bits: self.next_bits(&inner.index, &inner.tip),
            median_time: inner.index.median_time_past(&inner.tip),
        }
    }

    // ==================== WRITE INTERFACE ====================

    /// Validates `block` and places it in the block tree.
    pub async fn add(&self, block: Block) -> Result<ConnectOutcome, ChainError> {
        let mut inner = self.inner.write().await;
        let outcome = self.add_locked(&mut inner, block).await?;

        if matches!(outcome, ConnectOutcome::Orphan { .. }) {
            return Ok(outcome);
        }

        // Release orphans that were waiting on this block.
        let mut parents = vec![*outcome.hash()];
        while let Some(parent) = parents.pop() {
            for orphan in inner.orphans.take_children(&parent) {
                let hash = orphan.hash();
                match self.add_locked(&mut inner, orphan).await {
                    Ok(_) => parents.push(hash),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!("orphan {} rejected: {}", hex::encode(hash), e),
                }
            }
        }
        Ok(outcome)
    }

    async fn add_locked(&self, inner: &mut ChainInner, block: Block) -> Result<ConnectOutcome, ChainError> {
        let hash = block.hash();
        if inner.invalid.contains(&hash) {
            return Err(ChainError::KnownInvalid { hash: hex::encode(hash) });
        }
        if inner.index.contains(&hash) || inner.orphans.contains(&hash) {
            return Err(ChainError::Duplicate { hash: hex::encode(hash) });
        }

        // The header does not commit to a body that fails these checks, so
        // the hash is not remembered as invalid.
        if let Err(source) = check_block_sanity(&block, self.network.max_block_weight) {
            warn!("rejected malformed block {}: {}", hex::encode(hash), source);
            return Err(ChainError::Malformed { hash: hex::encode(hash), source });
        }

        let prev = match inner.index.get(block.prev_block()) {
            Some(prev) => prev.clone(),
            None => {
                if inner.invalid.contains(block.prev_block()) {
                    inner.invalid.insert(hash);
                    return Err(ChainError::KnownInvalid { hash: hex::encode(hash) });
                }
                if !within_limit(block.header.bits, self.network.pow.limit_bits)
                    || !meets_target(&hash, block.header.bits)
                {
                    return Err(ChainError::OrphanHighHash { hash: hex::encode(hash) });
                }
                warn!(
                    "orphan block {} (parent {} unknown)",
                    hex::encode(hash),
                    hex::encode(block.prev_block())
                );
                inner.orphans.insert(block);
                return Ok(ConnectOutcome::Orphan { hash });
            }
        };

        let entry = Arc::new(inner.index.child_of(&prev, block.header.clone()));
        let result = self.place(inner, &prev, entry, &block).await;
        if let Err(e) = &result {
            if e.is_invalid_block() {
                inner.invalid.insert(hash);
            }
            if e.is_fatal() {
                error!("block {} at height {}: {}", hex::encode(hash), prev.height + 1, e);
            } else {
                warn!("rejected block {}: {}", hex::encode(hash), e);
            }
        }
        result
    }

    async fn place(
        &self,
        inner: &mut ChainInner,
        prev: &Arc<ChainEntry>,
        entry: Arc<ChainEntry>,
        block: &Block,
    ) -> Result<ConnectOutcome, ChainError> {
        self.check_header(&inner.index, prev, &entry)?;

        if prev.hash == inner.tip.hash {
            return self.switch_to(inner, prev.clone(), entry, block).await;
        }

        let fork = inner
            .index
            .find_fork(&inner.tip, &entry)
            .ok_or_else(|| ChainError::Config("branch does not share genesis".to_string()))?;

        if self.options.checkpoints {
            if let Some((&checkpoint, _)) = self.network.checkpoints.range(..=inner.tip.height).next_back() {
                if fork.height < checkpoint {
                    return Err(ChainError::ForkBeforeCheckpoint { height: entry.height, checkpoint });
                }
            }
        }

        if entry.chainwork > inner.tip.chainwork {
            return self.switch_to(inner, fork, entry, block).await;
        }

        let mut view = StateView::new(self.store.clone());
        view.put(Column::Entry, entry.hash.to_vec(), encode_value(entry.as_ref())?);
        view.put(Column::Block, entry.hash.to_vec(), encode_value(block)?);
        self.store.commit(view.into_batch()).await?;
        inner.index.insert(entry.clone());
        debug!(
            "side chain block {} at height {} (fork at {})",
            hex::encode(entry.hash),
            entry.height,
            fork.height
        );
        Ok(ConnectOutcome::SideChain { hash: entry.hash, height: entry.height })
    }

    fn check_header(&self, index: &EntryIndex, prev: &ChainEntry, entry: &ChainEntry) -> Result<(), ChainError> {
        let header = &entry.header;
        let height = entry.height;

        if header.version != BLOCK_VERSION {
            return Err(ChainError::BadVersion { height, version: header.version });
        }

        let expected = self.next_bits(index, prev);
        if header.bits != expected {
            return Err(ChainError::BadBits { height, expected, got: header.bits });
        }
        if !meets_target(&entry.hash, header.bits) {
            return Err(ChainError::HighHash { height });
        }

        let median = index.median_time_past(prev);
        if header.time <= median {
            return Err(ChainError::TimeTooOld { height, time: header.time, median });
        }
        if header.time > now().saturating_add(self.network.pow.max_future_drift) {
            return Err(ChainError::TimeTooNew { height, time: header.time });
        }

        if self.options.checkpoints {
            if let Some(expected) = self.network.checkpoints.get(&height) {
                if *expected != entry.hash {
                    return Err(ChainError::CheckpointMismatch {
                        height,
                        expected: hex::encode(expected),
                        got: hex::encode(entry.hash),
                    });
                }
                info!("checkpoint {} matched", height);
            }
        }
        Ok(())
    }

    fn next_bits(&self, index: &EntryIndex, prev: &ChainEntry) -> u32 {
        let pow = &self.network.pow;
        if prev.is_genesis() {
            return pow.limit_bits;
        }
        let height = prev.height + 1;
        if pow.no_retargeting || height % pow.retarget_interval != 0 {
            return prev.header.bits;
        }
        let first_height = height.saturating_sub(pow.retarget_interval);
        match index.ancestor(prev, first_height) {
            Some(first) => {
                let actual = prev.time().saturating_sub(first.time());
                retarget(prev.header.bits, actual, pow.target_timespan(), pow.limit_bits)
            }
            None => prev.header.bits,
        }
    }

    fn verify_scripts(&self, height: u32) -> bool {
        !(self.options.checkpoints && height <= self.network.last_checkpoint())
    }

    async fn load_block(&self, hash: &Hash) -> Result<Block, ChainError> {
        self.get_block(hash)
            .await?
            .ok_or_else(|| ChainError::Store(StateError::Missing { what: format!("block {}", hex::encode(hash)) }))
    }

    /// Makes `entry` the tip: disconnects the active chain down to `fork`,
    /// connects the branch from `fork` up to `entry`, and commits everything
    /// in one batch. On any failure nothing is written.
    async fn switch_to(
        &self,
        inner: &mut ChainInner,
        fork: Arc<ChainEntry>,
        entry: Arc<ChainEntry>,
        block: &Block,
    ) -> Result<ConnectOutcome, ChainError> {
        let old_tip = inner.tip.clone();
        let mut view = StateView::new(self.store.clone());

        let mut disconnected = Vec::new();
        for height in ((fork.height + 1)..=old_tip.height).rev() {
            let hash = inner.main[height as usize];
            revert_block(&mut view, &hash).await?;
            disconnected.push((hash, height));
        }

        let mut branch = vec![entry.clone()];
        let mut walk = inner.index.get(entry.prev()).cloned();
        while let Some(current) = walk {
            if current.height <= fork.height {
                break;
            }
            walk = inner.index.get(current.prev()).cloned();
            branch.push(current);
        }
        branch.reverse();

        let mut state = inner.state.clone();
        for (i, step) in branch.iter().enumerate() {
            let loaded;
            let body = if step.hash == entry.hash {
                block
            } else {
                loaded = self.load_block(&step.hash).await?;
                &loaded
            };
            let ctx = BlockContext {
                network: &self.network,
                claims: self.claims.as_ref(),
                verify_scripts: self.verify_scripts(step.height),
            };
            match connect_block(&mut view, &ctx, body, step.height).await {
                Ok(next) => state = next,
                Err(e) => {
                    if e.is_invalid_block() {
                        for bad in &branch[i..] {
                            inner.invalid.insert(bad.hash);
                        }
                    }
                    if !disconnected.is_empty() {
                        warn!(
                            "reorganization to {} failed at height {}; keeping tip {}",
                            hex::encode(entry.hash),
                            step.height,
                            hex::encode(old_tip.hash)
                        );
                    }
                    return Err(e);
                }
            }
        }

        for (_, height) in &disconnected {
            view.del(Column::Height, height_key(*height));
        }
        for step in &branch {
            view.put(Column::Height, height_key(step.height), step.hash.to_vec());
        }
        view.put(Column::Entry, entry.hash.to_vec(), encode_value(entry.as_ref())?);
        view.put(Column::Block, entry.hash.to_vec(), encode_value(block)?);
        self.store.commit(view.into_batch()).await?;

        inner.index.insert(entry.clone());
        inner.main.truncate(fork.height as usize + 1);
        inner.main.extend(branch.iter().map(|step| step.hash));
        inner.tip = entry.clone();
        inner.state = state;

        for (hash, height) in &disconnected {
            let _ = self.events.send(ChainEvent::Disconnect { hash: *hash, height: *height });
        }
        for step in &branch {
            let _ = self.events.send(ChainEvent::Connect { hash: step.hash, height: step.height });
        }

        if disconnected.is_empty() {
            debug!("tip {} at height {}", hex::encode(entry.hash), entry.height);
            return Ok(ConnectOutcome::Connected { hash: entry.hash, height: entry.height });
        }

        let _ = self.events.send(ChainEvent::Reorganize {
            old_tip: old_tip.hash,
            new_tip: entry.hash,
            fork_height: fork.height,
        });
        info!(
            "reorganized at height {}: {} blocks disconnected, {} connected, tip {} at height {}",
            fork.height,
            disconnected.len(),
            branch.len(),
            hex::encode(entry.hash),
            entry.height
        );
        Ok(ConnectOutcome::Reorganized {
            hash: entry.hash,
            height: entry.height,
            fork_height: fork.height,
            disconnected: disconnected.len(),
            connected: branch.len(),
        })
    }
}
