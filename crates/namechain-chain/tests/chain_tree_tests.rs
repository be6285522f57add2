// Block tree behaviour: extension, side chains, reorganization, orphans,
// checkpoints, rejection memory and store-failure atomicity.

use namechain_chain::{
    meets_target, AcceptingClaimVerifier, Chain, ChainError, ChainEvent, ChainOptions, ConnectOutcome, ErrorKind,
    Network,
};
use namechain_core::block::{compute_merkle_root, compute_witness_root};
use namechain_core::{Address, Block, BlockHeader, Input, Outpoint, Output, Transaction};
use namechain_crypto::{Hash, ZERO_HASH};
use namechain_state::{Column, MemoryStore};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

#[derive(Clone, Copy)]
struct Parent {
    hash: Hash,
    height: u32,
    time: u64,
}

fn parent_of(block: &Block, height: u32) -> Parent {
    Parent { hash: block.hash(), height, time: block.header.time }
}

fn genesis(network: &Network) -> Parent {
    let block = network.genesis_block();
    parent_of(&block, 0)
}

fn make_block(network: &Network, parent: Parent, tag: u8, reward_bonus: u64) -> Block {
    let height = parent.height + 1;
    let mut coinbase = Transaction::new(
        vec![Input::new(Outpoint::null())],
        vec![Output::new(network.subsidy(height) + reward_bonus, Address { version: 0, hash: vec![tag; 20] })],
    );
    coinbase.locktime = height;
    let txs = vec![coinbase];
    let mut header = BlockHeader {
        version: 0,
        prev_block: parent.hash,
        merkle_root: compute_merkle_root(&txs),
        witness_root: compute_witness_root(&txs),
        tree_root: ZERO_HASH,
        reserved_root: ZERO_HASH,
        time: parent.time + 600,
        bits: network.pow.limit_bits,
        nonce: 0,
        extra_nonce: tag as u64,
    };
    while !meets_target(&header.hash(), header.bits) {
        header.nonce += 1;
    }
    Block { header, txs }
}

/// A run of `len` blocks on top of `parent`.
fn branch(network: &Network, parent: Parent, len: u32, tag: u8) -> Vec<Block> {
    let mut out = Vec::new();
    let mut tip = parent;
    for _ in 0..len {
        let block = make_block(network, tip, tag, 0);
        tip = parent_of(&block, tip.height + 1);
        out.push(block);
    }
    out
}

async fn open(network: Network, options: ChainOptions) -> (Chain, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let chain = Chain::open(store.clone(), network, options, Arc::new(AcceptingClaimVerifier)).await.unwrap();
    (chain, store)
}

async fn feed(chain: &Chain, blocks: &[Block]) {
    for block in blocks {
        chain.add(block.clone()).await.unwrap();
    }
}

#[tokio::test]
async fn extends_and_indexes_active_chain() {
    let network = Network::regtest();
    let blocks = branch(&network, genesis(&network), 10, 1);
    let (chain, _) = open(network, ChainOptions::default()).await;

    for (i, block) in blocks.iter().enumerate() {
        let outcome = chain.add(block.clone()).await.unwrap();
        assert_eq!(outcome, ConnectOutcome::Connected { hash: block.hash(), height: i as u32 + 1 });
    }

    assert_eq!(chain.height().await, 10);
    let tip = chain.tip().await;
    assert_eq!(tip.hash, blocks[9].hash());
    assert_eq!(chain.get_hash(4).await, Some(blocks[3].hash()));
    assert_eq!(chain.get_entry(4).await.unwrap().height, 4);
    assert_eq!(chain.get_block(&blocks[6].hash()).await.unwrap(), Some(blocks[6].clone()));
    assert!(chain.is_main_chain(&blocks[2].hash()).await);
    assert_eq!(chain.get_ancestor(&tip, 3).await.unwrap().hash, blocks[2].hash());

    let state = chain.state().await;
    assert_eq!(state.height, 10);
    assert_eq!(state.coin_count, 10);
    assert_eq!(state.tx_count, 11);
}

#[tokio::test]
async fn heavier_branch_reorganizes_and_back() {
    let network = Network::regtest();
    let g = genesis(&network);
    let a = branch(&network, g, 7, 1);
    let b = branch(&network, parent_of(&a[1], 2), 4, 2);
    let (chain, _) = open(network.clone(), ChainOptions::default()).await;
    let mut events = chain.subscribe();

    feed(&chain, &a[..5]).await;
    let a_state = chain.state().await;

    for block in &b[..3] {
        assert!(matches!(chain.add(block.clone()).await.unwrap(), ConnectOutcome::SideChain { .. }));
    }
    assert_eq!(chain.state().await, a_state);

    let outcome = chain.add(b[3].clone()).await.unwrap();
    assert_eq!(
        outcome,
        ConnectOutcome::Reorganized { hash: b[3].hash(), height: 6, fork_height: 2, disconnected: 3, connected: 4 }
    );
    assert!(!chain.is_main_chain(&a[4].hash()).await);
    assert_eq!(chain.get_hash(3).await, Some(b[0].hash()));

    // Same state as a chain that only ever saw the winning branch.
    let (fresh, _) = open(network.clone(), ChainOptions::default()).await;
    feed(&fresh, &a[..2]).await;
    feed(&fresh, &b).await;
    assert_eq!(chain.state().await, fresh.state().await);

    // And back again.
    chain.add(a[5].clone()).await.unwrap();
    let outcome = chain.add(a[6].clone()).await.unwrap();
    assert!(matches!(outcome, ConnectOutcome::Reorganized { fork_height: 2, .. }));
    let (fresh, _) = open(network, ChainOptions::default()).await;
    feed(&fresh, &a).await;
    assert_eq!(chain.state().await, fresh.state().await);
    assert_eq!(chain.state().await.utxo_root(), fresh.state().await.utxo_root());

    let mut saw_reorg = false;
    while let Ok(event) = events.try_recv() {
        if let ChainEvent::Reorganize { fork_height, .. } = event {
            assert_eq!(fork_height, 2);
            saw_reorg = true;
        }
    }
    assert!(saw_reorg);
}

#[tokio::test]
async fn orphans_connect_when_parent_arrives() {
    let network = Network::regtest();
    let blocks = branch(&network, genesis(&network), 3, 1);
    let (chain, _) = open(network, ChainOptions::default()).await;

    assert_eq!(chain.add(blocks[2].clone()).await.unwrap(), ConnectOutcome::Orphan { hash: blocks[2].hash() });
    assert_eq!(chain.add(blocks[1].clone()).await.unwrap(), ConnectOutcome::Orphan { hash: blocks[1].hash() });
    assert_eq!(chain.orphan_count().await, 2);

    chain.add(blocks[0].clone()).await.unwrap();
    assert_eq!(chain.height().await, 3);
    assert_eq!(chain.orphan_count().await, 0);
}

#[tokio::test]
async fn rejected_blocks_are_remembered() {
    let network = Network::regtest();
    let g = genesis(&network);
    let good = make_block(&network, g, 1, 0);
    let greedy = make_block(&network, g, 2, 1);
    let child = make_block(&network, parent_of(&greedy, 1), 2, 0);
    let (chain, _) = open(network, ChainOptions::default()).await;

    chain.add(good.clone()).await.unwrap();
    let err = chain.add(good).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Duplicate);

    // Side-chain blocks are only fully validated when they would become the
    // tip, so build the greedy block on top of the tip instead.
    let (chain, _) = open(Network::regtest(), ChainOptions::default()).await;
    let before = chain.state().await;
    let err = chain.add(greedy.clone()).await.unwrap_err();
    assert!(matches!(err, ChainError::BadCoinbaseValue { height: 1, .. }));
    assert_eq!(chain.state().await, before);
    assert!(chain.is_invalid(&greedy.hash()).await);

    assert!(matches!(chain.add(greedy).await.unwrap_err(), ChainError::KnownInvalid { .. }));
    assert!(matches!(chain.add(child).await.unwrap_err(), ChainError::KnownInvalid { .. }));
}

#[tokio::test]
async fn tampered_body_does_not_poison_the_header() {
    let network = Network::regtest();
    let real = make_block(&network, genesis(&network), 1, 0);
    let mut tampered = real.clone();
    tampered.txs[0].outputs[0].value += 1;
    assert_eq!(tampered.hash(), real.hash());
    let (chain, _) = open(network, ChainOptions::default()).await;

    let err = chain.add(tampered).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structural);
    assert!(!chain.is_invalid(&real.hash()).await);

    let outcome = chain.add(real.clone()).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Connected { hash: real.hash(), height: 1 });
}

#[tokio::test]
async fn early_blocks_can_be_retried() {
    let network = Network::regtest();
    let mut early = make_block(&network, genesis(&network), 1, 0);
    early.header.time = now() + 30 * 24 * 60 * 60;
    while !meets_target(&early.hash(), early.header.bits) {
        early.header.nonce += 1;
    }
    let (chain, _) = open(network.clone(), ChainOptions::default()).await;

    for _ in 0..2 {
        let err = chain.add(early.clone()).await.unwrap_err();
        assert!(matches!(err, ChainError::TimeTooNew { height: 1, .. }));
    }
    assert!(!chain.is_invalid(&early.hash()).await);

    // A node whose clock has caught up accepts it.
    let mut relaxed = network;
    relaxed.pow.max_future_drift = u64::MAX;
    let (chain, _) = open(relaxed, ChainOptions::default()).await;
    assert!(chain.add(early).await.unwrap().is_main_chain());
}

#[tokio::test]
async fn failed_reorg_keeps_the_old_tip() {
    let network = Network::regtest();
    let g = genesis(&network);
    let main = branch(&network, g, 4, 1);
    let first = make_block(&network, g, 2, 0);
    let greedy = make_block(&network, parent_of(&first, 1), 2, 1);
    let mut rival = vec![first, greedy.clone()];
    rival.extend(branch(&network, parent_of(&greedy, 2), 3, 2));
    let (chain, store) = open(network, ChainOptions::default()).await;
    feed(&chain, &main).await;

    let tip = chain.tip().await.hash;
    let state = chain.state().await;
    let coins = store.dump(Column::Coin);

    for block in &rival[..4] {
        assert!(matches!(chain.add(block.clone()).await.unwrap(), ConnectOutcome::SideChain { .. }));
    }
    let err = chain.add(rival[4].clone()).await.unwrap_err();
    assert!(matches!(err, ChainError::BadCoinbaseValue { height: 2, .. }));

    assert_eq!(chain.tip().await.hash, tip);
    assert_eq!(chain.state().await, state);
    assert_eq!(store.dump(Column::Coin), coins);
    assert_eq!(chain.get_hash(4).await, Some(main[3].hash()));
    assert!(!chain.is_invalid(&rival[0].hash()).await);
    for block in &rival[1..] {
        assert!(chain.is_invalid(&block.hash()).await);
    }
}

#[tokio::test]
async fn orphans_must_carry_their_work() {
    let network = Network::regtest();
    let blocks = branch(&network, genesis(&network), 3, 1);
    let (chain, _) = open(network, ChainOptions::default()).await;

    let mut weak = blocks[2].clone();
    while meets_target(&weak.hash(), weak.header.bits) {
        weak.header.nonce += 1;
    }
    let err = chain.add(weak).await.unwrap_err();
    assert!(matches!(err, ChainError::OrphanHighHash { .. }));

    let mut easy = blocks[2].clone();
    easy.header.bits = 0x2100_ffff;
    let err = chain.add(easy).await.unwrap_err();
    assert!(matches!(err, ChainError::OrphanHighHash { .. }));
    assert_eq!(chain.orphan_count().await, 0);

    chain.add(blocks[2].clone()).await.unwrap();
    assert_eq!(chain.orphan_count().await, 1);
}

#[tokio::test]
async fn header_checks() {
    let network = Network::regtest();
    let g = genesis(&network);
    let (chain, _) = open(network.clone(), ChainOptions::default()).await;

    let mut stale = make_block(&network, g, 1, 0);
    stale.header.time = g.time;
    while !meets_target(&stale.hash(), stale.header.bits) {
        stale.header.nonce += 1;
    }
    assert!(matches!(chain.add(stale).await.unwrap_err(), ChainError::TimeTooOld { .. }));

    let mut wrong_bits = make_block(&network, g, 2, 0);
    wrong_bits.header.bits = 0x2000_ffff;
    while !meets_target(&wrong_bits.hash(), wrong_bits.header.bits) {
        wrong_bits.header.nonce += 1;
    }
    assert!(matches!(chain.add(wrong_bits).await.unwrap_err(), ChainError::BadBits { .. }));

    let mut bad_tree = make_block(&network, g, 3, 0);
    bad_tree.header.tree_root = [1u8; 32];
    while !meets_target(&bad_tree.hash(), bad_tree.header.bits) {
        bad_tree.header.nonce += 1;
    }
    assert!(matches!(chain.add(bad_tree).await.unwrap_err(), ChainError::BadTreeRoot { height: 1 }));

    let mut malformed = make_block(&network, g, 4, 0);
    malformed.header.merkle_root = [9u8; 32];
    let err = chain.add(malformed).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structural);

    assert_eq!(chain.height().await, 0);
}

#[tokio::test]
async fn checkpoints_pin_history() {
    let base = Network::regtest();
    let g = genesis(&base);
    let a = branch(&base, g, 3, 1);
    let network = base.clone().with_checkpoint(2, a[1].hash());
    let options = ChainOptions { checkpoints: true, ..ChainOptions::default() };

    // A conflicting block at the checkpoint height is fatal.
    let (chain, _) = open(network.clone(), options.clone()).await;
    feed(&chain, &a[..1]).await;
    let rival = make_block(&network, parent_of(&a[0], 1), 9, 0);
    let err = chain.add(rival).await.unwrap_err();
    assert!(matches!(err, ChainError::CheckpointMismatch { height: 2, .. }));
    assert!(err.is_fatal());

    // Branches forking below a passed checkpoint are refused.
    feed(&chain, &a[1..]).await;
    let low_fork = make_block(&network, g, 9, 0);
    let err = chain.add(low_fork).await.unwrap_err();
    assert!(matches!(err, ChainError::ForkBeforeCheckpoint { checkpoint: 2, .. }));
    assert!(!err.is_fatal());

    // Without checkpoints the same rival is just a side chain.
    let (chain, _) = open(network.clone(), ChainOptions::default()).await;
    feed(&chain, &a[..1]).await;
    let rival = make_block(&network, parent_of(&a[0], 1), 9, 0);
    assert!(matches!(chain.add(rival).await.unwrap(), ConnectOutcome::Connected { .. }));
}

#[tokio::test]
async fn failed_commit_changes_nothing() {
    let network = Network::regtest();
    let blocks = branch(&network, genesis(&network), 2, 1);
    let (chain, store) = open(network, ChainOptions::default()).await;
    feed(&chain, &blocks[..1]).await;

    let coins = store.dump(Column::Coin);
    let meta = store.dump(Column::Meta);
    let state = chain.state().await;

    store.fail_next_commit();
    let err = chain.add(blocks[1].clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);
    assert!(err.is_fatal());
    assert_eq!(store.dump(Column::Coin), coins);
    assert_eq!(store.dump(Column::Meta), meta);
    assert_eq!(chain.state().await, state);
    assert_eq!(chain.height().await, 1);

    // Store failures do not poison the block.
    assert!(!chain.is_invalid(&blocks[1].hash()).await);
    chain.add(blocks[1].clone()).await.unwrap();
    assert_eq!(chain.height().await, 2);
}

#[tokio::test]
async fn reopening_restores_tip_and_state() {
    let network = Network::regtest();
    let blocks = branch(&network, genesis(&network), 4, 1);
    let (chain, store) = open(network.clone(), ChainOptions::default()).await;
    feed(&chain, &blocks).await;
    let state = chain.state().await;
    drop(chain);

    let chain = Chain::open(store.clone(), network, ChainOptions::default(), Arc::new(AcceptingClaimVerifier))
        .await
        .unwrap();
    assert_eq!(chain.state().await, state);
    assert_eq!(chain.get_hash(4).await, Some(blocks[3].hash()));

    let err = Chain::open(store, Network::main(), ChainOptions::default(), Arc::new(AcceptingClaimVerifier))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);
}
