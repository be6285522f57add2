use namechain_core::block::{compute_merkle_root, compute_witness_root};
use namechain_core::{
    check_block_sanity, Address, Block, BlockError, BlockHeader, Input, Outpoint, Output, Transaction, TxError,
    ZERO_HASH,
};

const MAX_WEIGHT: u64 = 4_000_000;

fn coinbase(height: u32) -> Transaction {
    let mut input = Input::new(Outpoint::null());
    input.witness = vec![height.to_le_bytes().to_vec()];
    Transaction::new(vec![input], vec![Output::new(50, Address { version: 0, hash: vec![1u8; 20] })])
}

fn spend(prev: u8) -> Transaction {
    let mut input = Input::new(Outpoint::new([prev; 32], 0));
    input.witness = vec![vec![0u8; 64], vec![0u8; 32]];
    Transaction::new(vec![input], vec![Output::new(10, Address { version: 0, hash: vec![2u8; 20] })])
}

fn block(txs: Vec<Transaction>) -> Block {
    let header = BlockHeader {
        version: 1,
        prev_block: ZERO_HASH,
        merkle_root: compute_merkle_root(&txs),
        witness_root: compute_witness_root(&txs),
        tree_root: ZERO_HASH,
        reserved_root: ZERO_HASH,
        time: 0,
        bits: 0x207f_ffff,
        nonce: 0,
        extra_nonce: 0,
    };
    Block { header, txs }
}

#[test]
fn accepts_well_formed_block() {
    assert_eq!(check_block_sanity(&block(vec![coinbase(1), spend(9)]), MAX_WEIGHT), Ok(()));
}

#[test]
fn requires_leading_coinbase() {
    assert_eq!(check_block_sanity(&block(vec![spend(9)]), MAX_WEIGHT), Err(BlockError::MissingCoinbase));
    assert_eq!(
        check_block_sanity(&block(vec![coinbase(1), coinbase(2)]), MAX_WEIGHT),
        Err(BlockError::ExtraCoinbase(1))
    );
}

#[test]
fn detects_merkle_tampering() {
    let mut b = block(vec![coinbase(1), spend(9)]);
    b.txs[1].outputs[0].value = 11;
    assert_eq!(check_block_sanity(&b, MAX_WEIGHT), Err(BlockError::BadMerkleRoot));

    let mut b = block(vec![coinbase(1), spend(9)]);
    b.txs[1].inputs[0].witness[0][0] = 1;
    assert_eq!(check_block_sanity(&b, MAX_WEIGHT), Err(BlockError::BadWitnessRoot));
}

#[test]
fn enforces_weight_limit() {
    let b = block(vec![coinbase(1)]);
    assert!(matches!(check_block_sanity(&b, 100), Err(BlockError::TooHeavy { .. })));
}

#[test]
fn rejects_duplicate_inputs() {
    let mut tx = spend(9);
    tx.inputs.push(tx.inputs[0].clone());
    let b = block(vec![coinbase(1), tx]);
    assert!(matches!(
        check_block_sanity(&b, MAX_WEIGHT),
        Err(BlockError::BadTransaction { reason: TxError::DuplicateInput(1), .. })
    ));
}
