// Structural block validation
//
// Context-free checks: everything here can be decided from the block bytes
// alone, before any chain state is consulted.
//
// SAFETY INVARIANTS:
// 1. A block failing any check here never reaches state application
// 2. Every value and every running sum stays within MAX_MONEY

use crate::block::Block;
use crate::transaction::{Transaction, MAX_MONEY};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TxError {
    #[error("transaction has no inputs")]
    NoInputs,

    #[error("transaction has no outputs")]
    NoOutputs,

    #[error("output value out of range")]
    ValueOutOfRange,

    #[error("input {0} spends the same outpoint twice")]
    DuplicateInput(usize),

    #[error("input {0} spends the null outpoint outside a coinbase")]
    NullPrevout(usize),

    #[error("invalid output address at {0}")]
    BadAddress(usize),

    #[error("malformed coinbase: {0}")]
    BadCoinbase(&'static str),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("block has no transactions")]
    Empty,

    #[error("first transaction is not a coinbase")]
    MissingCoinbase,

    #[error("unexpected coinbase at position {0}")]
    ExtraCoinbase(usize),

    #[error("merkle root mismatch")]
    BadMerkleRoot,

    #[error("witness root mismatch")]
    BadWitnessRoot,

    #[error("block weight {weight} exceeds limit {limit}")]
    TooHeavy { weight: u64, limit: u64 },

    #[error("duplicate transaction {0}")]
    DuplicateTx(String),

    #[error("transaction {txid}: {reason}")]
    BadTransaction { txid: String, reason: TxError },
}

/// Checks a transaction in isolation.
pub fn check_transaction_sanity(tx: &Transaction) -> Result<(), TxError> {
    if tx.inputs.is_empty() {
        return Err(TxError::NoInputs);
    }
    if tx.outputs.is_empty() {
        return Err(TxError::NoOutputs);
    }

    let mut total: u64 = 0;
    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value > MAX_MONEY {
            return Err(TxError::ValueOutOfRange);
        }
        total = total.checked_add(output.value).ok_or(TxError::ValueOutOfRange)?;
        if total > MAX_MONEY {
            return Err(TxError::ValueOutOfRange);
        }
        if !output.address.is_valid() {
            return Err(TxError::BadAddress(i));
        }
    }

    if tx.is_coinbase() {
        // Inputs 1.. carry claims or airdrops and mint the output at the
        // same index.
        if tx.inputs.iter().any(|input| !input.prevout.is_null()) {
            return Err(TxError::BadCoinbase("coinbase spends a real outpoint"));
        }
        if tx.outputs.len() < tx.inputs.len() {
            return Err(TxError::BadCoinbase("fewer outputs than inputs"));
        }
        if tx.inputs.iter().skip(1).any(|input| input.witness.len() != 1) {
            return Err(TxError::BadCoinbase("claim input must carry one witness item"));
        }
        return Ok(());
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for (i, input) in tx.inputs.iter().enumerate() {
        if input.prevout.is_null() {
            return Err(TxError::NullPrevout(i));
        }
        if !seen.insert(input.prevout) {
            return Err(TxError::DuplicateInput(i));
        }
    }
    Ok(())
}

/// Checks block structure: coinbase placement, commitments and weight.
pub fn check_block_sanity(block: &Block, max_weight: u64) -> Result<(), BlockError> {
    if block.txs.is_empty() {
        return Err(BlockError::Empty);
    }
    if !block.txs[0].is_coinbase() {
        return Err(BlockError::MissingCoinbase);
    }

    let weight = block.weight();
    if weight > max_weight {
        return Err(BlockError::TooHeavy { weight, limit: max_weight });
    }

    let mut txids = HashSet::with_capacity(block.txs.len());
    for (i, tx) in block.txs.iter().enumerate() {
        if i > 0 && tx.is_coinbase() {
            return Err(BlockError::ExtraCoinbase(i));
        }
        let txid = tx.txid();
        if !txids.insert(txid) {
            return Err(BlockError::DuplicateTx(hex::encode(txid)));
        }
        check_transaction_sanity(tx)
            .map_err(|reason| BlockError::BadTransaction { txid: hex::encode(txid), reason })?;
    }

    if block.compute_merkle_root() != block.header.merkle_root {
        return Err(BlockError::BadMerkleRoot);
    }
    if block.compute_witness_root() != block.header.witness_root {
        return Err(BlockError::BadWitnessRoot);
    }
    Ok(())
}
