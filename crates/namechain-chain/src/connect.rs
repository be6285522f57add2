// Block connection
//
// Applies one block on top of a view whose chain state is the block's
// parent. All effects land in the view's overlay; the caller decides whether
// to commit them.
//
// SAFETY INVARIANTS:
// 1. Every input spends a coin that is unspent at that point in the block
// 2. Every covenant-bearing output passes linkage and the covenant engine
//    against the record as left by the preceding outputs
// 3. Credentials (claims, airdrop positions) mint at most once
// 4. Coinbase outputs other than credentials pay at most subsidy plus fees

use crate::error::ChainError;
use crate::network::Network;
use log::{debug, trace};
use namechain_core::{AirdropProof, Block, Claim, Covenant, CovenantKind, Decodable, Outpoint, Transaction};
use namechain_covenants::{apply_covenant, verify_linkage, CovenantContext, CovenantError, SpentCoin};
use namechain_crypto::{blake2b160, verify_signature};
use namechain_state::{ChainState, Coin, StagedBlock, StateView};

/// Verifies the ownership proof carried by a reserved-name claim.
pub trait ClaimVerifier: Send + Sync {
    fn verify(&self, claim: &Claim, height: u32) -> Result<(), String>;
}

/// Accepts any claim with a non-empty proof.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptingClaimVerifier;

impl ClaimVerifier for AcceptingClaimVerifier {
    fn verify(&self, claim: &Claim, _height: u32) -> Result<(), String> {
        if claim.proof.is_empty() {
            return Err("empty ownership proof".to_string());
        }
        Ok(())
    }
}

/// Rules in force while connecting one block.
pub struct BlockContext<'a> {
    pub network: &'a Network,
    pub claims: &'a dyn ClaimVerifier,
    /// False below the last checkpoint when checkpoints are enabled
    pub verify_scripts: bool,
}

/// Checks that `tx` input `index` is authorized to spend `coin`.
pub fn verify_spend(tx: &Transaction, index: usize, coin: &Coin) -> bool {
    let address = &coin.output.address;
    if address.version != 0 {
        // Unassigned address versions carry no spending rules yet.
        return true;
    }
    if !address.is_pubkey_hash() {
        return false;
    }
    let witness = &tx.inputs[index].witness;
    let (signature, public_key) = match witness.as_slice() {
        [signature, public_key] => (signature, public_key),
        _ => return false,
    };
    if blake2b160(public_key).as_slice() != address.hash.as_slice() {
        return false;
    }
    verify_signature(public_key, &tx.signature_hash(index, coin.value()), signature).is_ok()
}

pub async fn connect_block(
    view: &mut StateView,
    ctx: &BlockContext<'_>,
    block: &Block,
    height: u32,
) -> Result<ChainState, ChainError> {
    let hash = block.hash();
    let mut staged = StagedBlock::begin(view).await?;

    if block.header.tree_root != staged.state().tree_root {
        return Err(ChainError::BadTreeRoot { height });
    }

    let coinbase = &block.txs[0];
    if coinbase.locktime != height {
        return Err(ChainError::BadCoinbaseHeight { height, got: coinbase.locktime });
    }

    let credential_fees = connect_coinbase(&mut staged, ctx, coinbase, height).await?;

    let mut fees: u64 = 0;
    for tx in &block.txs[1..] {
        let fee = connect_transaction(&mut staged, ctx, tx, height).await?;
        fees = fees.saturating_add(fee);
    }

    // Output 0 and anything past the credential outputs is reward.
    let paid = coinbase
        .outputs
        .iter()
        .enumerate()
        .filter(|(i, _)| *i == 0 || *i >= coinbase.inputs.len())
        .fold(0u64, |acc, (_, output)| acc.saturating_add(output.value));
    let limit = ctx
        .network
        .subsidy(height)
        .saturating_add(fees)
        .saturating_add(credential_fees);
    if paid > limit {
        return Err(ChainError::BadCoinbaseValue { height, got: paid, limit });
    }

    if height % ctx.network.names.tree_interval == 0 {
        staged.commit_tree().await?;
    }

    let state = staged.finish(hash, height)?;
    debug!(
        "connected {} at height {} ({} txs, fees {})",
        hex::encode(hash),
        height,
        block.txs.len(),
        fees
    );
    Ok(state)
}

/// Connects the coinbase; returns the fees carried by its credentials.
async fn connect_coinbase(
    staged: &mut StagedBlock<'_>,
    ctx: &BlockContext<'_>,
    tx: &Transaction,
    height: u32,
) -> Result<u64, ChainError> {
    let txid = tx.txid();
    let mut fees: u64 = 0;
    staged.count_tx();

    for (i, output) in tx.outputs.iter().enumerate() {
        let linked = i > 0 && i < tx.inputs.len();
        match (&output.covenant, linked) {
            (Covenant::None, _) | (Covenant::Claim { .. }, true) => {}
            (other, _) => {
                return Err(ChainError::UnexpectedCovenant {
                    height,
                    txid: hex::encode(txid),
                    index: i,
                    covenant: other.kind(),
                });
            }
        }
    }

    for (i, input) in tx.inputs.iter().enumerate().skip(1) {
        let blob = &input.witness[0];
        let output = &tx.outputs[i];
        if output.covenant.kind() == CovenantKind::Claim {
            let claim = Claim::decode(blob).map_err(|e| ChainError::BadClaim { height, index: i, reason: e.to_string() })?;
            ctx.claims
                .verify(&claim, height)
                .map_err(|reason| ChainError::BadClaim { height, index: i, reason })?;
            if claim.to_output(height) != *output {
                return Err(ChainError::BadClaim { height, index: i, reason: "output does not match claim".into() });
            }
            let record = staged.name(&claim.name_hash()).await?;
            let cov_ctx = CovenantContext { height, outpoint: Outpoint::new(txid, i as u32), output, spent: None };
            let next = apply_covenant(&ctx.network.names, record.as_ref(), &cov_ctx).map_err(|source| {
                ChainError::Covenant { height, txid: hex::encode(txid), index: i, source }
            })?;
            if let Some(next) = next {
                staged.set_name(&next).await?;
            }
            fees = fees.saturating_add(claim.fee);
            debug!("claim for {} minted at height {}", claim.name, height);
        } else {
            let proof = AirdropProof::decode(blob)
                .map_err(|e| ChainError::BadAirdrop { height, index: i, reason: e.to_string() })?;
            if !proof.verify_inclusion(&ctx.network.airdrop_root) {
                return Err(ChainError::BadAirdrop { height, index: i, reason: "not in the airdrop tree".into() });
            }
            if ctx.verify_scripts {
                proof
                    .verify_signature()
                    .map_err(|e| ChainError::BadAirdrop { height, index: i, reason: e.to_string() })?;
            }
            if proof.to_output() != *output {
                return Err(ChainError::BadAirdrop { height, index: i, reason: "output does not match proof".into() });
            }
            if staged.is_airdrop_spent(proof.index).await? {
                return Err(ChainError::AirdropAlreadyClaimed { height, position: proof.index });
            }
            staged.mark_airdrop(proof.index);
            fees = fees.saturating_add(proof.fee);
            debug!("airdrop {} minted at height {}", proof.index, height);
        }
    }

    for (i, output) in tx.outputs.iter().enumerate() {
        staged.add_coin(Outpoint::new(txid, i as u32), output, height, true)?;
    }
    Ok(fees)
}

/// Connects a regular transaction; returns its fee.
async fn connect_transaction(
    staged: &mut StagedBlock<'_>,
    ctx: &BlockContext<'_>,
    tx: &Transaction,
    height: u32,
) -> Result<u64, ChainError> {
    let txid = tx.txid();
    let txid_hex = || hex::encode(txid);
    staged.count_tx();

    let mut spent: Vec<(Outpoint, Coin)> = Vec::with_capacity(tx.inputs.len());
    let mut input_value: u64 = 0;
    for (i, input) in tx.inputs.iter().enumerate() {
        let coin = staged
            .spend(&input.prevout)
            .await?
            .ok_or_else(|| ChainError::MissingCoin { height, txid: txid_hex(), index: i })?;
        if coin.coinbase && height.saturating_sub(coin.height) < ctx.network.coinbase_maturity {
            return Err(ChainError::PrematureSpend { height, txid: txid_hex(), index: i });
        }
        if ctx.verify_scripts && !verify_spend(tx, i, &coin) {
            return Err(ChainError::BadSignature { height, txid: txid_hex(), index: i });
        }
        input_value = input_value.saturating_add(coin.value());
        spent.push((input.prevout, coin));
    }

    let output_value = tx
        .output_value()
        .ok_or_else(|| ChainError::InsufficientFunds { height, txid: txid_hex() })?;
    if output_value > input_value {
        return Err(ChainError::InsufficientFunds { height, txid: txid_hex() });
    }

    let covenant_err = |index: usize, source: CovenantError| ChainError::Covenant { height, txid: hex::encode(txid), index, source };

    for (i, output) in tx.outputs.iter().enumerate() {
        let prior = spent.get(i);
        verify_linkage(prior.map(|(_, coin)| &coin.output.covenant), Some(&output.covenant))
            .map_err(|source| covenant_err(i, source))?;
        if output.covenant.kind() == CovenantKind::Claim {
            return Err(ChainError::UnexpectedCovenant {
                height,
                txid: txid_hex(),
                index: i,
                covenant: CovenantKind::Claim,
            });
        }
        let Some(name_hash) = output.covenant.name_hash() else {
            continue;
        };
        let record = staged.name(name_hash).await?;
        let cov_ctx = CovenantContext {
            height,
            outpoint: Outpoint::new(txid, i as u32),
            output,
            spent: prior.map(|(outpoint, coin)| SpentCoin { outpoint: *outpoint, output: &coin.output }),
        };
        let next = apply_covenant(&ctx.network.names, record.as_ref(), &cov_ctx).map_err(|source| covenant_err(i, source))?;
        if let Some(next) = next {
            staged.set_name(&next).await?;
        }
    }
    for (i, (_, coin)) in spent.iter().enumerate().skip(tx.outputs.len()) {
        verify_linkage(Some(&coin.output.covenant), None).map_err(|source| covenant_err(i, source))?;
    }

    for (i, output) in tx.outputs.iter().enumerate() {
        staged.add_coin(Outpoint::new(txid, i as u32), output, height, false)?;
    }
    trace!("connected tx {} (fee {})", txid_hex(), input_value - output_value);
    Ok(input_value - output_value)
}
