// Covenant transition engine
//
// Pure state-transition function over name records. Given the current record
// for a name, the height of the containing block, and one output carrying a
// covenant (plus the coin spent by the input at the same index), it returns
// the next record or a specific rejection. It performs no I/O.
//
// SAFETY INVARIANTS:
// 1. Every name-locked coin can only be spent into its allowed successor
//    covenant at the same index (see `verify_linkage`)
// 2. Only the outpoint recorded as owner may register, update, renew,
//    transfer, finalize or revoke
// 3. The auction winner is the highest revealed value, ties going to the
//    lowest bid commitment; the outcome does not depend on reveal order
// 4. The registration price is the second-highest revealed value

use crate::params::NameParams;
use crate::record::{NamePhase, NameRecord};
use crate::resource::{Resource, ResourceError};
use crate::rules::{create_blind, hash_name, is_valid_name, rollout};
use log::debug;
use namechain_core::{Covenant, CovenantKind, Outpoint, Output};
use namechain_crypto::Hash;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CovenantError {
    #[error("invalid name {0:?}")]
    InvalidName(String),

    #[error("name does not hash to the covenant name hash")]
    NameHashMismatch,

    #[error("name is not rolled out until height {start}")]
    NotRolledOut { start: u32 },

    #[error("name is reserved for claiming")]
    NameReserved,

    #[error("name is not reserved and cannot be claimed")]
    NameNotReserved,

    #[error("claim period has ended")]
    ClaimPeriodOver,

    #[error("name auction already open")]
    AlreadyOpen,

    #[error("name already claimed")]
    AlreadyClaimed,

    #[error("unknown name")]
    UnknownName,

    #[error("name expired")]
    NameExpired,

    #[error("name revoked")]
    NameRevoked,

    #[error("covenant bound to height {got}, expected {expected}")]
    AuctionMismatch { expected: u32, got: u32 },

    #[error("{covenant} not allowed during {phase}")]
    WrongPhase { covenant: CovenantKind, phase: NamePhase },

    #[error("bad reveal nonce")]
    BadRevealNonce,

    #[error("revealed value exceeds the bid lockup")]
    RevealExceedsLockup,

    #[error("not auction winner")]
    NotAuctionWinner,

    #[error("auction winner cannot redeem")]
    WinnerCannotRedeem,

    #[error("name already registered")]
    AlreadyRegistered,

    #[error("name not registered")]
    NotRegistered,

    #[error("claimed name locked until height {unlock}")]
    ClaimLocked { unlock: u32 },

    #[error("spent coin is not the name owner")]
    NotOwner,

    #[error("transfer in progress")]
    TransferInProgress,

    #[error("no transfer pending")]
    NoTransferPending,

    #[error("transfer locked until height {unlock}")]
    TransferLocked { unlock: u32 },

    #[error("finalize output does not pay the transfer address")]
    FinalizeAddressMismatch,

    #[error("finalize covenant does not match the name record")]
    FinalizeMismatch,

    #[error("renewal premature until height {unlock}")]
    RenewalPremature { unlock: u32 },

    #[error("output value {got}, expected {expected}")]
    BadValue { expected: u64, got: u64 },

    #[error("{output} output cannot follow a spent {spent} coin")]
    BadLinkage { spent: CovenantKind, output: CovenantKind },

    #[error("linked coin belongs to a different name")]
    LinkedNameMismatch,

    #[error("invalid resource: {0}")]
    InvalidResource(String),
}

impl From<ResourceError> for CovenantError {
    fn from(e: ResourceError) -> Self {
        CovenantError::InvalidResource(e.to_string())
    }
}

/// Coin consumed by the input at the same index as the output.
#[derive(Debug, Clone, Copy)]
pub struct SpentCoin<'a> {
    pub outpoint: Outpoint,
    pub output: &'a Output,
}

/// One covenant-bearing output being connected at `height`.
#[derive(Debug, Clone, Copy)]
pub struct CovenantContext<'a> {
    pub height: u32,
    /// Outpoint of the output being created
    pub outpoint: Outpoint,
    pub output: &'a Output,
    pub spent: Option<SpentCoin<'a>>,
}

/// Checks that the coin spent at index i may turn into the output at index i.
///
/// `spent` is the covenant of the coin consumed by input i (None when the
/// transaction has no input i or the input is a coinbase claim); `output` is
/// the covenant of output i (None when there is no output i).
pub fn verify_linkage(spent: Option<&Covenant>, output: Option<&Covenant>) -> Result<(), CovenantError> {
    use CovenantKind as K;

    let spent_kind = spent.map_or(K::None, Covenant::kind);
    let output_kind = output.map_or(K::None, Covenant::kind);

    let allowed: &[CovenantKind] = match spent_kind {
        K::None | K::Open | K::Redeem => &[K::None, K::Open, K::Bid, K::Claim],
        K::Bid => &[K::Reveal],
        K::Reveal => &[K::Redeem, K::Register],
        K::Claim => &[K::Register],
        K::Register | K::Update | K::Renew | K::Finalize => &[K::Update, K::Renew, K::Transfer, K::Revoke],
        K::Transfer => &[K::Update, K::Finalize, K::Revoke],
        // Revoked coins never enter the UTXO set.
        K::Revoke => &[],
    };
    if !allowed.contains(&output_kind) {
        return Err(CovenantError::BadLinkage { spent: spent_kind, output: output_kind });
    }

    let locked = !matches!(spent_kind, K::None | K::Open | K::Redeem);
    if locked {
        let spent_hash = spent.and_then(Covenant::name_hash);
        let output_hash = output.and_then(Covenant::name_hash);
        if spent_hash != output_hash {
            return Err(CovenantError::LinkedNameMismatch);
        }
    }
    Ok(())
}

/// Applies one output's covenant to the current record.
///
/// Returns `Ok(None)` when the record is unchanged (plain outputs, BID,
/// REDEEM) and `Ok(Some(next))` otherwise.
pub fn apply_covenant(
    params: &NameParams,
    record: Option<&NameRecord>,
    ctx: &CovenantContext<'_>,
) -> Result<Option<NameRecord>, CovenantError> {
    let next = match &ctx.output.covenant {
        Covenant::None => return Ok(None),
        Covenant::Claim { name_hash, height, name, flags, .. } => {
            apply_claim(params, record, ctx, name_hash, *height, name, *flags)?
        }
        Covenant::Open { name_hash, height, name } => apply_open(params, record, ctx, name_hash, *height, name)?,
        Covenant::Bid { name_hash, height, name, .. } => {
            check_name(name, name_hash)?;
            let record = record.ok_or(CovenantError::UnknownName)?;
            bound_to(record, *height)?;
            require_phase(record, ctx.height, params, CovenantKind::Bid, NamePhase::Bidding)?;
            return Ok(None);
        }
        Covenant::Reveal { height, nonce, .. } => apply_reveal(params, record, ctx, *height, nonce)?,
        Covenant::Redeem { height, .. } => {
            let record = record.ok_or(CovenantError::UnknownName)?;
            if *height == record.height && record.claimed == 0 {
                require_phase(record, ctx.height, params, CovenantKind::Redeem, NamePhase::Closed)?;
                let spent = spent_coin(ctx)?;
                if spent.outpoint == record.owner {
                    return Err(CovenantError::WinnerCannotRedeem);
                }
            } else if *height > record.height {
                return Err(CovenantError::AuctionMismatch { expected: record.height, got: *height });
            }
            return Ok(None);
        }
        Covenant::Register { height, resource, .. } => apply_register(params, record, ctx, *height, resource)?,
        Covenant::Update { height, resource, .. } => {
            let mut next = owned(params, record, ctx, *height)?;
            validate_resource(resource)?;
            next.data = resource.clone();
            next.transfer = 0;
            next
        }
        Covenant::Renew { height, .. } => {
            let mut next = owned(params, record, ctx, *height)?;
            if next.transfer != 0 {
                return Err(CovenantError::TransferInProgress);
            }
            let unlock = next.renewal.saturating_add(params.renewal_maturity);
            if ctx.height < unlock {
                return Err(CovenantError::RenewalPremature { unlock });
            }
            next.renewal = ctx.height;
            next.renewals += 1;
            next
        }
        Covenant::Transfer { height, .. } => {
            let mut next = owned(params, record, ctx, *height)?;
            if next.transfer != 0 {
                return Err(CovenantError::TransferInProgress);
            }
            next.transfer = ctx.height;
            next
        }
        Covenant::Finalize { name_hash, height, name, claimed, renewals, .. } => {
            check_name(name, name_hash)?;
            let mut next = owned(params, record, ctx, *height)?;
            if next.transfer == 0 {
                return Err(CovenantError::NoTransferPending);
            }
            let unlock = next.transfer.saturating_add(params.transfer_lockup);
            if ctx.height < unlock {
                return Err(CovenantError::TransferLocked { unlock });
            }
            match &spent_coin(ctx)?.output.covenant {
                Covenant::Transfer { address, .. } if *address == ctx.output.address => {}
                _ => return Err(CovenantError::FinalizeAddressMismatch),
            }
            if *claimed != next.claimed || *renewals != next.renewals {
                return Err(CovenantError::FinalizeMismatch);
            }
            next.transfer = 0;
            next.renewal = ctx.height;
            next.renewals += 1;
            next
        }
        Covenant::Revoke { height, .. } => {
            let mut next = owned(params, record, ctx, *height)?;
            next.revoked = ctx.height;
            next.transfer = 0;
            next.owner = Outpoint::null();
            next
        }
    };

    debug!(
        "covenant {} on {} at height {}",
        ctx.output.covenant.kind(),
        next.name,
        ctx.height
    );
    Ok(Some(next))
}

fn check_name(name: &str, name_hash: &Hash) -> Result<(), CovenantError> {
    if !is_valid_name(name) {
        return Err(CovenantError::InvalidName(name.to_string()));
    }
    if hash_name(name) != *name_hash {
        return Err(CovenantError::NameHashMismatch);
    }
    Ok(())
}

fn bound_to(record: &NameRecord, height: u32) -> Result<(), CovenantError> {
    if height != record.height {
        return Err(CovenantError::AuctionMismatch { expected: record.height, got: height });
    }
    Ok(())
}

fn require_phase(
    record: &NameRecord,
    height: u32,
    params: &NameParams,
    covenant: CovenantKind,
    expected: NamePhase,
) -> Result<(), CovenantError> {
    let phase = record.phase(height, params);
    if phase != expected {
        return Err(CovenantError::WrongPhase { covenant, phase });
    }
    Ok(())
}

fn spent_coin<'a>(ctx: &CovenantContext<'a>) -> Result<SpentCoin<'a>, CovenantError> {
    ctx.spent.ok_or(CovenantError::BadLinkage {
        spent: CovenantKind::None,
        output: ctx.output.covenant.kind(),
    })
}

fn same_value(expected: u64, output: &Output) -> Result<(), CovenantError> {
    if output.value != expected {
        return Err(CovenantError::BadValue { expected, got: output.value });
    }
    Ok(())
}

fn validate_resource(resource: &[u8]) -> Result<(), CovenantError> {
    if !resource.is_empty() {
        Resource::decode(resource)?;
    }
    Ok(())
}

/// A record that exists, is alive, is registered and is owned by the coin
/// being spent. Returns the record with `owner` moved to the new output.
fn owned(
    params: &NameParams,
    record: Option<&NameRecord>,
    ctx: &CovenantContext<'_>,
    height: u32,
) -> Result<NameRecord, CovenantError> {
    let record = record.ok_or(CovenantError::UnknownName)?;
    if record.revoked != 0 {
        return Err(CovenantError::NameRevoked);
    }
    if record.is_expired(ctx.height, params) {
        return Err(CovenantError::NameExpired);
    }
    bound_to(record, height)?;
    if !record.registered {
        return Err(CovenantError::NotRegistered);
    }
    let spent = spent_coin(ctx)?;
    if spent.outpoint != record.owner {
        return Err(CovenantError::NotOwner);
    }
    same_value(spent.output.value, ctx.output)?;

    let mut next = record.clone();
    next.owner = ctx.outpoint;
    next.updated = ctx.height;
    Ok(next)
}

fn apply_claim(
    params: &NameParams,
    record: Option<&NameRecord>,
    ctx: &CovenantContext<'_>,
    name_hash: &Hash,
    height: u32,
    name: &str,
    flags: u8,
) -> Result<NameRecord, CovenantError> {
    check_name(name, name_hash)?;
    if height != ctx.height {
        return Err(CovenantError::AuctionMismatch { expected: ctx.height, got: height });
    }
    if !params.is_reserved(name) {
        return Err(CovenantError::NameNotReserved);
    }
    if ctx.height >= params.claim_period {
        return Err(CovenantError::ClaimPeriodOver);
    }
    if let Some(existing) = record {
        if !existing.is_expired(ctx.height, params) {
            return Err(if existing.claimed != 0 {
                CovenantError::AlreadyClaimed
            } else {
                CovenantError::AlreadyOpen
            });
        }
    }

    let mut next = NameRecord::opened(name, *name_hash, ctx.height);
    next.claimed = ctx.height;
    next.lockup = ctx.height.saturating_add(params.lockup_period);
    next.owner = ctx.outpoint;
    next.value = ctx.output.value;
    next.highest = ctx.output.value;
    next.weak = flags & namechain_core::claim::CLAIM_FLAG_WEAK != 0;
    Ok(next)
}

fn apply_open(
    params: &NameParams,
    record: Option<&NameRecord>,
    ctx: &CovenantContext<'_>,
    name_hash: &Hash,
    height: u32,
    name: &str,
) -> Result<NameRecord, CovenantError> {
    check_name(name, name_hash)?;
    if height != 0 {
        return Err(CovenantError::AuctionMismatch { expected: 0, got: height });
    }
    same_value(0, ctx.output)?;
    if params.is_reserved(name) && ctx.height < params.claim_period {
        return Err(CovenantError::NameReserved);
    }
    let (start, _) = rollout(name_hash, params);
    if ctx.height < start {
        return Err(CovenantError::NotRolledOut { start });
    }
    if let Some(existing) = record {
        if !existing.is_expired(ctx.height, params) {
            return Err(if existing.claimed != 0 {
                CovenantError::AlreadyClaimed
            } else {
                CovenantError::AlreadyOpen
            });
        }
    }
    Ok(NameRecord::opened(name, *name_hash, ctx.height))
}

fn apply_reveal(
    params: &NameParams,
    record: Option<&NameRecord>,
    ctx: &CovenantContext<'_>,
    height: u32,
    nonce: &Hash,
) -> Result<NameRecord, CovenantError> {
    let record = record.ok_or(CovenantError::UnknownName)?;
    bound_to(record, height)?;
    require_phase(record, ctx.height, params, CovenantKind::Reveal, NamePhase::Reveal)?;

    let spent = spent_coin(ctx)?;
    let blind = match &spent.output.covenant {
        Covenant::Bid { blind, height: bid_height, .. } => {
            if *bid_height != record.height {
                return Err(CovenantError::AuctionMismatch { expected: record.height, got: *bid_height });
            }
            *blind
        }
        other => {
            return Err(CovenantError::BadLinkage { spent: other.kind(), output: CovenantKind::Reveal });
        }
    };

    let value = ctx.output.value;
    if create_blind(value, nonce) != blind {
        return Err(CovenantError::BadRevealNonce);
    }
    if value > spent.output.value {
        return Err(CovenantError::RevealExceedsLockup);
    }

    let mut next = record.clone();
    let beats = next.owner.is_null()
        || value > next.highest
        || (value == next.highest && blind < next.highest_blind);
    if beats {
        if !next.owner.is_null() {
            next.value = next.value.max(next.highest);
        }
        next.highest = value;
        next.highest_blind = blind;
        next.owner = ctx.outpoint;
    } else {
        next.value = next.value.max(value);
    }
    next.updated = ctx.height;
    Ok(next)
}

fn apply_register(
    params: &NameParams,
    record: Option<&NameRecord>,
    ctx: &CovenantContext<'_>,
    height: u32,
    resource: &[u8],
) -> Result<NameRecord, CovenantError> {
    let record = record.ok_or(CovenantError::UnknownName)?;
    if record.revoked != 0 {
        return Err(CovenantError::NameRevoked);
    }
    if record.is_expired(ctx.height, params) {
        return Err(CovenantError::NameExpired);
    }
    bound_to(record, height)?;
    require_phase(record, ctx.height, params, CovenantKind::Register, NamePhase::Closed)?;
    if record.registered {
        return Err(CovenantError::AlreadyRegistered);
    }

    let spent = spent_coin(ctx)?;
    if spent.outpoint != record.owner {
        return Err(CovenantError::NotAuctionWinner);
    }
    if matches!(spent.output.covenant, Covenant::Claim { .. }) && ctx.height < record.lockup {
        return Err(CovenantError::ClaimLocked { unlock: record.lockup });
    }
    same_value(record.value, ctx.output)?;
    validate_resource(resource)?;

    let mut next = record.clone();
    next.registered = true;
    next.data = resource.to_vec();
    next.renewal = ctx.height;
    next.owner = ctx.outpoint;
    next.updated = ctx.height;
    Ok(next)
}
