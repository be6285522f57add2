// Chain errors
//
// Every rejection names the failing block height and, where it applies, the
// transaction and input/output index. `kind()` sorts errors into the
// categories callers act on; a fatal error means the node's configuration or
// storage can no longer be trusted.

use namechain_core::{BlockError, CovenantKind};
use namechain_covenants::CovenantError;
use namechain_state::StateError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed block; no state was consulted
    Structural,
    /// Proof of work, linkage, timestamps, spends, values
    Consensus,
    /// Name auction or credential rules
    Covenant,
    /// Disagreement with a configured checkpoint
    Checkpoint,
    /// Storage failure
    Store,
    /// Already known
    Duplicate,
    /// Invalid network configuration or foreign store
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Structural => "structural",
            ErrorKind::Consensus => "consensus",
            ErrorKind::Covenant => "covenant",
            ErrorKind::Checkpoint => "checkpoint",
            ErrorKind::Store => "store",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Config => "config",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("block {hash} already known")]
    Duplicate { hash: String },

    #[error("block {hash} was previously rejected")]
    KnownInvalid { hash: String },

    #[error("malformed block {hash}: {source}")]
    Malformed { hash: String, source: BlockError },

    #[error("block at height {height}: unsupported version {version}")]
    BadVersion { height: u32, version: u32 },

    #[error("block at height {height}: hash above target")]
    HighHash { height: u32 },

    #[error("block at height {height}: bits {got:08x}, expected {expected:08x}")]
    BadBits { height: u32, expected: u32, got: u32 },

    #[error("block at height {height}: timestamp {time} not after median time past {median}")]
    TimeTooOld { height: u32, time: u64, median: u64 },

    #[error("block at height {height}: timestamp {time} too far in the future")]
    TimeTooNew { height: u32, time: u64 },

    #[error("orphan block {hash} lacks the claimed proof of work")]
    OrphanHighHash { hash: String },

    #[error("block at height {height}: tree root does not match the committed name tree")]
    BadTreeRoot { height: u32 },

    #[error("block at height {height}: coinbase locktime {got} does not commit the height")]
    BadCoinbaseHeight { height: u32, got: u32 },

    #[error("block at height {height}: coinbase pays {got}, limit {limit}")]
    BadCoinbaseValue { height: u32, got: u64, limit: u64 },

    #[error("checkpoint mismatch at height {height}: expected {expected}, got {got}")]
    CheckpointMismatch { height: u32, expected: String, got: String },

    #[error("block at height {height} forks below checkpoint {checkpoint}")]
    ForkBeforeCheckpoint { height: u32, checkpoint: u32 },

    #[error("block at height {height}: tx {txid} input {index} spends a missing or spent coin")]
    MissingCoin { height: u32, txid: String, index: usize },

    #[error("block at height {height}: tx {txid} input {index} spends an immature coinbase")]
    PrematureSpend { height: u32, txid: String, index: usize },

    #[error("block at height {height}: tx {txid} input {index} fails authorization")]
    BadSignature { height: u32, txid: String, index: usize },

    #[error("block at height {height}: tx {txid} spends more than its inputs")]
    InsufficientFunds { height: u32, txid: String },

    #[error("block at height {height}: claim at coinbase input {index}: {reason}")]
    BadClaim { height: u32, index: usize, reason: String },

    #[error("block at height {height}: airdrop at coinbase input {index}: {reason}")]
    BadAirdrop { height: u32, index: usize, reason: String },

    #[error("block at height {height}: airdrop {position} already claimed")]
    AirdropAlreadyClaimed { height: u32, position: u32 },

    #[error("block at height {height}: tx {txid} output {index} carries a {covenant} covenant it may not create")]
    UnexpectedCovenant { height: u32, txid: String, index: usize, covenant: CovenantKind },

    #[error("block at height {height}: tx {txid} output {index}: {source}")]
    Covenant { height: u32, txid: String, index: usize, source: CovenantError },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store failure: {0}")]
    Store(#[from] StateError),
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        use ChainError::*;
        match self {
            Duplicate { .. } | KnownInvalid { .. } => ErrorKind::Duplicate,
            Malformed { .. } => ErrorKind::Structural,
            BadVersion { .. }
            | HighHash { .. }
            | OrphanHighHash { .. }
            | BadBits { .. }
            | TimeTooOld { .. }
            | TimeTooNew { .. }
            | BadTreeRoot { .. }
            | BadCoinbaseHeight { .. }
            | BadCoinbaseValue { .. }
            | MissingCoin { .. }
            | PrematureSpend { .. }
            | BadSignature { .. }
            | InsufficientFunds { .. } => ErrorKind::Consensus,
            BadClaim { .. }
            | BadAirdrop { .. }
            | AirdropAlreadyClaimed { .. }
            | UnexpectedCovenant { .. }
            | Covenant { .. } => {
                ErrorKind::Covenant
            }
            CheckpointMismatch { .. } | ForkBeforeCheckpoint { .. } => ErrorKind::Checkpoint,
            Store(_) => ErrorKind::Store,
            Config(_) => ErrorKind::Config,
        }
    }

    /// Misconfiguration or storage failure; the node should stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainError::CheckpointMismatch { .. } | ChainError::Store(_) | ChainError::Config(_))
    }

    /// The failure may not hold for another copy of the same header: the body
    /// is not what the header commits to, or the timestamp is only early.
    pub fn is_malleated(&self) -> bool {
        matches!(self, ChainError::Malformed { .. } | ChainError::TimeTooNew { .. })
    }

    /// Whether the block itself is bad and should never be retried.
    pub fn is_invalid_block(&self) -> bool {
        !self.is_malleated() && !matches!(self.kind(), ErrorKind::Duplicate | ErrorKind::Store | ErrorKind::Config)
    }

    /// The covenant rejection, if this is one.
    pub fn covenant_error(&self) -> Option<&CovenantError> {
        match self {
            ChainError::Covenant { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let mismatch = ChainError::CheckpointMismatch { height: 5, expected: "aa".into(), got: "bb".into() };
        assert_eq!(mismatch.kind(), ErrorKind::Checkpoint);
        assert!(mismatch.is_fatal());

        let fork = ChainError::ForkBeforeCheckpoint { height: 3, checkpoint: 5 };
        assert_eq!(fork.kind(), ErrorKind::Checkpoint);
        assert!(!fork.is_fatal());

        let store = ChainError::from(StateError::Backend("disk".into()));
        assert!(store.is_fatal());
        assert!(!store.is_invalid_block());

        let covenant = ChainError::Covenant {
            height: 220,
            txid: "ab".into(),
            index: 0,
            source: CovenantError::NotAuctionWinner,
        };
        assert_eq!(covenant.kind(), ErrorKind::Covenant);
        assert!(covenant.to_string().contains("not auction winner"));
        assert_eq!(covenant.covenant_error(), Some(&CovenantError::NotAuctionWinner));
    }

    #[test]
    fn malleated_failures_are_retryable() {
        let early = ChainError::TimeTooNew { height: 1, time: u64::MAX };
        assert_eq!(early.kind(), ErrorKind::Consensus);
        assert!(early.is_malleated());
        assert!(!early.is_invalid_block());

        let malformed = ChainError::Malformed { hash: "aa".into(), source: BlockError::BadMerkleRoot };
        assert!(malformed.is_malleated());
        assert!(!malformed.is_invalid_block());

        let stale = ChainError::TimeTooOld { height: 1, time: 5, median: 6 };
        assert!(!stale.is_malleated());
        assert!(stale.is_invalid_block());
    }

    #[test]
    fn airdrop_message() {
        let err = ChainError::AirdropAlreadyClaimed { height: 4, position: 7 };
        assert!(err.to_string().contains("already claimed"));
    }
}
