// Name auction parameters
//
// SAFETY: These parameters are locked at chain initialization. Changing them
// requires a hard fork. Tests build their own value and hand it to the chain.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Names withheld from auction so their legacy owners can CLAIM them.
pub const RESERVED_NAMES: &[&str] = &[
    "amazon", "apple", "cloudflare", "com", "facebook", "github", "google", "io", "microsoft", "net", "org",
    "twitter", "wikipedia", "youtube",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameParams {
    /// First height at which any name may be opened
    pub auction_start: u32,

    /// Blocks per rollout week
    pub rollout_interval: u32,

    /// Blocks between name-tree commitments; also the opening period
    pub tree_interval: u32,

    pub bidding_period: u32,

    pub reveal_period: u32,

    /// Blocks a claimed name waits before it may be registered
    pub lockup_period: u32,

    /// Blocks after the last renewal before a name expires
    pub renewal_window: u32,

    /// Minimum blocks between renewals
    pub renewal_maturity: u32,

    /// Reserved names can be claimed below this height and not opened
    pub claim_period: u32,

    /// Blocks a TRANSFER waits before it may be finalized
    pub transfer_lockup: u32,

    /// Blocks a revoked name stays locked before it can be reopened
    pub revocation_delay: u32,

    /// Disable the rollout schedule entirely
    pub no_rollout: bool,

    pub reserved: BTreeSet<String>,
}

impl NameParams {
    pub fn main() -> Self {
        Self {
            auction_start: 14 * 144,
            rollout_interval: 7 * 144,
            tree_interval: 36,
            bidding_period: 5 * 144,
            reveal_period: 10 * 144,
            lockup_period: 30 * 144,
            renewal_window: 2 * 365 * 144,
            renewal_maturity: 30 * 144,
            claim_period: 4 * 365 * 144,
            transfer_lockup: 2 * 144,
            revocation_delay: 14 * 144,
            no_rollout: false,
            reserved: default_reserved(),
        }
    }

    pub fn testnet() -> Self {
        Self {
            auction_start: 0,
            rollout_interval: 144,
            tree_interval: 36 >> 2,
            bidding_period: 144,
            reveal_period: 2 * 144,
            lockup_period: 144,
            renewal_window: 30 * 144,
            renewal_maturity: 144,
            claim_period: 90 * 144,
            transfer_lockup: 144,
            revocation_delay: 144,
            no_rollout: false,
            reserved: default_reserved(),
        }
    }

    pub fn regtest() -> Self {
        Self {
            auction_start: 0,
            rollout_interval: 2,
            tree_interval: 5,
            bidding_period: 5,
            reveal_period: 10,
            lockup_period: 10,
            renewal_window: 5000,
            renewal_maturity: 50,
            claim_period: 250_000,
            transfer_lockup: 10,
            revocation_delay: 50,
            no_rollout: false,
            reserved: default_reserved(),
        }
    }

    /// Validates internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.tree_interval == 0 {
            return Err("tree_interval must be > 0".to_string());
        }
        if self.bidding_period == 0 || self.reveal_period == 0 {
            return Err("bidding and reveal periods must be > 0".to_string());
        }
        if self.rollout_interval == 0 && !self.no_rollout {
            return Err("rollout_interval must be > 0 unless rollout is disabled".to_string());
        }
        let auction = self.tree_interval as u64 + self.bidding_period as u64 + self.reveal_period as u64;
        if auction >= self.renewal_window as u64 {
            return Err(format!(
                "renewal_window {} must exceed the auction length {}",
                self.renewal_window, auction
            ));
        }
        Ok(())
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    /// Total blocks from OPEN until the auction closes.
    pub fn auction_length(&self) -> u32 {
        self.tree_interval + self.bidding_period + self.reveal_period
    }
}

fn default_reserved() -> BTreeSet<String> {
    RESERVED_NAMES.iter().map(|s| s.to_string()).collect()
}
