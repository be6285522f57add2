// Name records
//
// A record is created by the first OPEN or CLAIM of a name and persists for
// the life of the chain. The auction phase is never stored: it is derived from
// the record and the query height.

use crate::params::NameParams;
use namechain_core::{Encodable, Outpoint, Writer};
use namechain_crypto::{blake2b256, Hash, ZERO_HASH};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Auction phase derived from heights alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamePhase {
    Opening,
    Bidding,
    Reveal,
    Closed,
    Revoked,
}

impl NamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamePhase::Opening => "OPENING",
            NamePhase::Bidding => "BIDDING",
            NamePhase::Reveal => "REVEAL",
            NamePhase::Closed => "CLOSED",
            NamePhase::Revoked => "REVOKED",
        }
    }
}

impl fmt::Display for NamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle summary combining phase, registration and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameState {
    Opening,
    Bidding,
    Reveal,
    /// Auction over (or claimed), not yet registered
    Closed,
    Registered,
    Transferring,
    Revoked,
    /// Openable again
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    pub name: String,
    pub name_hash: Hash,
    /// Auction (or claim) start height
    pub height: u32,
    /// Height of the last registration, renewal or finalize
    pub renewal: u32,
    /// Current owning outpoint; null until someone reveals
    pub owner: Outpoint,
    /// Price to register: the second-highest revealed bid
    pub value: u64,
    /// Highest revealed bid
    pub highest: u64,
    /// Bid commitment of the highest revealed bid
    pub highest_blind: Hash,
    /// Resource data set by REGISTER or UPDATE
    pub data: Vec<u8>,
    /// Height of a pending TRANSFER, 0 if none
    pub transfer: u32,
    /// Height of REVOKE, 0 if not revoked
    pub revoked: u32,
    /// Height of CLAIM, 0 for auctioned names
    pub claimed: u32,
    /// Claimed names cannot be registered before this height
    pub lockup: u32,
    pub renewals: u32,
    pub registered: bool,
    pub weak: bool,
    /// Height of the last state-changing covenant
    pub updated: u32,
}

impl NameRecord {
    /// Fresh record for an auction opened at `height`.
    pub fn opened(name: &str, name_hash: Hash, height: u32) -> Self {
        Self {
            name: name.to_string(),
            name_hash,
            height,
            renewal: height,
            owner: Outpoint::null(),
            value: 0,
            highest: 0,
            highest_blind: ZERO_HASH,
            data: Vec::new(),
            transfer: 0,
            revoked: 0,
            claimed: 0,
            lockup: 0,
            renewals: 0,
            registered: false,
            weak: false,
            updated: height,
        }
    }

    pub fn phase(&self, height: u32, params: &NameParams) -> NamePhase {
        if self.revoked != 0 {
            return NamePhase::Revoked;
        }
        if self.claimed != 0 {
            return NamePhase::Closed;
        }
        let bidding_start = self.height.saturating_add(params.tree_interval);
        let reveal_start = bidding_start.saturating_add(params.bidding_period);
        let closed_start = reveal_start.saturating_add(params.reveal_period);
        if height < bidding_start {
            NamePhase::Opening
        } else if height < reveal_start {
            NamePhase::Bidding
        } else if height < closed_start {
            NamePhase::Reveal
        } else {
            NamePhase::Closed
        }
    }

    /// An expired record may be reopened or reclaimed.
    pub fn is_expired(&self, height: u32, params: &NameParams) -> bool {
        if self.revoked != 0 {
            return height >= self.revoked.saturating_add(params.revocation_delay);
        }
        if self.phase(height, params) != NamePhase::Closed {
            return false;
        }
        if self.owner.is_null() {
            return true;
        }
        height >= self.renewal.saturating_add(params.renewal_window)
    }

    pub fn state(&self, height: u32, params: &NameParams) -> NameState {
        if self.is_expired(height, params) {
            return NameState::Expired;
        }
        match self.phase(height, params) {
            NamePhase::Opening => NameState::Opening,
            NamePhase::Bidding => NameState::Bidding,
            NamePhase::Reveal => NameState::Reveal,
            NamePhase::Revoked => NameState::Revoked,
            NamePhase::Closed if !self.registered => NameState::Closed,
            NamePhase::Closed if self.transfer != 0 => NameState::Transferring,
            NamePhase::Closed => NameState::Registered,
        }
    }

    /// Leaf committed into the name tree.
    pub fn commitment(&self) -> Hash {
        blake2b256(&self.encode())
    }
}

impl Encodable for NameRecord {
    fn encode_into(&self, w: &mut Writer) {
        w.write_u8(self.name.len() as u8);
        w.write_bytes(self.name.as_bytes());
        w.write_hash(&self.name_hash);
        w.write_u32(self.height);
        w.write_u32(self.renewal);
        self.owner.encode_into(w);
        w.write_u64(self.value);
        w.write_u64(self.highest);
        w.write_hash(&self.highest_blind);
        w.write_var_bytes(&self.data);
        w.write_u32(self.transfer);
        w.write_u32(self.revoked);
        w.write_u32(self.claimed);
        w.write_u32(self.lockup);
        w.write_u32(self.renewals);
        w.write_u8(self.registered as u8 | (self.weak as u8) << 1);
        w.write_u32(self.updated);
    }
}

/// Read-side view returned to wallets and exporters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameStatus {
    pub record: NameRecord,
    pub phase: NamePhase,
    pub state: NameState,
    pub expired: bool,
    pub height: u32,
}

impl NameStatus {
    pub fn new(record: NameRecord, height: u32, params: &NameParams) -> Self {
        Self {
            phase: record.phase(height, params),
            state: record.state(height, params),
            expired: record.is_expired(height, params),
            record,
            height,
        }
    }
}
