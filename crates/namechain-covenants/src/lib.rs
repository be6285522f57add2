//! Name auction covenants.
//!
//! `engine::apply_covenant` is the single entry point the chain uses to
//! validate a covenant-bearing output against the current name record; it is
//! pure, so the chain can stage a block's effects and commit or discard them.

pub mod engine;
pub mod params;
pub mod record;
pub mod resource;
pub mod rules;

pub use engine::{apply_covenant, verify_linkage, CovenantContext, CovenantError, SpentCoin};
pub use params::NameParams;
pub use record::{NamePhase, NameRecord, NameState, NameStatus};
pub use resource::{Record, Resource, ResourceError};
pub use rules::{create_blind, grind_name, hash_name, is_valid_name, rollout};
