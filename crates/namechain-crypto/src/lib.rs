//! Cryptographic primitives shared by every namechain crate.
//!
//! - `hash`: BLAKE2b-256/160 and SHA3-256 digests
//! - `merkle`: domain-separated merkle roots and inclusion paths
//! - `commitment`: order-independent set commitment for the UTXO set
//! - `signature`: ed25519 signing and verification over 32-byte digests

pub mod commitment;
pub mod hash;
pub mod merkle;
pub mod signature;

pub use commitment::SetCommitment;
pub use hash::{blake2b160, blake2b256, blake2b256_parts, sha3_256, Hash, ZERO_HASH};
pub use merkle::{merkle_branch, merkle_root, verify_merkle_path, MerklePath};
pub use signature::{verify_signature, Keypair, SignatureError};
