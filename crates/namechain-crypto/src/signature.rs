// ed25519 signatures over 32-byte digests
//
// Used for spending version-0 addresses and for airdrop proofs.

use crate::hash::Hash;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use thiserror::Error;

pub const PUBLIC_KEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("public key must be 32 bytes, got {0}")]
    BadKeyLength(usize),
    #[error("signature must be 64 bytes, got {0}")]
    BadSignatureLength(usize),
    #[error("public key is not a valid curve point")]
    BadKey,
    #[error("signature does not verify")]
    Invalid,
}

/// Verifies `signature` by `public_key` over `digest`.
pub fn verify_signature(public_key: &[u8], digest: &Hash, signature: &[u8]) -> Result<(), SignatureError> {
    let key: [u8; PUBLIC_KEY_SIZE] = public_key
        .try_into()
        .map_err(|_| SignatureError::BadKeyLength(public_key.len()))?;
    let sig: [u8; SIGNATURE_SIZE] = signature
        .try_into()
        .map_err(|_| SignatureError::BadSignatureLength(signature.len()))?;
    let key = VerifyingKey::from_bytes(&key).map_err(|_| SignatureError::BadKey)?;
    key.verify_strict(digest, &Signature::from_bytes(&sig))
        .map_err(|_| SignatureError::Invalid)
}

/// A signing keypair derived from a fixed 32-byte seed.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { signing: SigningKey::from_bytes(&seed) }
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.signing.verifying_key().to_bytes()
    }

    pub fn sign(&self, digest: &Hash) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(digest).to_bytes()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Keypair({})", hex::encode(self.public_key()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::blake2b256;

    #[test]
    fn sign_then_verify() {
        let pair = Keypair::from_seed([7u8; 32]);
        let digest = blake2b256(b"spend");
        let sig = pair.sign(&digest);
        assert_eq!(verify_signature(&pair.public_key(), &digest, &sig), Ok(()));
        let other = blake2b256(b"other");
        assert_eq!(verify_signature(&pair.public_key(), &other, &sig), Err(SignatureError::Invalid));
    }

    #[test]
    fn rejects_bad_lengths() {
        let digest = blake2b256(b"x");
        assert_eq!(verify_signature(&[0u8; 31], &digest, &[0u8; 64]), Err(SignatureError::BadKeyLength(31)));
        let pair = Keypair::from_seed([1u8; 32]);
        assert_eq!(
            verify_signature(&pair.public_key(), &digest, &[0u8; 10]),
            Err(SignatureError::BadSignatureLength(10))
        );
    }
}
