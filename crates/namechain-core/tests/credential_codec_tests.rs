// Claim and airdrop proof codec tests

use namechain_core::airdrop::AIRDROP_VERSION;
use namechain_core::claim::{CLAIM_VERSION, MAX_CLAIM_PROOF_SIZE};
use namechain_core::{airdrop_leaf, Address, AirdropProof, Claim, CodecError, Decodable, Encodable};
use namechain_crypto::{merkle_branch, merkle_root, Keypair};
use proptest::prelude::*;

fn claim() -> Claim {
    Claim {
        name: "cloudflare".into(),
        flags: 0,
        commit_hash: [4u8; 32],
        commit_height: 12,
        value: 1_000_000,
        fee: 1_000,
        address: Address { version: 0, hash: vec![1u8; 20] },
        proof: vec![0xab; 64],
    }
}

fn airdrop(keypair: &Keypair) -> (AirdropProof, [u8; 32]) {
    let leaves: Vec<[u8; 32]> = (0..5u64)
        .map(|i| airdrop_leaf(&Keypair::from_seed([i as u8 + 1; 32]).public_key(), 1_000 * (i + 1)))
        .collect();
    let root = merkle_root(&leaves);
    let mut proof = AirdropProof {
        index: 2,
        path: merkle_branch(&leaves, 2).unwrap(),
        key: keypair.public_key().to_vec(),
        value: 3_000,
        fee: 100,
        address: Address { version: 0, hash: vec![2u8; 20] },
        signature: Vec::new(),
    };
    proof.sign(keypair);
    (proof, root)
}

#[test]
fn claim_decodes_what_it_encodes() {
    let c = claim();
    let bytes = c.encode();
    assert_eq!(bytes[0], CLAIM_VERSION);
    assert_eq!(Claim::decode(&bytes).unwrap(), c);
}

#[test]
fn claim_rejects_unknown_version() {
    let mut bytes = claim().encode();
    bytes[0] = 1;
    assert_eq!(Claim::decode(&bytes), Err(CodecError::UnknownVersion { object: "claim", version: 1 }));
}

#[test]
fn claim_rejects_malformed_lengths() {
    // Name length of zero
    let mut bytes = claim().encode();
    bytes[1] = 0;
    assert!(matches!(Claim::decode(&bytes), Err(CodecError::TooShort { field: "claim name", .. })));

    // Name length beyond the label limit
    let mut bytes = claim().encode();
    bytes[1] = 64;
    assert!(matches!(Claim::decode(&bytes), Err(CodecError::TooLong { field: "claim name", .. })));

    // Proof length larger than the remaining input
    let mut bytes = claim().encode();
    let n = bytes.len();
    let proof_len_at = n - 64 - 2;
    bytes[proof_len_at..proof_len_at + 2].copy_from_slice(&200u16.to_le_bytes());
    assert!(matches!(Claim::decode(&bytes), Err(CodecError::UnexpectedEnd { .. })));

    // Proof length over the maximum
    let mut c = claim();
    c.proof = vec![0u8; MAX_CLAIM_PROOF_SIZE + 1];
    assert!(matches!(Claim::decode(&c.encode()), Err(CodecError::TooLong { field: "claim proof", .. })));
}

#[test]
fn claim_rejects_trailing_bytes() {
    let mut bytes = claim().encode();
    bytes.push(0);
    assert_eq!(Claim::decode(&bytes), Err(CodecError::TrailingBytes(1)));
}

#[test]
fn airdrop_verifies_inclusion_and_signature() {
    let keypair = Keypair::from_seed([3u8; 32]);
    let (proof, root) = airdrop(&keypair);
    let decoded = AirdropProof::decode(&proof.encode()).unwrap();
    assert_eq!(decoded.encode()[0], AIRDROP_VERSION);
    assert!(decoded.verify_inclusion(&root));
    assert!(decoded.verify_signature().is_ok());
    assert_eq!(decoded.to_output().value, 2_900);
}

#[test]
fn airdrop_tampering_breaks_verification() {
    let keypair = Keypair::from_seed([3u8; 32]);
    let (mut proof, root) = airdrop(&keypair);
    proof.value += 1;
    assert!(!proof.verify_inclusion(&root));
    assert!(proof.verify_signature().is_err());
}

#[test]
fn airdrop_rejects_unknown_version_and_depth() {
    let keypair = Keypair::from_seed([3u8; 32]);
    let (proof, _) = airdrop(&keypair);
    let mut bytes = proof.encode();
    bytes[0] = 7;
    assert_eq!(
        AirdropProof::decode(&bytes),
        Err(CodecError::UnknownVersion { object: "airdrop proof", version: 7 })
    );

    let mut bytes = proof.encode();
    bytes[5] = 33;
    assert!(matches!(AirdropProof::decode(&bytes), Err(CodecError::TooLong { field: "airdrop path", .. })));
}

#[test]
fn airdrop_rejects_empty_key() {
    let keypair = Keypair::from_seed([3u8; 32]);
    let (mut proof, _) = airdrop(&keypair);
    proof.key.clear();
    assert!(matches!(AirdropProof::decode(&proof.encode()), Err(CodecError::TooShort { field: "airdrop key", .. })));
}

proptest! {
    #[test]
    fn decoders_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = Claim::decode(&bytes);
        let _ = AirdropProof::decode(&bytes);
        let _ = namechain_core::Transaction::decode(&bytes);
        let _ = namechain_core::Covenant::decode(&bytes);
    }

    #[test]
    fn claim_with_any_version_byte_but_zero_is_rejected(version in 1u8..=255) {
        let mut bytes = claim().encode();
        bytes[0] = version;
        prop_assert!(
            matches!(Claim::decode(&bytes), Err(CodecError::UnknownVersion { .. })),
            "unknown claim version accepted"
        );
    }
}
