//! Property-Based Tests for PDP
//!
//! 1. **Merkle completeness**: an honest holder always passes
//! 2. **Merkle soundness**: any flipped byte inside a challenged range fails
//! 3. **Pairing completeness** and **soundness** on small inputs

#![cfg(test)]

use proptest::prelude::*;

use super::merkle::{self, MerkleSetupConfig};
use super::pairing::{random_scalar_bytes, PairingParams};

// =============================================================================
// Property Strategies
// =============================================================================

fn slice_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 600..4000)
}

fn small_config_strategy() -> impl Strategy<Value = MerkleSetupConfig> {
    (10u64..=500, 1usize..=6).prop_map(|(shrink_size, segment_size)| MerkleSetupConfig {
        shrink_size,
        segment_size,
    })
}

// =============================================================================
// Merkle Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: every entry produced by setup is answerable by the holder.
    #[test]
    fn prop_merkle_honest_holder_passes(
        data in slice_strategy(),
        cfg in small_config_strategy(),
        amount in 1usize..=4,
        ts in 0i64..i64::MAX,
    ) {
        let entries = merkle::setup(&data, amount, &cfg)?;
        prop_assert_eq!(entries.len(), amount);
        for entry in entries {
            let (_, commit) = merkle::calculate_proof(&entry.hash, ts);
            let proof = merkle::answer(&data, &entry.ranges, ts)?;
            prop_assert!(merkle::verify(&proof, &commit));
        }
    }

    /// Property: flipping a byte covered by the challenge breaks the proof.
    #[test]
    fn prop_merkle_flip_detected(
        data in slice_strategy(),
        pick in any::<prop::sample::Index>(),
        ts in 0i64..i64::MAX,
    ) {
        let entry = merkle::setup(&data, 1, &MerkleSetupConfig::default())?.remove(0);
        let (_, commit) = merkle::calculate_proof(&entry.hash, ts);

        let r = entry.ranges[pick.index(entry.ranges.len())];
        let mut corrupted = data.clone();
        corrupted[r.start as usize] ^= 0x01;

        let proof = merkle::answer(&corrupted, &entry.ranges, ts)?;
        prop_assert!(!merkle::verify(&proof, &commit));
    }
}

// =============================================================================
// Pairing Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Property: honest tags and contents verify for any round.
    #[test]
    fn prop_pairing_completeness(
        contents in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..300), 1..4),
        round in 0i64..1_000_000,
    ) {
        let params = PairingParams::new();
        let (sk, pk) = params.generate_key_pair();
        let (u, v) = (random_scalar_bytes(), random_scalar_bytes());
        let indices: Vec<u64> = (1..=contents.len() as u64).collect();

        let chal = params.generate_challenge(&indices, round, &sk, 5)?;
        let mut picked = Vec::new();
        let mut sigmas = Vec::new();
        for idx in &chal.indices {
            let c = &contents[(*idx - 1) as usize];
            picked.push(c.clone());
            sigmas.push(params.calculate_sigma_i(c, *idx, &v, &u, &sk, round)?);
        }
        let (sigma, mu) = params.prove(&picked, &chal.vs, &sigmas, &chal.rand_this_round)?;
        prop_assert!(params.verify(&chal.indices, &chal.vs, &sigma, &mu, &v, &u, &pk.to_bytes()?)?);
    }

    /// Property: altering the content of a challenged slice is detected.
    #[test]
    fn prop_pairing_soundness(
        content in prop::collection::vec(any::<u8>(), 1..300),
        pos in any::<prop::sample::Index>(),
    ) {
        let params = PairingParams::new();
        let (sk, pk) = params.generate_key_pair();
        let (u, v) = (random_scalar_bytes(), random_scalar_bytes());

        let chal = params.generate_challenge(&[1], 3, &sk, 5)?;
        let sigma_1 = params.calculate_sigma_i(&content, 1, &v, &u, &sk, 3)?;
        let mut corrupted = content.clone();
        corrupted[pos.index(content.len())] ^= 0x80;

        let (sigma, mu) = params.prove(&[corrupted], &chal.vs, &[sigma_1], &chal.rand_this_round)?;
        prop_assert!(!params.verify(&chal.indices, &chal.vs, &sigma, &mu, &v, &u, &pk.to_bytes()?)?);
    }
}
