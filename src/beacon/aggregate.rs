// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Bias-resistant combiners over verified reveals (spec §4.I). Grounded on
//! `examples/original_source/randomness/commit_reveal/aggregate.py`. Both
//! `hash_xor_fold` and `hash_chain` are kept per spec §4.I "either variant
//! is acceptable"; [`AggregationMode::default`] fixes `Chain` as the
//! network-consensual choice (SPEC_FULL §9 Open Question #1).

use crate::hashing::{dhash256, Part};

use super::config::AggregationMode;
use super::errors::BeaconError;
use super::verify::RevealRecord;

fn per_reveal_digest(r: &RevealRecord, tag: &str) -> [u8; 32] {
    dhash256(
        tag,
        &[
            Part::Bytes(&[0x01]),
            Part::Int(r.round),
            Part::Bytes(&r.participant),
            Part::Bytes(&r.salt),
            Part::Bytes(&r.payload),
        ],
    )
}

fn xor32(a: [u8; 32], b: [u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// XOR-fold combiner: permutation-invariant by construction (spec §4.I, §8).
pub fn hash_xor_fold(reveals: &[RevealRecord]) -> Result<[u8; 32], BeaconError> {
    let round = reveals
        .first()
        .ok_or(BeaconError::NoReveals { round: 0 })?
        .round;
    let tag = "ANIMICA/RAND/AGG/XOR-V1";
    let mut acc = per_reveal_digest(&reveals[0], tag);
    for r in &reveals[1..] {
        acc = xor32(acc, per_reveal_digest(r, tag));
    }
    Ok(dhash256(
        tag,
        &[Part::Bytes(&[0xFF]), Part::Bytes(&acc), Part::Int(round)],
    ))
}

/// Chained combiner over reveals canonicalized by ascending participant
/// address; order-independent because the canonicalization sorts first
/// (spec §4.I, §8).
pub fn hash_chain(reveals: &[RevealRecord]) -> Result<[u8; 32], BeaconError> {
    let round = reveals
        .first()
        .ok_or(BeaconError::NoReveals { round: 0 })?
        .round;
    let tag = "ANIMICA/RAND/AGG/CHAIN-V1";

    let mut digests: Vec<(&[u8], [u8; 32])> = reveals
        .iter()
        .map(|r| (r.participant.as_slice(), per_reveal_digest(r, tag)))
        .collect();
    digests.sort_by(|a, b| a.0.cmp(b.0));

    let mut seed = dhash256(tag, &[Part::Bytes(&[0x00]), Part::Int(round)]);
    for (_, d) in &digests {
        seed = dhash256(tag, &[Part::Bytes(&[0x02]), Part::Bytes(&seed), Part::Bytes(d)]);
    }
    Ok(dhash256(tag, &[Part::Bytes(&[0xFF]), Part::Bytes(&seed)]))
}

/// Aggregate verified reveals for a round under the network's fixed
/// [`AggregationMode`] (spec §4.I).
pub fn aggregate_reveals(reveals: &[RevealRecord], mode: AggregationMode) -> Result<[u8; 32], BeaconError> {
    if reveals.is_empty() {
        return Err(BeaconError::NoReveals { round: 0 });
    }
    match mode {
        AggregationMode::XorFold => hash_xor_fold(reveals),
        AggregationMode::Chain => hash_chain(reveals),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reveal(round: u64, addr: u8, salt: u8) -> RevealRecord {
        RevealRecord {
            round,
            participant: vec![addr; 20],
            salt: vec![salt; 16],
            payload: vec![],
        }
    }

    /// Aggregation permutation invariance (spec §8): shuffling inputs does
    /// not change the XOR-fold output, and the chain combiner canonicalizes
    /// by address before folding so it too is order-independent.
    #[test]
    fn xor_fold_is_permutation_invariant() {
        let a = reveal(1, 1, 10);
        let b = reveal(1, 2, 20);
        let c = reveal(1, 3, 30);

        let fwd = hash_xor_fold(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let rev = hash_xor_fold(&[c, a, b]).unwrap();
        assert_eq!(fwd, rev);
    }

    #[test]
    fn chain_is_order_independent_on_sorted_inputs() {
        let a = reveal(1, 1, 10);
        let b = reveal(1, 2, 20);
        let c = reveal(1, 3, 30);

        let fwd = hash_chain(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let rev = hash_chain(&[c, b, a]).unwrap();
        assert_eq!(fwd, rev);
    }

    #[test]
    fn empty_reveal_set_rejected() {
        assert!(matches!(
            aggregate_reveals(&[], AggregationMode::Chain),
            Err(BeaconError::NoReveals { .. })
        ));
    }

    #[test]
    fn default_mode_is_chain() {
        assert_eq!(AggregationMode::default(), AggregationMode::Chain);
    }
}
