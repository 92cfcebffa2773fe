// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Round finalization: aggregate reveals, verify the VDF proof over the
//! derived input, optionally mix in QRNG bytes, and emit a [`BeaconOut`]
//! (spec §4.K). Grounded on
//! `examples/original_source/randomness/beacon/finalize.py`. Performs no
//! network or storage I/O; callers persist the returned [`BeaconOut`]
//! through [`super::kv`].

use num_bigint::BigUint;

use crate::hashing::{dhash512, sha3_256, sha3_512, Part};

use super::aggregate::aggregate_reveals;
use super::config::{AggregationMode, VdfParams};
use super::errors::BeaconError;
use super::vdf::{self, VdfProof};
use super::verify::RevealRecord;

/// Minimal beacon state needed to finalize the next round: the previous
/// round's output, used to chain VDF inputs (spec §4.K).
#[derive(Clone, Debug)]
pub struct BeaconState {
    pub last_round_id: u64,
    pub prev_output: Vec<u8>,
}

impl BeaconState {
    pub fn genesis() -> Self {
        Self {
            last_round_id: 0,
            prev_output: vec![0u8; 32],
        }
    }
}

/// A finalized round's published record (spec §4.K).
#[derive(Clone, Debug)]
pub struct BeaconOut {
    pub round_id: u64,
    pub output: Vec<u8>,
    pub aggregate: [u8; 32],
    pub vdf_input: [u8; 32],
    pub vdf_output: Vec<u8>,
    pub mixed_with_qrng: bool,
}

/// `VDF_IN = SHA3-256(tag || round_id || H(prev_beacon || aggregate))`
/// (spec §4.K step 2).
fn derive_vdf_input(prev_beacon: &[u8], aggregate: &[u8; 32], round_id: u64) -> [u8; 32] {
    let raw = dhash512(
        "ANIMICA/RAND/VDF-IN-RAW-V1",
        &[Part::Bytes(prev_beacon), Part::Bytes(aggregate), Part::Int(round_id)],
    );
    sha3_256(&[b"ANIMICA/RAND/VDF-IN-V1".as_slice(), &round_id.to_be_bytes(), &raw].concat())
}

fn finalize_bytes_from_vdf(vdf_out: &[u8], round_id: u64) -> Vec<u8> {
    sha3_512(&[b"ANIMICA/RAND/FINAL-V1".as_slice(), &round_id.to_be_bytes(), vdf_out].concat())
        .to_vec()
}

/// Extract-then-XOR style mix of VDF output with QRNG bytes, bound to a
/// round/VDF-specific transcript so QRNG bytes can't be replayed across
/// rounds (spec §4.K step 3).
fn mix_with_qrng(vdf_out: &[u8], qrng: &[u8], transcript: &[u8; 32]) -> Vec<u8> {
    let extracted = sha3_512(&[b"ANIMICA/RAND/QRNG-EXTRACT-V1".as_slice(), transcript, qrng].concat());
    let mut out = vec![0u8; vdf_out.len().max(extracted.len())];
    for i in 0..out.len() {
        let a = vdf_out.get(i).copied().unwrap_or(0);
        let b = extracted.get(i).copied().unwrap_or(0);
        out[i] = a ^ b;
    }
    out
}

/// Finalize `round_id` given verified reveals and a VDF proof over the
/// derived input. Returns [`BeaconError::VDFInvalid`] if the proof does not
/// verify, or [`BeaconError::NoReveals`] if `reveals` is empty (spec §4.K,
/// §9 Open Question #2 — no fallback to `prev_output`).
pub fn finalize_round(
    state: &BeaconState,
    round_id: u64,
    reveals: &[RevealRecord],
    agg_mode: AggregationMode,
    vdf_proof: &VdfProof,
    vdf_params: &VdfParams,
    modulus: &BigUint,
    qrng_bytes: Option<&[u8]>,
) -> Result<BeaconOut, BeaconError> {
    if round_id <= state.last_round_id && state.last_round_id != 0 {
        return Err(BeaconError::NonMonotonicRound {
            current: state.last_round_id,
            requested: round_id,
        });
    }

    let agg = aggregate_reveals(reveals, agg_mode)?;

    let vdf_input = derive_vdf_input(&state.prev_output, &agg, round_id);
    vdf::verify(round_id, &vdf_input, vdf_proof, vdf_params, modulus)?;
    let vdf_output = vdf_proof.y.to_bytes_be();

    let transcript = dhash512(
        "ANIMICA/RAND/MIX-V1",
        &[Part::Int(round_id), Part::Bytes(&vdf_input), Part::Bytes(&vdf_output)],
    );
    let transcript32: [u8; 32] = sha3_256(&transcript);

    let (final_bytes, mixed) = match qrng_bytes {
        Some(q) if !q.is_empty() => (mix_with_qrng(&vdf_output, q, &transcript32), true),
        _ => (vdf_output.clone(), false),
    };

    let output = if mixed {
        finalize_bytes_from_vdf(&final_bytes, round_id)
    } else {
        finalize_bytes_from_vdf(&vdf_output, round_id)
    };

    Ok(BeaconOut {
        round_id,
        output,
        aggregate: agg,
        vdf_input,
        vdf_output,
        mixed_with_qrng: mixed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon::vdf::prove;

    fn small_modulus() -> BigUint {
        BigUint::from(3233u32)
    }

    fn tiny_params() -> VdfParams {
        VdfParams {
            modulus_bits: 1024,
            iterations: 30,
            challenge_bits: 64,
        }
    }

    fn reveal(round: u64, addr: u8) -> RevealRecord {
        RevealRecord {
            round,
            participant: vec![addr; 20],
            salt: vec![1u8; 16],
            payload: vec![],
        }
    }

    #[test]
    fn finalize_happy_path_is_deterministic() {
        let state = BeaconState::genesis();
        let reveals = vec![reveal(1, 1), reveal(1, 2)];
        let n = small_modulus();
        let params = tiny_params();

        let agg = aggregate_reveals(&reveals, AggregationMode::Chain).unwrap();
        let vdf_input = derive_vdf_input(&state.prev_output, &agg, 1);
        let proof = prove(&vdf_input, &params, &n).unwrap();

        let out1 = finalize_round(&state, 1, &reveals, AggregationMode::Chain, &proof, &params, &n, None).unwrap();
        let out2 = finalize_round(&state, 1, &reveals, AggregationMode::Chain, &proof, &params, &n, None).unwrap();
        assert_eq!(out1.output, out2.output);
        assert!(!out1.mixed_with_qrng);
    }

    #[test]
    fn qrng_mix_changes_output_and_sets_flag() {
        let state = BeaconState::genesis();
        let reveals = vec![reveal(1, 1), reveal(1, 2)];
        let n = small_modulus();
        let params = tiny_params();

        let agg = aggregate_reveals(&reveals, AggregationMode::Chain).unwrap();
        let vdf_input = derive_vdf_input(&state.prev_output, &agg, 1);
        let proof = prove(&vdf_input, &params, &n).unwrap();

        let plain = finalize_round(&state, 1, &reveals, AggregationMode::Chain, &proof, &params, &n, None).unwrap();
        let mixed = finalize_round(
            &state,
            1,
            &reveals,
            AggregationMode::Chain,
            &proof,
            &params,
            &n,
            Some(b"qrng-entropy-bytes"),
        )
        .unwrap();

        assert_ne!(plain.output, mixed.output);
        assert!(mixed.mixed_with_qrng);
    }

    #[test]
    fn empty_reveals_rejected() {
        let state = BeaconState::genesis();
        let n = small_modulus();
        let params = tiny_params();
        let proof = prove(b"irrelevant", &params, &n).unwrap();
        assert!(matches!(
            finalize_round(&state, 1, &[], AggregationMode::Chain, &proof, &params, &n, None),
            Err(BeaconError::NoReveals { .. })
        ));
    }

    #[test]
    fn bad_vdf_proof_rejected() {
        let state = BeaconState::genesis();
        let reveals = vec![reveal(1, 1)];
        let n = small_modulus();
        let params = tiny_params();
        // Proof built over the wrong input must fail verification.
        let wrong_proof = prove(b"wrong-seed", &params, &n).unwrap();
        assert!(matches!(
            finalize_round(&state, 1, &reveals, AggregationMode::Chain, &wrong_proof, &params, &n, None),
            Err(BeaconError::VDFInvalid { .. })
        ));
    }
}
