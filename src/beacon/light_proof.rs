// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Compact proofs for light clients to verify a single beacon round, or a
//! contiguous run of rounds from a trusted anchor, without replaying the
//! full commit-reveal protocol (spec §4.M). Grounded on
//! `examples/original_source/randomness/beacon/light_proof.py`.

use num_bigint::BigUint;

use crate::hashing::Part;

use super::config::VdfParams;
use super::errors::BeaconError;
use super::finalize::BeaconOut;
use super::vdf::{self, VdfProof};

const BEACON_OUT_HASH_TAG: &str = "animica:beacon:out-hash:v1";

/// `H = dhash256(tag, round_id || output)` (spec §4.M), used to chain
/// light proofs without carrying full `BeaconOut`s.
pub fn hash_beacon_out_min(out: &BeaconOut) -> [u8; 32] {
    hash_round_output(out.round_id, &out.output)
}

fn hash_round_output(round_id: u64, output: &[u8]) -> [u8; 32] {
    crate::hashing::dhash256(BEACON_OUT_HASH_TAG, &[Part::Int(round_id), Part::Bytes(output)])
}

/// A self-contained proof that `round_id`'s output is correct, chained to
/// the previous round's output hash (spec §4.M).
#[derive(Clone, Debug)]
pub struct LightProof {
    pub round_id: u64,
    pub prev_out_hash: [u8; 32],
    pub vdf_input: [u8; 32],
    pub vdf_proof: VdfProof,
    pub output: Vec<u8>,
}

impl LightProof {
    /// Build a light proof from a finalized round's components (spec §4.M).
    /// `vdf_proof` must be the proof produced alongside `current` — it is
    /// not recoverable from `BeaconOut` alone, since only the VDF output
    /// (not `(l, pi)`) is persisted in the published record.
    pub fn from_beacon(current: &BeaconOut, prev: &BeaconOut, vdf_proof: VdfProof) -> Result<Self, BeaconError> {
        if current.round_id != prev.round_id + 1 {
            return Err(BeaconError::NonMonotonicRound {
                current: prev.round_id,
                requested: current.round_id,
            });
        }
        Ok(Self {
            round_id: current.round_id,
            prev_out_hash: hash_beacon_out_min(prev),
            vdf_input: current.vdf_input,
            vdf_proof,
            output: current.output.clone(),
        })
    }

    pub fn sanity_check(&self) -> Result<(), BeaconError> {
        if self.output.is_empty() {
            return Err(BeaconError::RandError("light proof output must be non-empty".into()));
        }
        Ok(())
    }
}

/// Verify a single [`LightProof`] against an optional previous [`BeaconOut`]
/// (spec §4.M): checks the hash chain (if `prev` supplied) and the VDF
/// proof itself.
pub fn verify_light_proof(
    proof: &LightProof,
    prev: Option<&BeaconOut>,
    vdf_params: &VdfParams,
    modulus: &BigUint,
) -> Result<bool, BeaconError> {
    proof.sanity_check()?;

    if let Some(prev) = prev {
        if prev.round_id != proof.round_id - 1 {
            return Ok(false);
        }
        if hash_beacon_out_min(prev) != proof.prev_out_hash {
            return Ok(false);
        }
    }

    match vdf::verify(proof.round_id, &proof.vdf_input, &proof.vdf_proof, vdf_params, modulus) {
        Ok(()) => Ok(true),
        Err(BeaconError::VDFInvalid { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Verify a contiguous ascending-round chain of [`LightProof`]s starting
/// from a trusted anchor hash (spec §4.M). Returns the newest verified
/// output hash and round on success.
pub fn verify_chain_from_anchor(
    anchor_prev_out_hash: [u8; 32],
    proofs: &[LightProof],
    vdf_params: &VdfParams,
    modulus: &BigUint,
) -> Result<(bool, Option<[u8; 32]>, Option<u64>), BeaconError> {
    let mut expected_prev = anchor_prev_out_hash;
    let mut last_hash = None;
    let mut last_round = None;
    let mut prev_round: Option<u64> = None;

    for p in proofs {
        p.sanity_check()?;

        if let Some(pr) = prev_round {
            if p.round_id != pr + 1 {
                return Ok((false, None, None));
            }
        }
        if p.prev_out_hash != expected_prev {
            return Ok((false, None, None));
        }

        match vdf::verify(p.round_id, &p.vdf_input, &p.vdf_proof, vdf_params, modulus) {
            Ok(()) => {}
            Err(BeaconError::VDFInvalid { .. }) => return Ok((false, None, None)),
            Err(e) => return Err(e),
        }

        let h = hash_round_output(p.round_id, &p.output);
        expected_prev = h;
        last_hash = Some(h);
        prev_round = Some(p.round_id);
        last_round = prev_round;
    }

    if last_hash.is_none() {
        return Ok((true, Some(anchor_prev_out_hash), None));
    }
    Ok((true, last_hash, last_round))
}
