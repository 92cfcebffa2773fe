// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Plain, serde-serializable config structs for the beacon components
//! (SPEC_FULL §12), mirroring [`crate::mempool::config`]. Grounded on
//! `examples/original_source/randomness/config.py`'s `RandomnessConfig` /
//! `VDFParams` / `QRNGConfig`, translated from a dynamically-validated
//! dataclass into a typed struct with a `validate()` that returns
//! `Result` instead of raising.

use serde::{Deserialize, Serialize};

use super::errors::BeaconError;

/// Round timing, all in whole seconds, anchored to a single UNIX timestamp
/// (spec §4.H). `round_anchor_s` is round 0's start.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RoundParams {
    pub round_anchor_s: u64,
    pub commit_phase_s: u64,
    pub reveal_phase_s: u64,
    pub vdf_phase_s: u64,
    pub reveal_grace_s: u64,
}

impl Default for RoundParams {
    fn default() -> Self {
        Self {
            round_anchor_s: 0,
            commit_phase_s: 10,
            reveal_phase_s: 10,
            vdf_phase_s: 10,
            reveal_grace_s: 2,
        }
    }
}

impl RoundParams {
    pub fn round_len_s(&self) -> u64 {
        self.commit_phase_s + self.reveal_phase_s + self.vdf_phase_s
    }

    pub fn validate(&self) -> Result<(), BeaconError> {
        if self.commit_phase_s == 0 || self.reveal_phase_s == 0 {
            return Err(BeaconError::RandError(
                "commit_phase_s and reveal_phase_s must be > 0".into(),
            ));
        }
        if self.round_len_s() == 0 {
            return Err(BeaconError::RandError("round length must be positive".into()));
        }
        Ok(())
    }
}

/// Wesolowski VDF group/iteration parameters (spec §4.J).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VdfParams {
    pub modulus_bits: u32,
    pub iterations: u64,
    /// Bit-width of the derived challenge prime ℓ (spec §4.J: "~128 bits").
    pub challenge_bits: u32,
}

impl Default for VdfParams {
    fn default() -> Self {
        Self {
            modulus_bits: 2048,
            iterations: 1 << 20,
            challenge_bits: 128,
        }
    }
}

impl VdfParams {
    pub fn validate(&self) -> Result<(), BeaconError> {
        if self.modulus_bits < 1024 || self.modulus_bits % 256 != 0 {
            return Err(BeaconError::RandError(
                "modulus_bits must be >= 1024 and a multiple of 256".into(),
            ));
        }
        if self.iterations == 0 {
            return Err(BeaconError::RandError("iterations must be > 0".into()));
        }
        if self.challenge_bits < 64 {
            return Err(BeaconError::RandError("challenge_bits must be >= 64".into()));
        }
        Ok(())
    }
}

/// Optional QRNG mixing knobs (spec §4.K step 4). Mixing itself is always
/// available; this config only governs whether an embedding node chooses to
/// fetch and supply `qrng_bytes` to [`super::finalize::finalize_round`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QrngConfig {
    pub enabled: bool,
    pub max_fetch_bytes: usize,
}

impl Default for QrngConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_fetch_bytes: 4096,
        }
    }
}

/// Network-fixed choice of reveal combiner (spec §4.I, §9 Open Question #1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationMode {
    XorFold,
    Chain,
}

impl Default for AggregationMode {
    /// Fixed to `Chain` as the network-consensual default (DESIGN.md /
    /// SPEC_FULL §9 Open Question #1); `XorFold` remains available and
    /// tested but is never the implicit choice.
    fn default() -> Self {
        AggregationMode::Chain
    }
}
