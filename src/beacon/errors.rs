// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Beacon error taxonomy (spec §7), a flat `thiserror` enum in the same
//! style as [`crate::mempool::errors::MempoolError`] rather than the
//! original source's per-phase exception subclasses
//! (`examples/original_source/randomness/errors.py`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("commit for round {round} arrived too late (now={now_s}, commit_end={commit_end_s})")]
    CommitTooLate {
        round: u64,
        now_s: u64,
        commit_end_s: u64,
    },
    #[error("reveal for round {round} arrived before the reveal window opened (now={now_s}, reveal_start={reveal_start_s})")]
    RevealTooEarly {
        round: u64,
        now_s: u64,
        reveal_start_s: u64,
    },
    #[error("bad reveal for round {round}: {reason}")]
    BadReveal { round: u64, reason: String },
    #[error("VDF proof invalid for round {round}: {reason}")]
    VDFInvalid { round: u64, reason: VdfInvalidReason },
    #[error("round {round} has no verified reveals to aggregate")]
    NoReveals { round: u64 },
    #[error("beacon rounds may not advance backward (current={current}, requested={requested})")]
    NonMonotonicRound { current: u64, requested: u64 },
    #[error("randomness pipeline error: {0}")]
    RandError(String),
}

/// `reason` values for [`BeaconError::VDFInvalid`], spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VdfInvalidReason {
    InvalidProof,
    MismatchY,
    WrongIterations,
}

impl std::fmt::Display for VdfInvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            VdfInvalidReason::InvalidProof => "invalid-proof",
            VdfInvalidReason::MismatchY => "mismatch-y",
            VdfInvalidReason::WrongIterations => "wrong-iterations",
        })
    }
}

impl BeaconError {
    /// Stable integer code. Reserved range disjoint from
    /// [`crate::mempool::errors::MempoolError::code`] (spec §7).
    pub fn code(&self) -> u32 {
        match self {
            BeaconError::CommitTooLate { .. } => 2001,
            BeaconError::RevealTooEarly { .. } => 2002,
            BeaconError::BadReveal { .. } => 2003,
            BeaconError::VDFInvalid { .. } => 2004,
            BeaconError::NoReveals { .. } => 2005,
            BeaconError::NonMonotonicRound { .. } => 2006,
            BeaconError::RandError(_) => 2000,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            BeaconError::CommitTooLate { .. } => "commit_too_late",
            BeaconError::RevealTooEarly { .. } => "reveal_too_early",
            BeaconError::BadReveal { .. } => "bad_reveal",
            BeaconError::VDFInvalid { .. } => "vdf_invalid",
            BeaconError::NoReveals { .. } => "no_reveals",
            BeaconError::NonMonotonicRound { .. } => "non_monotonic_round",
            BeaconError::RandError(_) => "rand_error",
        }
    }
}
