// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Round/phase timing math (spec §4.H), derived from a single time anchor
//! so tests stay deterministic (caller always supplies `now`). Grounded on
//! `examples/original_source/randomness/commit_reveal/round_manager.py`,
//! trimmed of its "backwards-compatible alias" methods per SPEC_FULL §9.

use super::config::RoundParams;
use super::errors::BeaconError;

pub type RoundId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Pre,
    Commit,
    Reveal,
    Vdf,
    Closed,
}

/// Absolute UNIX-second boundaries for a single round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundBoundaries {
    pub start_s: u64,
    pub commit_end_s: u64,
    pub reveal_end_s: u64,
    pub vdf_end_s: u64,
}

impl RoundBoundaries {
    pub fn round_end_s(&self) -> u64 {
        self.vdf_end_s
    }
}

/// Computes round boundaries and enforces commit/reveal timing (spec §4.H).
/// All helpers are pure functions of `(now, round_id)`; no internal clock.
pub struct RoundManager {
    params: RoundParams,
}

impl RoundManager {
    pub fn new(params: RoundParams) -> Result<Self, BeaconError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &RoundParams {
        &self.params
    }

    pub fn boundaries(&self, round: RoundId) -> RoundBoundaries {
        let p = &self.params;
        let start = p.round_anchor_s + round * p.round_len_s();
        let commit_end = start + p.commit_phase_s;
        let reveal_end = commit_end + p.reveal_phase_s;
        let vdf_end = reveal_end + p.vdf_phase_s;
        RoundBoundaries {
            start_s: start,
            commit_end_s: commit_end,
            reveal_end_s: reveal_end,
            vdf_end_s: vdf_end,
        }
    }

    /// Round containing `now_s`. Times before the anchor clamp to round 0,
    /// matching the original source's bring-up convenience.
    pub fn round_id_for_time(&self, now_s: u64) -> RoundId {
        if now_s < self.params.round_anchor_s {
            return 0;
        }
        (now_s - self.params.round_anchor_s) / self.params.round_len_s()
    }

    pub fn phase_at(&self, now_s: u64, round: RoundId) -> Phase {
        let b = self.boundaries(round);
        if now_s < b.start_s {
            Phase::Pre
        } else if now_s < b.commit_end_s {
            Phase::Commit
        } else if now_s < b.reveal_end_s {
            Phase::Reveal
        } else if now_s < b.vdf_end_s {
            Phase::Vdf
        } else {
            Phase::Closed
        }
    }

    /// `now ∈ [start, commit_end)` (spec §4.H).
    pub fn can_accept_commit(&self, now_s: u64, round: RoundId) -> bool {
        let b = self.boundaries(round);
        b.start_s <= now_s && now_s < b.commit_end_s
    }

    /// `now ∈ [commit_end, reveal_end + grace)` (spec §4.H).
    pub fn can_accept_reveal(&self, now_s: u64, round: RoundId) -> bool {
        let b = self.boundaries(round);
        let grace_end = b.reveal_end_s + self.params.reveal_grace_s;
        b.commit_end_s <= now_s && now_s < grace_end.max(b.commit_end_s)
    }

    /// Raises [`BeaconError::CommitTooLate`] outside the commit window. We
    /// deliberately do not distinguish "too early" to avoid a timing leak
    /// (spec §4.H).
    pub fn enforce_commit_timing(&self, now_s: u64, round: RoundId) -> Result<(), BeaconError> {
        if self.can_accept_commit(now_s, round) {
            return Ok(());
        }
        let b = self.boundaries(round);
        Err(BeaconError::CommitTooLate {
            round,
            now_s,
            commit_end_s: b.commit_end_s,
        })
    }

    pub fn enforce_reveal_timing(&self, now_s: u64, round: RoundId) -> Result<(), BeaconError> {
        let b = self.boundaries(round);
        if now_s < b.commit_end_s {
            return Err(BeaconError::RevealTooEarly {
                round,
                now_s,
                reveal_start_s: b.commit_end_s,
            });
        }
        let grace_end = b.reveal_end_s + self.params.reveal_grace_s;
        if now_s >= grace_end.max(b.commit_end_s) {
            return Err(BeaconError::BadReveal {
                round,
                reason: format!(
                    "reveal too late at t={now_s} (window [{},{}), grace until {grace_end})",
                    b.commit_end_s, b.reveal_end_s
                ),
            });
        }
        Ok(())
    }

    pub fn window_remaining_commit(&self, now_s: u64, round: RoundId) -> u64 {
        let b = self.boundaries(round);
        if !(b.start_s <= now_s && now_s < b.commit_end_s) {
            return 0;
        }
        b.commit_end_s - now_s
    }

    pub fn window_remaining_reveal(&self, now_s: u64, round: RoundId) -> u64 {
        let b = self.boundaries(round);
        if now_s < b.commit_end_s {
            return 0;
        }
        let grace_end = b.reveal_end_s + self.params.reveal_grace_s;
        if now_s >= grace_end {
            return 0;
        }
        grace_end - now_s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rm() -> RoundManager {
        RoundManager::new(RoundParams {
            round_anchor_s: 1_000,
            commit_phase_s: 10,
            reveal_phase_s: 10,
            vdf_phase_s: 10,
            reveal_grace_s: 2,
        })
        .unwrap()
    }

    /// Scenario 5 (spec §8): commit-reveal round happy path.
    #[test]
    fn commit_reveal_round_happy_path() {
        let rm = rm();
        assert!(rm.can_accept_commit(1_005, 0));
        assert!(rm.enforce_commit_timing(1_005, 0).is_ok());

        assert!(!rm.can_accept_commit(1_012, 0));
        assert!(matches!(
            rm.enforce_commit_timing(1_012, 0),
            Err(BeaconError::CommitTooLate { .. })
        ));
        assert!(rm.can_accept_reveal(1_012, 0));

        // reveal_end = 1020, grace extends acceptance to 1022.
        assert!(rm.can_accept_reveal(1_021, 0));
        assert!(!rm.can_accept_reveal(1_022, 0));
    }

    #[test]
    fn reveal_before_commit_closes_is_too_early() {
        let rm = rm();
        assert!(matches!(
            rm.enforce_reveal_timing(1_005, 0),
            Err(BeaconError::RevealTooEarly { .. })
        ));
    }

    #[test]
    fn phases_partition_the_round_line() {
        let rm = rm();
        assert_eq!(rm.phase_at(999, 0), Phase::Pre);
        assert_eq!(rm.phase_at(1_000, 0), Phase::Commit);
        assert_eq!(rm.phase_at(1_010, 0), Phase::Reveal);
        assert_eq!(rm.phase_at(1_020, 0), Phase::Vdf);
        assert_eq!(rm.phase_at(1_030, 0), Phase::Closed);
    }

    #[test]
    fn round_id_for_time_clamps_before_anchor() {
        let rm = rm();
        assert_eq!(rm.round_id_for_time(0), 0);
        assert_eq!(rm.round_id_for_time(1_000), 0);
        assert_eq!(rm.round_id_for_time(1_030), 1);
    }
}
