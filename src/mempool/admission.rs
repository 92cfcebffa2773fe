// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Admission gating and sliding-window ban accounting (spec §4.E).
//! Grounded on `blockchain/message_pool/src/errors.rs` for the flat error
//! shape, and on the fee-floor gating in
//! `examples/original_source/mempool/priority.py::admission_fee_ok`.

use std::collections::{HashMap, VecDeque};

use super::config::{AdmissionConfig, BanConfig};
use super::errors::{ctx, MempoolError};
use super::tx::{EffectiveFee, Sender};
use super::watermark::Thresholds;

/// Tracks recent rejects per sender in a sliding window and imposes a
/// temporary ban once the reject rate crosses a threshold (spec §4.E,
/// supplemented by SPEC_FULL "separate ban counters").
#[derive(Default)]
pub struct BanList {
    cfg: BanConfig,
    rejects: HashMap<Sender, VecDeque<u64>>,
    banned_until_s: HashMap<Sender, u64>,
    spam_bans: u64,
    low_fee_bans: u64,
}

impl BanList {
    pub fn new(cfg: BanConfig) -> Self {
        Self {
            cfg,
            rejects: HashMap::new(),
            banned_until_s: HashMap::new(),
            spam_bans: 0,
            low_fee_bans: 0,
        }
    }

    pub fn is_banned(&self, sender: &[u8], now_s: u64) -> bool {
        self.banned_until_s.get(sender).is_some_and(|&until| now_s < until)
    }

    /// Record a rejection for `sender` at `now_s`; if the sliding window
    /// overflows `max_rejects_in_window`, impose a ban for `ban_s`.
    fn record_reject(&mut self, sender: &[u8], now_s: u64, ban_s: u64, is_spam: bool) {
        let window = self.rejects.entry(sender.to_vec()).or_default();
        window.push_back(now_s);
        let cutoff = now_s.saturating_sub(self.cfg.window_s);
        while matches!(window.front(), Some(&t) if t < cutoff) {
            window.pop_front();
        }
        if window.len() as u32 >= self.cfg.max_rejects_in_window {
            self.banned_until_s.insert(sender.to_vec(), now_s + ban_s);
            if is_spam {
                self.spam_bans += 1;
            } else {
                self.low_fee_bans += 1;
            }
        }
    }

    pub fn record_spam_reject(&mut self, sender: &[u8], now_s: u64) {
        self.record_reject(sender, now_s, self.cfg.spam_ban_s, true);
    }

    pub fn record_low_fee_reject(&mut self, sender: &[u8], now_s: u64) {
        self.record_reject(sender, now_s, self.cfg.low_fee_ban_s, false);
    }

    pub fn spam_bans(&self) -> u64 {
        self.spam_bans
    }

    pub fn low_fee_bans(&self) -> u64 {
        self.low_fee_bans
    }
}

/// `ceil(old_wei * ratio)` via fixed-point integer arithmetic (spec §4.C/
/// §4.E). `ratio` is quantized to micro (1e6) precision and the
/// multiply-then-divide happens entirely in `u128`, so the boundary case
/// `old=1_500, ratio=1.10` lands exactly on `1_650` rather than drifting to
/// `1_651` the way `(1_500.0_f64 * 1.10).ceil()` does (IEEE-754 gives
/// `1650.0000000000002`). Shared by [`AdmissionPolicy::check_replacement`]
/// and [`super::sequencer::should_replace`] so both bump checks agree on
/// the exact same boundary.
pub(crate) fn ceil_wei_times_ratio(old_wei: u128, ratio: f64) -> u128 {
    const SCALE: u128 = 1_000_000;
    let scaled_ratio = (ratio * SCALE as f64).round().max(0.0) as u128;
    let num = old_wei.saturating_mul(scaled_ratio);
    (num + SCALE - 1) / SCALE
}

/// Admission-time fee/size/chain checks, independent of any particular
/// tx's position in a sender queue (spec §4.E).
pub struct AdmissionPolicy {
    cfg: AdmissionConfig,
}

impl AdmissionPolicy {
    pub fn new(cfg: AdmissionConfig) -> Self {
        Self { cfg }
    }

    /// spec §4.E: oversize iff `size_bytes` is outside `(0, max_tx_size]`.
    pub fn check_size(&self, size_bytes: usize) -> Result<(), MempoolError> {
        if size_bytes == 0 || size_bytes > self.cfg.max_tx_size_bytes {
            return Err(MempoolError::Oversize {
                context: ctx([
                    ("size_bytes", size_bytes.into()),
                    ("max_tx_size_bytes", self.cfg.max_tx_size_bytes.into()),
                ]),
            });
        }
        Ok(())
    }

    pub fn check_chain(&self, tx_chain_id: Option<u64>) -> Result<(), MempoolError> {
        if let Some(expected) = self.cfg.chain_id {
            if tx_chain_id.is_some_and(|id| id != expected) {
                return Err(MempoolError::WrongChain {
                    context: ctx([("expected_chain_id", expected.into())]),
                });
            }
        }
        Ok(())
    }

    /// Reject if the effective fee is below the watermark admit floor,
    /// unless the submission is local and local submissions bypass the
    /// floor (spec §4.E, §4.B).
    pub fn check_fee(
        &self,
        fee: &EffectiveFee,
        base_fee_wei: Option<u128>,
        thresholds: &Thresholds,
        local: bool,
    ) -> Result<(), MempoolError> {
        if local && self.cfg.local_bypasses_fee_floor {
            return Ok(());
        }
        let eff = fee.effective_wei(base_fee_wei);
        let floor = self.cfg.min_fee_override_wei.unwrap_or(thresholds.admit_floor_wei);
        if eff < floor {
            return Err(MempoolError::FeeTooLow {
                context: ctx([
                    ("effective_fee_wei", eff.to_string().into()),
                    ("admit_floor_wei", floor.to_string().into()),
                ]),
            });
        }
        Ok(())
    }

    /// Replacement-by-fee check (spec §4.E): `new_eff_fee` must meet or
    /// exceed `ceil(old_eff_fee * min_bump_ratio)` (spec §4.E: "fails when
    /// `new_eff_fee < ceil(old_eff_fee * ratio)`", i.e. the ceiling itself
    /// is accepted — spec §8 scenario #2 requires `old=1_500, ratio=1.10`'s
    /// exact bump of `1_650` to succeed). `min_bump_ratio` is clamped to
    /// `max(1.0, ratio)` before use (spec §9 Open Question on
    /// `rbf_min_bump` returning ratios below 1.0).
    pub fn check_replacement(
        &self,
        old_eff_fee_wei: u128,
        new_eff_fee_wei: u128,
        min_bump_ratio: f64,
    ) -> Result<(), MempoolError> {
        let ratio = min_bump_ratio.max(1.0);
        let required = ceil_wei_times_ratio(old_eff_fee_wei, ratio);
        if new_eff_fee_wei >= required {
            Ok(())
        } else {
            Err(MempoolError::ReplacementUnderpriced {
                context: ctx([
                    ("old_eff_fee_wei", old_eff_fee_wei.to_string().into()),
                    ("new_eff_fee_wei", new_eff_fee_wei.to_string().into()),
                    ("required_wei", required.to_string().into()),
                ]),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ban_triggers_after_window_overflow() {
        let cfg = BanConfig {
            window_s: 10,
            max_rejects_in_window: 3,
            spam_ban_s: 60,
            low_fee_ban_s: 15,
        };
        let mut bl = BanList::new(cfg);
        let sender = [1u8];
        assert!(!bl.is_banned(&sender, 0));
        bl.record_spam_reject(&sender, 0);
        bl.record_spam_reject(&sender, 1);
        assert!(!bl.is_banned(&sender, 1));
        bl.record_spam_reject(&sender, 2);
        assert!(bl.is_banned(&sender, 2));
        assert!(!bl.is_banned(&sender, 63));
    }

    #[test]
    fn old_rejects_fall_out_of_window() {
        let cfg = BanConfig {
            window_s: 5,
            max_rejects_in_window: 2,
            spam_ban_s: 30,
            low_fee_ban_s: 15,
        };
        let mut bl = BanList::new(cfg);
        let sender = [2u8];
        bl.record_low_fee_reject(&sender, 0);
        bl.record_low_fee_reject(&sender, 100);
        assert!(!bl.is_banned(&sender, 100));
    }

    #[test]
    fn oversize_tx_is_rejected() {
        let policy = AdmissionPolicy::new(AdmissionConfig {
            max_tx_size_bytes: 100,
            ..Default::default()
        });
        assert!(policy.check_size(101).is_err());
        assert!(policy.check_size(100).is_ok());
        assert!(policy.check_size(0).is_err());
    }

    #[test]
    fn local_bypasses_fee_floor() {
        let policy = AdmissionPolicy::new(AdmissionConfig::default());
        let th = Thresholds {
            admit_floor_wei: 1_000_000,
            evict_below_wei: 0,
            utilization: 0.1,
        };
        let fee = EffectiveFee::Legacy { gas_price_wei: 1 };
        assert!(policy.check_fee(&fee, None, &th, true).is_ok());
        assert!(policy.check_fee(&fee, None, &th, false).is_err());
    }

    /// Scenario 2 (spec §8): replacement with the exact bump succeeds.
    #[test]
    fn rbf_accept_with_exact_bump() {
        let policy = AdmissionPolicy::new(AdmissionConfig::default());
        assert!(policy.check_replacement(1_500, 1_650, 1.10).is_ok());
        assert!(policy.check_replacement(1_500, 1_649, 1.10).is_err());
        assert!(policy.check_replacement(1_500, 1_500, 1.10).is_err());
    }

    #[test]
    fn check_replacement_clamps_sub_unity_ratio() {
        let policy = AdmissionPolicy::new(AdmissionConfig::default());
        // A ratio below 1.0 is clamped to 1.0, so `required == old_fee`
        // exactly and the boundary-inclusive check admits the equal fee.
        assert!(policy.check_replacement(1_000, 1_000, 0.5).is_ok());
        assert!(policy.check_replacement(1_000, 999, 0.5).is_err());
    }
}
