// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Priority scoring used for eviction and ready-queue ordering (spec §4.F
//! feeds on this; "Priority" interface is injected to break the cyclic
//! mempool/priority coupling per spec §9). Grounded on
//! `examples/original_source/mempool/priority.py`.

use serde::{Deserialize, Serialize};

use super::tx::{EffectiveFee, TxMeta};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PriorityConfig {
    pub tip_log_scale_wei: u128,
    pub tip_weight: f64,
    pub age_halflife_s: f64,
    pub age_weight: f64,
    pub size_weight: f64,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            tip_log_scale_wei: 1_000_000_000,
            tip_weight: 1.0,
            age_halflife_s: 120.0,
            age_weight: 0.35,
            size_weight: 0.20,
        }
    }
}

fn tip_at(fee: &EffectiveFee, base_fee_wei: Option<u128>) -> u128 {
    match *fee {
        EffectiveFee::Legacy { gas_price_wei } => gas_price_wei,
        EffectiveFee::Eip1559 {
            max_fee_per_gas_wei,
            max_priority_fee_per_gas_wei,
        } => {
            let base = base_fee_wei.unwrap_or(0);
            if max_fee_per_gas_wei < base {
                0
            } else {
                max_priority_fee_per_gas_wei.min(max_fee_per_gas_wei - base)
            }
        }
    }
}

fn age_bonus(age_s: f64, halflife_s: f64) -> f64 {
    if age_s <= 0.0 {
        return 0.0;
    }
    1.0 - 2f64.powf(-(age_s / halflife_s.max(1e-9)))
}

fn tip_term(tip_wei: u128, scale_wei: u128) -> f64 {
    let scale = scale_wei.max(1) as f64;
    (tip_wei as f64 / scale).ln_1p()
}

fn size_penalty(size_bytes: usize) -> f64 {
    (1.0 + size_bytes as f64).log2()
}

/// Trait seam so the eviction planner can order candidates without
/// depending on a concrete scoring implementation (spec §9: the cyclic
/// mempool/priority coupling is broken by injecting this interface).
pub trait Priority {
    fn effective_priority(&self, fee: &EffectiveFee, meta: &TxMeta, base_fee_wei: Option<u128>, now_s: u64) -> f64;

    /// Optional context-aware override of the RBF minimum bump ratio for a
    /// replacement of `old` (spec §4.G: "possibly context-aware from the
    /// priority module"). `None` defers to the pool's configured
    /// `RbfConfig::ratio()`. Any ratio returned below `1.0` is clamped up by
    /// the caller (spec §9 Open Question on `rbf_min_bump`).
    fn rbf_min_bump(&self, _old: &TxMeta) -> Option<f64> {
        None
    }
}

/// Default scorer:
/// `tip_weight*ln(1+tip/scale) + age_weight*(1-2^(-age/halflife)) - size_weight*log2(1+size)`
pub struct DefaultPriority(pub PriorityConfig);

impl Default for DefaultPriority {
    fn default() -> Self {
        Self(PriorityConfig::default())
    }
}

impl Priority for DefaultPriority {
    fn effective_priority(&self, fee: &EffectiveFee, meta: &TxMeta, base_fee_wei: Option<u128>, now_s: u64) -> f64 {
        let p = &self.0;
        let tip = tip_at(fee, base_fee_wei);
        let tip_component = p.tip_weight * tip_term(tip, p.tip_log_scale_wei);
        let age_s = meta.age_s(now_s);
        let age_component = p.age_weight * age_bonus(age_s, p.age_halflife_s);
        let size_component = p.size_weight * size_penalty(meta.size_bytes);
        tip_component + age_component - size_component
    }
}

/// Fallback scorer used by the eviction planner when no richer [`Priority`]
/// is wired in: `(effective_fee_wei / size_bytes) * (1 + min(age/600, 0.10))`
/// (spec §4.F, original `evict.py:_fallback_effective_priority`).
pub fn fallback_effective_priority(meta: &TxMeta, now_s: u64) -> f64 {
    let size = meta.size_bytes.max(1) as f64;
    let age_s = meta.age_s(now_s);
    let age_boost = (age_s / 600.0).min(0.10);
    (meta.effective_fee_wei as f64 / size) * (1.0 + age_boost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_tip_yields_higher_score() {
        let p = DefaultPriority::default();
        let meta_low = TxMeta::new(500, 0, 0);
        let low = p.effective_priority(&EffectiveFee::Legacy { gas_price_wei: 1_000_000_000 }, &meta_low, None, 0);
        let high = p.effective_priority(&EffectiveFee::Legacy { gas_price_wei: 10_000_000_000 }, &meta_low, None, 0);
        assert!(high > low);
    }

    #[test]
    fn larger_size_lowers_score() {
        let p = DefaultPriority::default();
        let fee = EffectiveFee::Legacy { gas_price_wei: 5_000_000_000 };
        let small = TxMeta::new(200, 0, 0);
        let large = TxMeta::new(200_000, 0, 0);
        let s_small = p.effective_priority(&fee, &small, None, 0);
        let s_large = p.effective_priority(&fee, &large, None, 0);
        assert!(s_small > s_large);
    }

    #[test]
    fn older_tx_gets_age_bonus() {
        let p = DefaultPriority::default();
        let fee = EffectiveFee::Legacy { gas_price_wei: 5_000_000_000 };
        let meta = TxMeta::new(500, 0, 0);
        let fresh = p.effective_priority(&fee, &meta, None, 0);
        let aged = p.effective_priority(&fee, &meta, None, 600);
        assert!(aged > fresh);
    }

    #[test]
    fn fallback_age_boost_is_capped_at_10_percent() {
        let mut meta = TxMeta::new(1_000, 0, 10_000);
        meta.first_seen_s = 0;
        let at_zero = fallback_effective_priority(&meta, 0);
        let at_cap = fallback_effective_priority(&meta, 10_000_000);
        assert!(at_cap <= at_zero * 1.10 + 1e-9);
    }
}
