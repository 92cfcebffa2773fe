// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Rolling fee watermark: a decaying log-space histogram plus an EMA floor
//! fed by per-block inclusion prices (spec §4.B). Grounded on
//! `examples/original_source/mempool/watermark.py`.

use super::config::WatermarkConfig;

fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    if x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn safe_u128(x: f64) -> u128 {
    if !x.is_finite() || x < 0.0 {
        0
    } else {
        x as u128
    }
}

/// Approximate order statistics over effective fees using log-spaced bins
/// with exponential decay (spec §4.B).
struct LogHistogram {
    edges: Vec<f64>,
    counts: Vec<f64>,
    sum: f64,
    decay: f64,
}

impl LogHistogram {
    fn new(min_wei: u128, max_wei: u128, bins: usize, decay: f64) -> Self {
        assert!(min_wei >= 1 && max_wei > min_wei && bins >= 8);
        let log_min = (min_wei as f64).log10();
        let log_max = (max_wei as f64).log10();
        let step = (log_max - log_min) / bins as f64;
        let edges = (0..=bins)
            .map(|i| 10f64.powf(log_min + step * i as f64))
            .collect();
        Self {
            edges,
            counts: vec![0.0; bins],
            sum: 0.0,
            decay,
        }
    }

    fn decay(&mut self) {
        if self.decay >= 1.0 {
            return;
        }
        for c in &mut self.counts {
            *c *= self.decay;
        }
        self.sum *= self.decay;
    }

    fn observe(&mut self, fee_wei: u128, weight: f64) {
        if fee_wei == 0 || weight <= 0.0 {
            return;
        }
        let x = fee_wei as f64;
        let (mut lo, mut hi) = (0usize, self.counts.len());
        while lo < hi {
            let mid = (lo + hi) / 2;
            if x >= self.edges[mid + 1] {
                lo = mid + 1;
            } else if x < self.edges[mid] {
                hi = mid;
            } else {
                lo = mid;
                break;
            }
        }
        let idx = lo.min(self.counts.len() - 1);
        self.counts[idx] += weight;
        self.sum += weight;
    }

    fn percentile(&self, q: f64) -> u128 {
        if self.sum <= 0.0 {
            return 0;
        }
        let q = clamp(q, 0.0, 1.0);
        let target = self.sum * q;
        let mut acc = 0.0;
        for (i, &c) in self.counts.iter().enumerate() {
            let next = acc + c;
            if next >= target {
                let frac = if c <= 1e-12 { 0.0 } else { (target - acc) / c };
                let lo = self.edges[i];
                let hi = self.edges[i + 1];
                return safe_u128(lo + (hi - lo) * frac);
            }
            acc = next;
        }
        safe_u128(*self.edges.last().unwrap())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub admit_floor_wei: u128,
    pub evict_below_wei: u128,
    pub utilization: f64,
}

pub struct FeeWatermark {
    cfg: WatermarkConfig,
    hist: LogHistogram,
    floor_ema: f64,
    admit_floor: u128,
    evict_below: u128,
}

impl FeeWatermark {
    pub fn new(cfg: WatermarkConfig) -> Self {
        let hist = LogHistogram::new(cfg.hist_min_wei, cfg.hist_max_wei, cfg.hist_bins, cfg.hist_decay_per_block);
        let floor_ema = cfg.min_floor_wei as f64;
        let admit_floor = cfg.min_floor_wei;
        Self {
            cfg,
            hist,
            floor_ema,
            admit_floor,
            evict_below: 0,
        }
    }

    pub fn observe_admission(&mut self, effective_fee_wei: u128) {
        self.hist.observe(effective_fee_wei, 1.0);
    }

    pub fn observe_block_inclusions(&mut self, effective_fees_wei: &[u128]) {
        self.hist.decay();
        let fees: Vec<u128> = effective_fees_wei.iter().copied().filter(|&f| f > 0).collect();
        if fees.is_empty() {
            return;
        }
        for &f in &fees {
            self.hist.observe(f, 1.0);
        }
        let mut sorted = fees.clone();
        sorted.sort_unstable();
        let p20_idx = ((0.20 * (sorted.len() - 1) as f64) as usize).min(sorted.len() - 1);
        let p20 = sorted[p20_idx];
        let target = self.cfg.min_floor_wei.max(p20) as f64;
        let a = clamp(self.cfg.ema_alpha, 0.01, 1.0);
        self.floor_ema = (1.0 - a) * self.floor_ema + a * target;
    }

    fn bounded_step(&self, current: u128, target: u128) -> u128 {
        if current == 0 {
            return target;
        }
        if target >= current {
            let limit = (current as f64 * self.cfg.max_step_up).ceil() as u128;
            target.min(limit)
        } else {
            let limit = (current as f64 * self.cfg.max_step_down).floor() as u128;
            target.max(limit)
        }
    }

    pub fn thresholds(&mut self, pool_size: u64, capacity: u64) -> Thresholds {
        let util = if capacity == 0 {
            0.0
        } else {
            clamp(pool_size as f64 / capacity as f64, 0.0, 1.0)
        };

        let ema_floor = self.cfg.min_floor_wei.max(safe_u128(self.floor_ema));

        let (admit_target, evict_target): (u128, u128) = if util <= self.cfg.low_util {
            let admit_hist = self.hist.percentile(self.cfg.admit_quantile_low);
            (self.cfg.min_floor_wei.max(ema_floor.min(admit_hist)), 0)
        } else if util >= self.cfg.high_util {
            let evict_hist = self.hist.percentile(self.cfg.evict_quantile_high);
            let t = ema_floor.max(evict_hist);
            (t, t)
        } else {
            let t = (util - self.cfg.low_util) / (self.cfg.high_util - self.cfg.low_util).max(1e-9);
            let evict_q = lerp(self.cfg.evict_quantile_mid, self.cfg.evict_quantile_high, t);
            let evict_hist = self.hist.percentile(evict_q);

            let low_q = self.cfg.admit_quantile_low;
            let mid_q = self.cfg.evict_quantile_mid;
            let admit_q = lerp(low_q, mid_q, t * 0.6);
            let admit_hist = self.hist.percentile(admit_q);

            let admit = self
                .cfg
                .min_floor_wei
                .max(ema_floor.max(evict_hist.min(admit_hist.max(ema_floor))));
            let evict = self.cfg.min_floor_wei.max(evict_hist);
            (admit, evict)
        };

        let mut new_admit = self.bounded_step(self.admit_floor, admit_target);
        let mut new_evict = if evict_target > 0 {
            self.bounded_step(self.evict_below, evict_target)
        } else {
            0
        };

        if new_evict > 0 && new_evict < new_admit {
            new_evict = new_admit;
        }
        // admit_floor never below configured min (spec §8 invariant).
        new_admit = new_admit.max(self.cfg.min_floor_wei);

        self.admit_floor = new_admit;
        self.evict_below = new_evict;

        Thresholds {
            admit_floor_wei: self.admit_floor,
            evict_below_wei: self.evict_below,
            utilization: util,
        }
    }

    pub fn floor_ema_wei(&self) -> u128 {
        safe_u128(self.floor_ema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_floor_never_below_configured_min() {
        let cfg = WatermarkConfig {
            min_floor_wei: 5_000,
            ..Default::default()
        };
        let mut wm = FeeWatermark::new(cfg);
        let th = wm.thresholds(0, 1_000);
        assert!(th.admit_floor_wei >= 5_000);
    }

    #[test]
    fn evict_never_below_admit_same_tick() {
        let mut wm = FeeWatermark::new(WatermarkConfig::default());
        wm.observe_block_inclusions(&[2_000_000_000, 3_000_000_000, 2_500_000_000]);
        let th = wm.thresholds(950, 1_000);
        if th.evict_below_wei > 0 {
            assert!(th.evict_below_wei >= th.admit_floor_wei);
        }
    }

    #[test]
    fn step_bounds_are_respected() {
        let mut wm = FeeWatermark::new(WatermarkConfig::default());
        let t0 = wm.thresholds(100, 1_000);
        // Feed an enormous inclusion burst to try to force a huge jump.
        wm.observe_block_inclusions(&[10u128.pow(11); 50]);
        let t1 = wm.thresholds(950, 1_000);
        assert!((t1.admit_floor_wei as f64) <= (t0.admit_floor_wei as f64) * 1.50 + 1.0);
    }

    #[test]
    fn low_utilization_relaxes_floor_no_eviction() {
        let mut wm = FeeWatermark::new(WatermarkConfig::default());
        let th = wm.thresholds(100, 1_000);
        assert_eq!(th.evict_below_wei, 0);
    }
}
