// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Eviction planner: per-sender fairness caps, global low-priority sweeps,
//! and an emergency memory-pressure path (spec §4.F). Grounded on
//! `examples/original_source/mempool/evict.py`.

use std::collections::HashMap;
use std::sync::Arc;

use super::config::EvictionConfig;
use super::priority::fallback_effective_priority;
use super::tx::{PoolTx, Sender, Transaction, TxHash};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VictimReason {
    SenderCap,
    GlobalLowPriority,
    EmergencyPressure,
    /// Hard `capacity_txs` cap (spec §5: "the pool enforces hard caps
    /// (max_txs, max_bytes)"), independent of the byte-watermark sweep.
    CapacityCap,
}

#[derive(Clone, Debug)]
pub struct Victim {
    pub tx_hash: TxHash,
    pub reason: VictimReason,
    pub size_bytes: usize,
    pub priority: f64,
    pub sender: Sender,
}

struct Candidate {
    tx_hash: TxHash,
    sender: Sender,
    size_bytes: usize,
    age_s: f64,
    local: bool,
    is_replacement_candidate: bool,
    priority: f64,
}

/// A point-in-time view the planner reasons over; callers build this from
/// their own index/storage without the planner needing to know about it
/// (spec §4.F: decoupled from any concrete pool implementation).
pub struct PoolSnapshot<'a, T: Transaction> {
    pub entries: &'a [Arc<PoolTx<T>>],
    pub bytes_used: u64,
    pub capacity_bytes: u64,
    /// Hard cap on transaction count (spec §5); `0` means uncapped.
    pub capacity_txs: usize,
    pub rss_bytes: Option<u64>,
}

pub struct EvictionPlanner {
    cfg: EvictionConfig,
}

impl EvictionPlanner {
    pub fn new(cfg: EvictionConfig) -> Self {
        Self { cfg }
    }

    fn watermarks(&self, capacity_bytes: u64) -> (u64, u64) {
        let hi = self.cfg.high_water_bytes.unwrap_or((capacity_bytes as f64 * 0.95) as u64);
        let lo = self.cfg.low_water_bytes.unwrap_or((capacity_bytes as f64 * 0.90) as u64);
        (hi, lo.min(hi))
    }

    fn is_emergency(&self, rss_bytes: Option<u64>) -> bool {
        match (self.cfg.emergency_when_rss_over_bytes, rss_bytes) {
            (Some(thr), Some(rss)) => rss >= thr,
            _ => false,
        }
    }

    fn build_candidates<T: Transaction>(&self, entries: &[Arc<PoolTx<T>>], now_s: u64) -> Vec<Candidate> {
        entries
            .iter()
            .map(|tx| Candidate {
                tx_hash: tx.tx_hash,
                sender: tx.sender().to_vec(),
                size_bytes: tx.meta.size_bytes,
                age_s: tx.meta.age_s(now_s),
                local: tx.meta.local,
                is_replacement_candidate: tx.meta.is_replacement_candidate,
                priority: fallback_effective_priority(&tx.meta, now_s),
            })
            .collect()
    }

    /// Evict overflow beyond `max_per_sender`, worst-priority first, keeping
    /// at least `min_keep_per_sender` per sender.
    fn enforce_sender_caps(&self, cands: &[Candidate]) -> Vec<Victim> {
        let Some(cap) = self.cfg.max_per_sender else {
            return Vec::new();
        };
        if cap == 0 {
            return Vec::new();
        }

        let mut by_sender: HashMap<Sender, Vec<&Candidate>> = HashMap::new();
        for c in cands {
            by_sender.entry(c.sender.clone()).or_default().push(c);
        }

        let mut victims = Vec::new();
        for (_, mut lst) in by_sender {
            if lst.len() <= cap {
                continue;
            }
            // Best first: higher priority, then smaller size.
            lst.sort_by(|a, b| {
                b.priority
                    .partial_cmp(&a.priority)
                    .unwrap()
                    .then(a.size_bytes.cmp(&b.size_bytes))
            });
            let keep = self.cfg.min_keep_per_sender.min(cap);
            let overflow = lst.len() - cap;
            let mut worst: Vec<&&Candidate> = lst[keep..].iter().collect();
            // Worst first: lower priority, then larger size.
            worst.sort_by(|a, b| {
                a.priority
                    .partial_cmp(&b.priority)
                    .unwrap()
                    .then(b.size_bytes.cmp(&a.size_bytes))
            });
            for c in worst.into_iter().take(overflow) {
                victims.push(Victim {
                    tx_hash: c.tx_hash,
                    reason: VictimReason::SenderCap,
                    size_bytes: c.size_bytes,
                    priority: c.priority,
                    sender: c.sender.clone(),
                });
            }
        }
        victims
    }

    fn global_evictions(&self, cands: &[Candidate], bytes_used: u64, capacity_bytes: u64, emergency: bool) -> Vec<Victim> {
        let (hi, lo) = self.watermarks(capacity_bytes);
        if !emergency && bytes_used <= hi {
            return Vec::new();
        }

        let target = if emergency {
            ((lo as f64) * self.cfg.emergency_low_factor) as u64
        } else {
            lo
        };
        let reason = if emergency {
            VictimReason::EmergencyPressure
        } else {
            VictimReason::GlobalLowPriority
        };

        let bytes_to_free = bytes_used.saturating_sub(target);
        if bytes_to_free == 0 {
            return Vec::new();
        }

        let mut eligible: Vec<&Candidate> = cands
            .iter()
            .filter(|c| {
                if emergency {
                    return true;
                }
                if self.cfg.protect_local && c.local {
                    return false;
                }
                if self.cfg.protect_replacement_candidates && c.is_replacement_candidate {
                    return false;
                }
                if c.age_s < self.cfg.protect_newer_than_s {
                    return false;
                }
                true
            })
            .collect();

        eligible.sort_by(|a, b| {
            a.priority
                .partial_cmp(&b.priority)
                .unwrap()
                .then(b.size_bytes.cmp(&a.size_bytes))
        });

        let mut victims = Vec::new();
        let mut freed = 0u64;
        for c in eligible {
            if freed >= bytes_to_free {
                break;
            }
            victims.push(Victim {
                tx_hash: c.tx_hash,
                reason,
                size_bytes: c.size_bytes,
                priority: c.priority,
                sender: c.sender.clone(),
            });
            freed += c.size_bytes as u64;
        }
        victims
    }

    /// Evict worst-priority-first, independent of byte watermarks, until at
    /// most `capacity_txs` candidates remain. `0` means uncapped (spec §5:
    /// "the pool enforces hard caps (max_txs, max_bytes)").
    fn enforce_count_cap(&self, cands: &[&Candidate], capacity_txs: usize) -> Vec<Victim> {
        if capacity_txs == 0 || cands.len() <= capacity_txs {
            return Vec::new();
        }
        let mut ranked: Vec<&&Candidate> = cands.iter().collect();
        // Worst first: lower priority, then larger size, evicted first.
        ranked.sort_by(|a, b| {
            a.priority
                .partial_cmp(&b.priority)
                .unwrap()
                .then(b.size_bytes.cmp(&a.size_bytes))
        });
        let overflow = cands.len() - capacity_txs;
        ranked
            .into_iter()
            .take(overflow)
            .map(|c| Victim {
                tx_hash: c.tx_hash,
                reason: VictimReason::CapacityCap,
                size_bytes: c.size_bytes,
                priority: c.priority,
                sender: c.sender.clone(),
            })
            .collect()
    }

    /// Build the full eviction plan: per-sender fairness first, then a
    /// global low-priority (or emergency) sweep, then a hard `capacity_txs`
    /// cap over whatever remains (spec §4.F, §5).
    pub fn plan<T: Transaction>(&self, snapshot: &PoolSnapshot<'_, T>, now_s: u64) -> Vec<Victim> {
        let cands = self.build_candidates(snapshot.entries, now_s);

        let fairness_victims = self.enforce_sender_caps(&cands);
        let (remaining, bytes_used) = if fairness_victims.is_empty() {
            (cands, snapshot.bytes_used)
        } else {
            let evicted: std::collections::HashSet<TxHash> =
                fairness_victims.iter().map(|v| v.tx_hash).collect();
            let freed: u64 = fairness_victims.iter().map(|v| v.size_bytes as u64).sum();
            (
                cands.into_iter().filter(|c| !evicted.contains(&c.tx_hash)).collect(),
                snapshot.bytes_used.saturating_sub(freed),
            )
        };

        let emergency = self.is_emergency(snapshot.rss_bytes);
        let global_victims = self.global_evictions(&remaining, bytes_used, snapshot.capacity_bytes, emergency);

        let evicted_by_bytes: std::collections::HashSet<TxHash> =
            global_victims.iter().map(|v| v.tx_hash).collect();
        let after_bytes: Vec<&Candidate> =
            remaining.iter().filter(|c| !evicted_by_bytes.contains(&c.tx_hash)).collect();
        let count_victims = self.enforce_count_cap(&after_bytes, snapshot.capacity_txs);

        let mut plan = fairness_victims;
        plan.extend(global_victims);
        plan.extend(count_victims);
        plan
    }
}
