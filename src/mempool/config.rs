// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Plain, serde-serializable config structs for the mempool components
//! (SPEC_FULL §12). These are data, not a config *loader*; loading them from
//! disk/env/RPC is an external collaborator's job per spec §1.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatermarkConfig {
    pub min_floor_wei: u128,
    pub ema_alpha: f64,
    pub hist_min_wei: u128,
    pub hist_max_wei: u128,
    pub hist_bins: usize,
    pub hist_decay_per_block: f64,
    pub low_util: f64,
    pub high_util: f64,
    pub admit_quantile_low: f64,
    pub evict_quantile_mid: f64,
    pub evict_quantile_high: f64,
    pub max_step_up: f64,
    pub max_step_down: f64,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            min_floor_wei: 1_000_000_000, // 1 gwei
            ema_alpha: 0.25,
            hist_min_wei: 1,
            hist_max_wei: 10u128.pow(12),
            hist_bins: 96,
            hist_decay_per_block: 0.95,
            low_util: 0.60,
            high_util: 0.90,
            admit_quantile_low: 0.05,
            evict_quantile_mid: 0.15,
            evict_quantile_high: 0.30,
            max_step_up: 1.50,
            max_step_down: 0.67,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RbfConfig {
    pub rel_bump: f64,
    pub abs_bump_wei: u128,
    pub require_gas_limit_ge: bool,
}

impl Default for RbfConfig {
    fn default() -> Self {
        Self {
            rel_bump: 0.10,
            abs_bump_wei: 2_000_000_000,
            require_gas_limit_ge: true,
        }
    }
}

impl RbfConfig {
    /// Clamp to `max(1.0, 1+rel_bump)` per spec §9 Open Question #4.
    pub fn ratio(&self) -> f64 {
        (1.0 + self.rel_bump).max(1.0)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmissionConfig {
    pub max_tx_size_bytes: usize,
    pub chain_id: Option<u64>,
    pub min_fee_override_wei: Option<u128>,
    pub local_bypasses_fee_floor: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_tx_size_bytes: 128 * 1024,
            chain_id: None,
            min_fee_override_wei: None,
            local_bypasses_fee_floor: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BanConfig {
    pub window_s: u64,
    pub max_rejects_in_window: u32,
    pub spam_ban_s: u64,
    pub low_fee_ban_s: u64,
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            window_s: 10,
            max_rejects_in_window: 20,
            spam_ban_s: 60,
            low_fee_ban_s: 15,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvictionConfig {
    pub high_water_bytes: Option<u64>,
    pub low_water_bytes: Option<u64>,
    pub max_per_sender: Option<usize>,
    pub min_keep_per_sender: usize,
    pub protect_local: bool,
    pub protect_newer_than_s: f64,
    pub protect_replacement_candidates: bool,
    pub emergency_when_rss_over_bytes: Option<u64>,
    pub emergency_low_factor: f64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            high_water_bytes: None,
            low_water_bytes: None,
            max_per_sender: Some(128),
            min_keep_per_sender: 1,
            protect_local: true,
            protect_newer_than_s: 5.0,
            protect_replacement_candidates: true,
            emergency_when_rss_over_bytes: None,
            emergency_low_factor: 0.80,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub capacity_txs: usize,
    pub capacity_bytes: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity_txs: 20_000,
            capacity_bytes: 256 * 1024 * 1024,
        }
    }
}
