// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Transaction-shaped data owned or referenced by the pool (spec §3, §9).
//!
//! The spec's python source duck-types transactions via `getattr` fallbacks
//! across several pool/tx variants; per spec §9 that collapses to a single
//! explicit trait so every caller conforms to one shape instead of several.

use std::fmt;

pub type Sender = Vec<u8>;
pub type TxHash = [u8; 32];

/// Either a legacy (gas-price) fee, or an EIP-1559-style base-fee + tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectiveFee {
    Legacy { gas_price_wei: u128 },
    Eip1559 {
        max_fee_per_gas_wei: u128,
        max_priority_fee_per_gas_wei: u128,
    },
}

impl EffectiveFee {
    /// Effective fee-per-gas at a given (optional) current base fee.
    pub fn effective_wei(&self, base_fee_wei: Option<u128>) -> u128 {
        match *self {
            EffectiveFee::Legacy { gas_price_wei } => gas_price_wei,
            EffectiveFee::Eip1559 {
                max_fee_per_gas_wei,
                max_priority_fee_per_gas_wei,
            } => {
                let base = base_fee_wei.unwrap_or(0);
                let tip = base.saturating_add(max_priority_fee_per_gas_wei);
                max_fee_per_gas_wei.min(tip)
            }
        }
    }
}

/// Explicit conformance surface every mempool transaction must provide.
/// Supersedes the duck-typed attribute probing in the original source
/// (spec §9, "duck-typed adapters").
pub trait Transaction: fmt::Debug + Send + Sync {
    fn hash(&self) -> TxHash;
    fn sender(&self) -> &[u8];
    fn nonce(&self) -> u64;
    fn size_bytes(&self) -> usize;
    fn gas_limit(&self) -> u64;
    fn fee(&self) -> EffectiveFee;
    fn chain_id(&self) -> Option<u64> {
        None
    }
}

/// Derived attributes the pool maintains alongside a transaction (spec §3
/// `TxMeta`).
#[derive(Clone, Debug, PartialEq)]
pub struct TxMeta {
    pub size_bytes: usize,
    pub first_seen_s: u64,
    pub last_seen_s: u64,
    pub expires_at_s: Option<u64>,
    pub local: bool,
    pub pinned: bool,
    pub is_replacement_candidate: bool,
    pub priority_score: f64,
    pub effective_fee_wei: u128,
}

impl TxMeta {
    pub fn new(size_bytes: usize, now_s: u64, effective_fee_wei: u128) -> Self {
        Self {
            size_bytes,
            first_seen_s: now_s,
            last_seen_s: now_s,
            expires_at_s: None,
            local: false,
            pinned: false,
            is_replacement_candidate: false,
            priority_score: 0.0,
            effective_fee_wei,
        }
    }

    pub fn age_s(&self, now_s: u64) -> f64 {
        now_s.saturating_sub(self.first_seen_s) as f64
    }
}

/// A transaction owned exclusively by the pool (spec §3 `PoolTx`).
pub struct PoolTx<T: Transaction> {
    pub tx: T,
    pub raw_bytes: Vec<u8>,
    pub meta: TxMeta,
    pub tx_hash: TxHash,
    pub fee: EffectiveFee,
}

impl<T: Transaction> fmt::Debug for PoolTx<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolTx")
            .field("tx_hash", &hex::encode(self.tx_hash))
            .field("meta", &self.meta)
            .finish()
    }
}

impl<T: Transaction> PoolTx<T> {
    pub fn new(tx: T, raw_bytes: Vec<u8>, now_s: u64, base_fee_wei: Option<u128>) -> Self {
        let fee = tx.fee();
        let effective = fee.effective_wei(base_fee_wei);
        let meta = TxMeta::new(tx.size_bytes(), now_s, effective);
        let tx_hash = tx.hash();
        Self {
            tx,
            raw_bytes,
            meta,
            tx_hash,
            fee,
        }
    }

    pub fn sender(&self) -> &[u8] {
        self.tx.sender()
    }

    pub fn nonce(&self) -> u64 {
        self.tx.nonce()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eip1559_effective_fee_is_capped_by_max_fee() {
        let f = EffectiveFee::Eip1559 {
            max_fee_per_gas_wei: 100,
            max_priority_fee_per_gas_wei: 50,
        };
        assert_eq!(f.effective_wei(Some(80)), 100); // 80+50=130 capped to 100
        assert_eq!(f.effective_wei(Some(10)), 60); // 10+50=60
        assert_eq!(f.effective_wei(None), 50);
    }

    #[test]
    fn legacy_fee_ignores_base_fee() {
        let f = EffectiveFee::Legacy { gas_price_wei: 42 };
        assert_eq!(f.effective_wei(Some(1_000)), 42);
        assert_eq!(f.effective_wei(None), 42);
    }
}
