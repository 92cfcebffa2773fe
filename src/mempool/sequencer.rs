// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Per-sender nonce queues with gap handling and RBF (spec §4.C). Grounded
//! on `examples/original_source/mempool/sequence.py`.
//!
//! Entries are held behind `Arc` so the same transaction can be looked up
//! by hash through [`super::index::TxIndex`] without duplicating it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::admission::ceil_wei_times_ratio;
use super::config::RbfConfig;
use super::tx::{PoolTx, Sender, Transaction, TxHash};

/// Outcome tag for an admission into a [`SenderQueue`] (SPEC_FULL
/// "supplemented features": mirrors the original's `AdmitResult.action`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmitAction {
    AddedReady,
    AddedHeld,
    ReplacedReady,
    ReplacedHeld,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmitReject {
    NonceBelowNext,
    ReplacementUnderpriced,
    GasLimitTooLow,
}

pub type AdmitOutcome = Result<AdmitAction, AdmitReject>;

/// Per-sender nonce sequencing.
///
/// Invariants (spec §3 `SenderQueue`):
/// - `next_nonce` is the lowest unconsumed nonce.
/// - `[next_nonce, ready_end)` is a contiguous run of present nonces.
/// - nonces `>= ready_end` are held behind a gap.
pub struct SenderQueue<T: Transaction> {
    pub sender: Sender,
    pub next_nonce: u64,
    pub txs: BTreeMap<u64, Arc<PoolTx<T>>>,
    pub ready_end: u64,
}

impl<T: Transaction> SenderQueue<T> {
    pub fn new(sender: Sender, next_nonce: u64) -> Self {
        Self {
            sender,
            next_nonce,
            txs: BTreeMap::new(),
            ready_end: next_nonce,
        }
    }

    fn advance_ready_end(&mut self) {
        while self.txs.contains_key(&self.ready_end) {
            self.ready_end += 1;
        }
    }

    fn recompute_ready_end(&mut self) {
        let mut re = self.next_nonce;
        while self.txs.contains_key(&re) {
            re += 1;
        }
        self.ready_end = re;
    }

    pub fn admit(
        &mut self,
        tx: Arc<PoolTx<T>>,
        rbf: &RbfConfig,
    ) -> Result<(AdmitAction, Option<Arc<PoolTx<T>>>), (AdmitReject, Arc<PoolTx<T>>)> {
        let n = tx.nonce();
        if n < self.next_nonce {
            return Err((AdmitReject::NonceBelowNext, tx));
        }

        if let Some(existing) = self.txs.get(&n) {
            let (ok, reject) = should_replace(existing, &tx, rbf);
            if !ok {
                return Err((reject.unwrap(), tx));
            }
            let old = self.txs.insert(n, tx);
            let action = if self.next_nonce <= n && n < self.ready_end {
                AdmitAction::ReplacedReady
            } else {
                AdmitAction::ReplacedHeld
            };
            return Ok((action, old));
        }

        self.txs.insert(n, tx);
        if n == self.ready_end {
            self.advance_ready_end();
            return Ok((AdmitAction::AddedReady, None));
        }
        if n < self.ready_end {
            // Cannot happen given ready_end tracks the first missing nonce,
            // but keep consistency under defensive recompute.
            self.recompute_ready_end();
            return Ok((AdmitAction::AddedReady, None));
        }
        Ok((AdmitAction::AddedHeld, None))
    }

    /// Mark `nonce` consumed (e.g. included in a block). Returns the removed
    /// entry, if any.
    pub fn consume(&mut self, nonce: u64) -> Option<Arc<PoolTx<T>>> {
        let removed = self.txs.remove(&nonce)?;
        if nonce == self.next_nonce {
            self.next_nonce += 1;
            if self.ready_end <= self.next_nonce {
                self.ready_end = self.next_nonce;
            }
            self.advance_ready_end();
        } else {
            self.recompute_ready_end();
        }
        Some(removed)
    }

    /// Remove `nonce` (TTL/pressure eviction). Shortens `ready_end` to
    /// `nonce` if it was inside the ready window, creating a gap.
    pub fn evict(&mut self, nonce: u64) -> Option<Arc<PoolTx<T>>> {
        let removed = self.txs.remove(&nonce)?;
        if self.next_nonce <= nonce && nonce < self.ready_end {
            self.ready_end = nonce;
        }
        self.advance_ready_end();
        Some(removed)
    }

    pub fn has_ready(&self) -> bool {
        self.ready_end > self.next_nonce
    }

    pub fn peek_next(&self) -> Option<&Arc<PoolTx<T>>> {
        if self.has_ready() {
            self.txs.get(&self.next_nonce)
        } else {
            None
        }
    }

    pub fn ready_nonces(&self) -> impl Iterator<Item = u64> + '_ {
        self.next_nonce..self.ready_end
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}

/// RBF acceptance test (spec §4.C): meets or exceeds
/// `max(ceil(old*ratio), old+abs_bump)` (spec §4.E boundary-inclusive rule),
/// clamping the ratio per spec §9. The relative bump is computed via
/// [`ceil_wei_times_ratio`]'s fixed-point arithmetic so this agrees exactly
/// with [`super::admission::AdmissionPolicy::check_replacement`] at the
/// boundary instead of drifting under `f64` rounding.
pub fn should_replace<T: Transaction>(
    old: &PoolTx<T>,
    candidate: &PoolTx<T>,
    rbf: &RbfConfig,
) -> (bool, Option<AdmitReject>) {
    if rbf.require_gas_limit_ge && candidate.tx.gas_limit() < old.tx.gas_limit() {
        return (false, Some(AdmitReject::GasLimitTooLow));
    }
    let ratio = rbf.ratio();
    let old_fee = old.meta.effective_fee_wei;
    let rel_required = ceil_wei_times_ratio(old_fee, ratio);
    let abs_required = old_fee.saturating_add(rbf.abs_bump_wei);
    let required = rel_required.max(abs_required);
    if candidate.meta.effective_fee_wei >= required {
        (true, None)
    } else {
        (false, Some(AdmitReject::ReplacementUnderpriced))
    }
}

/// Orchestrates per-sender queues with a round-robin ready iterator (spec
/// §4.C: "at most one tx per sender per pass to prevent hot-sender
/// starvation").
pub struct NonceSequencer<T: Transaction> {
    queues: HashMap<Sender, SenderQueue<T>>,
    rr_senders: Vec<Sender>,
    rr_index: usize,
}

impl<T: Transaction> Default for NonceSequencer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transaction> NonceSequencer<T> {
    pub fn new() -> Self {
        Self {
            queues: HashMap::new(),
            rr_senders: Vec::new(),
            rr_index: 0,
        }
    }

    pub fn queue(&self, sender: &[u8]) -> Option<&SenderQueue<T>> {
        self.queues.get(sender)
    }

    pub fn queue_mut(&mut self, sender: &[u8]) -> Option<&mut SenderQueue<T>> {
        self.queues.get_mut(sender)
    }

    fn maybe_add_rr(&mut self, sender: &Sender) {
        if !self.rr_senders.iter().any(|s| s == sender) {
            self.rr_senders.push(sender.clone());
        }
    }

    fn remove_rr(&mut self, sender: &[u8]) {
        if let Some(pos) = self.rr_senders.iter().position(|s| s.as_slice() == sender) {
            self.rr_senders.remove(pos);
            if self.rr_index > pos {
                self.rr_index -= 1;
            }
            if !self.rr_senders.is_empty() {
                self.rr_index %= self.rr_senders.len();
            } else {
                self.rr_index = 0;
            }
        }
    }

    pub fn admit(
        &mut self,
        tx: Arc<PoolTx<T>>,
        rbf: &RbfConfig,
        sender_next_nonce_hint: Option<u64>,
    ) -> Result<(AdmitAction, Option<Arc<PoolTx<T>>>), (AdmitReject, Arc<PoolTx<T>>)> {
        let sender = tx.sender().to_vec();
        if !self.queues.contains_key(&sender) {
            let base = sender_next_nonce_hint.unwrap_or_else(|| tx.nonce());
            self.queues.insert(sender.clone(), SenderQueue::new(sender.clone(), base));
            self.maybe_add_rr(&sender);
        }
        let q = self.queues.get_mut(&sender).expect("just inserted");
        q.admit(tx, rbf)
    }

    /// Round-robin over senders, yielding at most one ready tx per sender
    /// per pass, until `max_total` is reached (spec §4.C).
    pub fn collect_ready(&mut self, max_total: Option<usize>) -> Vec<TxHash> {
        if self.rr_senders.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut remaining = max_total.unwrap_or(usize::MAX);
        let start = self.rr_index % self.rr_senders.len();
        let mut i = start;
        let mut visited = 0;
        while remaining > 0 && visited < self.rr_senders.len() {
            let sender = &self.rr_senders[i];
            if let Some(q) = self.queues.get(sender) {
                if let Some(tx) = q.peek_next() {
                    out.push(tx.tx_hash);
                    remaining -= 1;
                }
            }
            i = (i + 1) % self.rr_senders.len();
            visited += 1;
        }
        self.rr_index = i;
        out
    }

    pub fn consume(&mut self, sender: &[u8], nonce: u64) -> Option<Arc<PoolTx<T>>> {
        let q = self.queues.get_mut(sender)?;
        let removed = q.consume(nonce);
        if removed.is_some() && q.is_empty() {
            self.remove_rr(sender);
            self.queues.remove(sender);
        }
        removed
    }

    pub fn evict(&mut self, sender: &[u8], nonce: u64) -> Option<Arc<PoolTx<T>>> {
        let q = self.queues.get_mut(sender)?;
        let removed = q.evict(nonce);
        if removed.is_some() && q.is_empty() {
            self.remove_rr(sender);
            self.queues.remove(sender);
        }
        removed
    }

    pub fn senders(&self) -> impl Iterator<Item = &Sender> {
        self.queues.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FakeTx {
        sender: Vec<u8>,
        nonce: u64,
        gas_limit: u64,
        gas_price_wei: u128,
    }

    impl Transaction for FakeTx {
        fn hash(&self) -> TxHash {
            let mut h = [0u8; 32];
            h[0] = self.sender[0];
            h[24..32].copy_from_slice(&self.nonce.to_be_bytes());
            h
        }
        fn sender(&self) -> &[u8] {
            &self.sender
        }
        fn nonce(&self) -> u64 {
            self.nonce
        }
        fn size_bytes(&self) -> usize {
            128
        }
        fn gas_limit(&self) -> u64 {
            self.gas_limit
        }
        fn fee(&self) -> super::super::tx::EffectiveFee {
            super::super::tx::EffectiveFee::Legacy {
                gas_price_wei: self.gas_price_wei,
            }
        }
    }

    fn pooltx(sender: u8, nonce: u64, fee: u128) -> Arc<PoolTx<FakeTx>> {
        Arc::new(PoolTx::new(
            FakeTx {
                sender: vec![sender],
                nonce,
                gas_limit: 21_000,
                gas_price_wei: fee,
            },
            vec![],
            0,
            None,
        ))
    }

    #[test]
    fn gap_keeps_tx_held_until_filled() {
        let mut q = SenderQueue::new(vec![1], 0);
        let rbf = RbfConfig::default();
        let (action, _) = q.admit(pooltx(1, 1, 10), &rbf).unwrap();
        assert_eq!(action, AdmitAction::AddedHeld);
        assert!(!q.has_ready());

        let (action, _) = q.admit(pooltx(1, 0, 10), &rbf).unwrap();
        assert_eq!(action, AdmitAction::AddedReady);
        assert!(q.has_ready());
        assert_eq!(q.ready_end, 2);
    }

    #[test]
    fn nonce_below_next_is_rejected() {
        let mut q: SenderQueue<FakeTx> = SenderQueue::new(vec![1], 5);
        let rbf = RbfConfig::default();
        let err = q.admit(pooltx(1, 4, 10), &rbf).unwrap_err();
        assert_eq!(err.0, AdmitReject::NonceBelowNext);
    }

    #[test]
    fn replacement_requires_bump_over_ratio_and_abs() {
        let mut q = SenderQueue::new(vec![1], 0);
        let rbf = RbfConfig {
            rel_bump: 0.10,
            abs_bump_wei: 5,
            require_gas_limit_ge: true,
        };
        q.admit(pooltx(1, 0, 100), &rbf).unwrap();

        // required = max(ceil(100*1.10), 100+5) = max(110, 105) = 110.
        let err = q.admit(pooltx(1, 0, 105), &rbf).unwrap_err();
        assert_eq!(err.0, AdmitReject::ReplacementUnderpriced);

        // The exact boundary (110) is accepted, not just one wei past it.
        let (action, old) = q.admit(pooltx(1, 0, 110), &rbf).unwrap();
        assert_eq!(action, AdmitAction::ReplacedReady);
        assert!(old.is_some());
    }

    #[test]
    fn evict_in_ready_window_reopens_gap() {
        let mut q = SenderQueue::new(vec![1], 0);
        let rbf = RbfConfig::default();
        q.admit(pooltx(1, 0, 10), &rbf).unwrap();
        q.admit(pooltx(1, 1, 10), &rbf).unwrap();
        assert_eq!(q.ready_end, 2);

        q.evict(0);
        assert_eq!(q.ready_end, 0);
        assert!(!q.has_ready());
    }

    /// Scenario 3 (spec §8): nonces admitted out of order behind a gap are
    /// promoted to ready one at a time as lower nonces are consumed.
    #[test]
    fn nonce_gap_held_then_promoted() {
        let mut seq: NonceSequencer<FakeTx> = NonceSequencer::new();
        let rbf = RbfConfig::default();
        seq.admit(pooltx(1, 6, 10), &rbf, Some(5)).unwrap();
        seq.admit(pooltx(1, 8, 10), &rbf, Some(5)).unwrap();
        seq.admit(pooltx(1, 5, 10), &rbf, Some(5)).unwrap();
        seq.admit(pooltx(1, 7, 10), &rbf, Some(5)).unwrap();

        assert_eq!(seq.collect_ready(None), vec![pooltx(1, 5, 10).tx_hash]);

        seq.consume(&[1], 5);
        seq.consume(&[1], 6);
        assert_eq!(seq.collect_ready(None), vec![pooltx(1, 7, 10).tx_hash]);

        seq.consume(&[1], 7);
        assert_eq!(seq.collect_ready(None), vec![pooltx(1, 8, 10).tx_hash]);
    }

    #[test]
    fn round_robin_yields_one_per_sender_per_pass() {
        let mut seq: NonceSequencer<FakeTx> = NonceSequencer::new();
        let rbf = RbfConfig::default();
        seq.admit(pooltx(1, 0, 10), &rbf, None).unwrap();
        seq.admit(pooltx(1, 1, 10), &rbf, None).unwrap();
        seq.admit(pooltx(2, 0, 10), &rbf, None).unwrap();

        let ready = seq.collect_ready(None);
        assert_eq!(ready.len(), 2);
    }
}
