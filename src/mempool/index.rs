// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Thread-safe hash/sender/nonce index over pooled transactions (spec §4.D).
//! Grounded on the re-entrant locking style in
//! `blockchain/message_pool/src/msgpool/mod.rs`, generalized from a single
//! `RwLock<MsgPool>` to per-concern counters and a narrower lock surface.
//!
//! Entries are `Arc`-shared with [`super::sequencer::NonceSequencer`], which
//! owns per-sender nonce ordering; this index exists purely for O(1)
//! hash/sender lookups and duplicate/conflict detection under concurrent
//! readers (spec §6 external interfaces need read access without taking the
//! sequencer's per-sender locks).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::tx::{PoolTx, Sender, Transaction, TxHash};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexCounters {
    pub added: u64,
    pub duplicate_hash: u64,
    pub conflict_nonce: u64,
    pub replaced: u64,
    pub removed: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeResult {
    Absent,
    DuplicateHash,
    /// A different tx already occupies this `(sender, nonce)` slot.
    ConflictingNonce,
}

struct Inner<T: Transaction> {
    by_hash: HashMap<TxHash, Arc<PoolTx<T>>>,
    by_sender_nonce: HashMap<Sender, HashMap<u64, TxHash>>,
    counters: IndexCounters,
}

/// Hash-keyed lookup table mirroring the transactions owned by the
/// sequencer, with a secondary `(sender, nonce) -> hash` index, guarded by
/// a single `RwLock` (spec §4.D, §5: "index mutations are short, lock-held
/// critical sections").
pub struct TxIndex<T: Transaction> {
    inner: RwLock<Inner<T>>,
}

impl<T: Transaction> Default for TxIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transaction> TxIndex<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                by_hash: HashMap::new(),
                by_sender_nonce: HashMap::new(),
                counters: IndexCounters::default(),
            }),
        }
    }

    /// Check whether a tx with this `(hash, sender, nonce)` can be inserted
    /// without mutating state.
    pub fn probe(&self, tx_hash: &TxHash, sender: &[u8], nonce: u64) -> ProbeResult {
        let g = self.inner.read();
        if g.by_hash.contains_key(tx_hash) {
            return ProbeResult::DuplicateHash;
        }
        if let Some(existing) = g.by_sender_nonce.get(sender).and_then(|m| m.get(&nonce)) {
            if existing != tx_hash {
                return ProbeResult::ConflictingNonce;
            }
        }
        ProbeResult::Absent
    }

    /// Record an insertion that already happened in the sequencer, mirroring
    /// it here. Returns the previously-indexed entry at the same
    /// `(sender, nonce)` slot, if any.
    pub fn record_insert(&self, tx: Arc<PoolTx<T>>) -> Result<Option<Arc<PoolTx<T>>>, ProbeResult> {
        let tx_hash = tx.tx_hash;
        let sender = tx.sender().to_vec();
        let nonce = tx.nonce();

        let mut g = self.inner.write();
        if g.by_hash.contains_key(&tx_hash) {
            g.counters.duplicate_hash += 1;
            return Err(ProbeResult::DuplicateHash);
        }

        let existing_hash = g.by_sender_nonce.entry(sender).or_default().insert(nonce, tx_hash);

        let replaced = if let Some(old_hash) = existing_hash {
            let old = g.by_hash.remove(&old_hash);
            g.counters.replaced += 1;
            old
        } else {
            None
        };

        g.by_hash.insert(tx_hash, tx);
        g.counters.added += 1;
        Ok(replaced)
    }

    pub fn remove_by_hash(&self, tx_hash: &TxHash) -> Option<Arc<PoolTx<T>>> {
        let mut g = self.inner.write();
        let removed = g.by_hash.remove(tx_hash)?;
        let sender = removed.sender().to_vec();
        let nonce = removed.nonce();
        if let Some(m) = g.by_sender_nonce.get_mut(&sender) {
            m.remove(&nonce);
            if m.is_empty() {
                g.by_sender_nonce.remove(&sender);
            }
        }
        g.counters.removed += 1;
        Some(removed)
    }

    pub fn contains(&self, tx_hash: &TxHash) -> bool {
        self.inner.read().by_hash.contains_key(tx_hash)
    }

    /// Fetch the `Arc`-shared entry by hash, if still present.
    pub fn get(&self, tx_hash: &TxHash) -> Option<Arc<PoolTx<T>>> {
        self.inner.read().by_hash.get(tx_hash).cloned()
    }

    pub fn get_by_sender_nonce(&self, sender: &[u8], nonce: u64) -> Option<TxHash> {
        self.inner.read().by_sender_nonce.get(sender)?.get(&nonce).copied()
    }

    pub fn get_hashes_by_sender(&self, sender: &[u8]) -> Vec<TxHash> {
        self.inner
            .read()
            .by_sender_nonce
            .get(sender)
            .map(|m| m.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_hash.is_empty()
    }

    pub fn counters(&self) -> IndexCounters {
        self.inner.read().counters
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.read().by_hash.values().map(|t| t.meta.size_bytes as u64).sum()
    }

    /// Apply `f` to the stored tx, if present, under a read lock.
    pub fn with_tx<R>(&self, tx_hash: &TxHash, f: impl FnOnce(&PoolTx<T>) -> R) -> Option<R> {
        let g = self.inner.read();
        g.by_hash.get(tx_hash).map(|tx| f(tx))
    }
}
