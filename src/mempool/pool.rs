// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Pool composition: admission, RBF, a lazy-deletion ready-queue, and block
//! inclusion bookkeeping (spec §4.G). Grounded on the overall shape of
//! `blockchain/message_pool/src/msgpool/mod.rs` (a single struct owning an
//! index, a selection path, and pending/ready bookkeeping), generalized to
//! the explicit sub-components built in this module.
//!
//! The ready-queue is a max-heap of `(priority, monotonic tag)` entries with
//! lazy deletion: replacing or evicting a tx bumps its tag in
//! `current_tag`, and stale heap entries are discarded on pop instead of
//! being removed from the heap eagerly (spec §9: "lazy heap deletion with
//! monotonic tags" supersedes the original's full heap rebuild on mutation).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use super::admission::{AdmissionPolicy, BanList};
use super::config::{AdmissionConfig, BanConfig, EvictionConfig, PoolConfig, RbfConfig, WatermarkConfig};
use super::errors::{ctx, MempoolError};
use super::eviction::{EvictionPlanner, PoolSnapshot, Victim};
use super::index::TxIndex;
use super::priority::{DefaultPriority, Priority};
use super::sequencer::{AdmitAction, AdmitReject, NonceSequencer};
use super::tx::{PoolTx, Sender, Transaction, TxHash};
use super::watermark::{FeeWatermark, Thresholds};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddAction {
    AddedReady,
    AddedHeld,
    ReplacedReady,
    ReplacedHeld,
}

impl From<AdmitAction> for AddAction {
    fn from(a: AdmitAction) -> Self {
        match a {
            AdmitAction::AddedReady => AddAction::AddedReady,
            AdmitAction::AddedHeld => AddAction::AddedHeld,
            AdmitAction::ReplacedReady => AddAction::ReplacedReady,
            AdmitAction::ReplacedHeld => AddAction::ReplacedHeld,
        }
    }
}

#[derive(Debug)]
pub struct AddResult {
    pub action: AddAction,
    pub tx_hash: TxHash,
    pub replaced: Option<TxHash>,
}

struct HeapEntry {
    priority: f64,
    tag: u64,
    tx_hash: TxHash,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.tx_hash == other.tx_hash
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; higher priority should sort greater.
        self.priority
            .partial_cmp(&other.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.tx_hash.cmp(&other.tx_hash))
    }
}

pub struct PoolConfigBundle {
    pub pool: PoolConfig,
    pub watermark: WatermarkConfig,
    pub rbf: RbfConfig,
    pub admission: AdmissionConfig,
    pub ban: BanConfig,
    pub eviction: EvictionConfig,
}

impl Default for PoolConfigBundle {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            watermark: WatermarkConfig::default(),
            rbf: RbfConfig::default(),
            admission: AdmissionConfig::default(),
            ban: BanConfig::default(),
            eviction: EvictionConfig::default(),
        }
    }
}

/// The mempool boundary type (spec §6): admits transactions, tracks
/// per-sender ordering, and exposes a priority-ordered ready set for block
/// building.
pub struct Pool<T: Transaction> {
    cfg: PoolConfigBundle,
    index: TxIndex<T>,
    sequencer: NonceSequencer<T>,
    watermark: FeeWatermark,
    admission: AdmissionPolicy,
    bans: BanList,
    evictor: EvictionPlanner,
    priority: Box<dyn Priority + Send + Sync>,
    ready_heap: BinaryHeap<HeapEntry>,
    current_tag: HashMap<TxHash, u64>,
    next_tag: u64,
    base_fee_wei: Option<u128>,
}

impl<T: Transaction> Pool<T> {
    pub fn new(cfg: PoolConfigBundle) -> Self {
        let watermark = FeeWatermark::new(cfg.watermark.clone());
        let admission = AdmissionPolicy::new(cfg.admission.clone());
        let bans = BanList::new(cfg.ban);
        let evictor = EvictionPlanner::new(cfg.eviction.clone());
        Self {
            cfg,
            index: TxIndex::new(),
            sequencer: NonceSequencer::new(),
            watermark,
            admission,
            bans,
            evictor,
            priority: Box::new(DefaultPriority::default()),
            ready_heap: BinaryHeap::new(),
            current_tag: HashMap::new(),
            next_tag: 0,
            base_fee_wei: None,
        }
    }

    pub fn set_base_fee(&mut self, base_fee_wei: Option<u128>) {
        self.base_fee_wei = base_fee_wei;
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn thresholds(&mut self) -> Thresholds {
        self.watermark
            .thresholds(self.index.len() as u64, self.cfg.pool.capacity_txs as u64)
    }

    fn bump_tag(&mut self, tx_hash: TxHash) -> u64 {
        let tag = self.next_tag;
        self.next_tag += 1;
        self.current_tag.insert(tx_hash, tag);
        tag
    }

    fn push_ready(&mut self, tx_hash: TxHash, priority: f64) {
        let tag = self.bump_tag(tx_hash);
        self.ready_heap.push(HeapEntry { priority, tag, tx_hash });
    }

    fn invalidate(&mut self, tx_hash: &TxHash) {
        self.current_tag.remove(tx_hash);
    }

    fn score(&self, tx: &PoolTx<T>, now_s: u64) -> f64 {
        self.priority
            .effective_priority(&tx.fee, &tx.meta, self.base_fee_wei, now_s)
    }

    /// Admit a transaction into the pool (spec §4.G, §6 add/AddResult
    /// boundary).
    pub fn add(&mut self, tx: T, raw_bytes: Vec<u8>, now_s: u64, local: bool) -> Result<AddResult, MempoolError> {
        let sender = tx.sender().to_vec();
        if self.bans.is_banned(&sender, now_s) {
            return Err(MempoolError::DoS {
                context: ctx([("sender", hex::encode(&sender).into())]),
            });
        }

        self.admission.check_size(tx.size_bytes())?;
        self.admission.check_chain(tx.chain_id())?;

        let thresholds = self.thresholds();
        let fee = tx.fee();
        if let Err(e) = self.admission.check_fee(&fee, self.base_fee_wei, &thresholds, local) {
            self.bans.record_low_fee_reject(&sender, now_s);
            return Err(e);
        }

        let tx_hash = tx.hash();
        if self.index.contains(&tx_hash) {
            return Err(MempoolError::DuplicateTx {
                context: ctx([("tx_hash", hex::encode(tx_hash).into())]),
            });
        }

        let mut pool_tx = PoolTx::new(tx, raw_bytes, now_s, self.base_fee_wei);
        pool_tx.meta.local = local;
        pool_tx.meta.priority_score = self.score(&pool_tx, now_s);
        let pool_tx = Arc::new(pool_tx);

        let admit = self.sequencer.admit(pool_tx.clone(), &self.cfg.rbf, None);

        let (action, replaced) = match admit {
            Ok((action, replaced)) => (action, replaced),
            Err((reject, _tx)) => {
                self.bans.record_spam_reject(&sender, now_s);
                let err = match reject {
                    AdmitReject::NonceBelowNext => MempoolError::NonceGap {
                        context: ctx([("reason", "nonce_below_next".into())]),
                    },
                    AdmitReject::ReplacementUnderpriced => MempoolError::ReplacementUnderpriced {
                        context: ctx([("sender", hex::encode(&sender).into())]),
                    },
                    AdmitReject::GasLimitTooLow => MempoolError::ReplacementUnderpriced {
                        context: ctx([("reason", "gas_limit_too_low".into())]),
                    },
                };
                return Err(err);
            }
        };

        let replaced_hash = replaced.as_ref().map(|r| r.tx_hash);
        if let Some(old) = &replaced {
            self.index.remove_by_hash(&old.tx_hash);
            self.invalidate(&old.tx_hash);
        }
        // Safe to unwrap: duplicate-hash is already ruled out above, and the
        // sender+nonce slot is exclusively owned by the sequencer admission
        // above, so no other ProbeResult can occur here.
        self.index.record_insert(pool_tx.clone()).expect("post-admit insert cannot conflict");

        self.watermark.observe_admission(pool_tx.meta.effective_fee_wei);

        let ready_now = matches!(action, AdmitAction::AddedReady | AdmitAction::ReplacedReady);
        if ready_now {
            self.push_ready(tx_hash, pool_tx.meta.priority_score);
        }

        debug!(tx_hash = %hex::encode(tx_hash), ?action, "tx admitted");

        self.run_eviction(now_s, None);

        Ok(AddResult {
            action: action.into(),
            tx_hash,
            replaced: replaced_hash,
        })
    }

    /// Explicit replace-by-fee boundary call (spec §4.G, §6 `replace`):
    /// looks up the existing tx at the candidate's `(sender, nonce)`,
    /// requires a strictly higher effective fee meeting the minimum bump
    /// (ratio optionally overridden per-sender by the injected [`Priority`]
    /// module, clamped to `max(1.0, ratio)`), then removes the old entry
    /// and inserts the new one in the same nonce slot, preserving its
    /// ready/held position.
    pub fn replace(&mut self, tx: T, raw_bytes: Vec<u8>, now_s: u64, local: bool) -> Result<AddResult, MempoolError> {
        let sender = tx.sender().to_vec();
        let nonce = tx.nonce();

        let existing_hash = self.index.get_by_sender_nonce(&sender, nonce).ok_or_else(|| MempoolError::NonceGap {
            context: ctx([("reason", "no_existing_tx_at_nonce".into())]),
        })?;
        let existing = self.index.get(&existing_hash).expect("indexed hash must resolve to a stored tx");

        self.admission.check_size(tx.size_bytes())?;
        self.admission.check_chain(tx.chain_id())?;

        let fee = tx.fee();
        let new_eff_fee = fee.effective_wei(self.base_fee_wei);
        let ratio = self.priority.rbf_min_bump(&existing.meta).unwrap_or_else(|| self.cfg.rbf.ratio());
        self.admission.check_replacement(existing.meta.effective_fee_wei, new_eff_fee, ratio)?;
        if self.cfg.rbf.require_gas_limit_ge && tx.gas_limit() < existing.tx.gas_limit() {
            return Err(MempoolError::ReplacementUnderpriced {
                context: ctx([("reason", "gas_limit_too_low".into())]),
            });
        }

        let tx_hash = tx.hash();
        if tx_hash != existing_hash && self.index.contains(&tx_hash) {
            return Err(MempoolError::DuplicateTx {
                context: ctx([("tx_hash", hex::encode(tx_hash).into())]),
            });
        }

        let mut pool_tx = PoolTx::new(tx, raw_bytes, now_s, self.base_fee_wei);
        pool_tx.meta.local = local;
        pool_tx.meta.is_replacement_candidate = true;
        pool_tx.meta.priority_score = self.score(&pool_tx, now_s);
        let pool_tx = Arc::new(pool_tx);

        let q = self
            .sequencer
            .queue_mut(&sender)
            .expect("an indexed (sender, nonce) entry implies an open sender queue");
        let was_ready = q.next_nonce <= nonce && nonce < q.ready_end;
        q.txs.insert(nonce, pool_tx.clone());

        self.index.remove_by_hash(&existing_hash);
        self.invalidate(&existing_hash);
        self.index
            .record_insert(pool_tx.clone())
            .expect("post-replace insert cannot conflict");

        self.watermark.observe_admission(pool_tx.meta.effective_fee_wei);

        if was_ready {
            self.push_ready(tx_hash, pool_tx.meta.priority_score);
        }

        debug!(tx_hash = %hex::encode(tx_hash), old_hash = %hex::encode(existing_hash), "tx replaced");

        Ok(AddResult {
            action: if was_ready {
                AddAction::ReplacedReady
            } else {
                AddAction::ReplacedHeld
            },
            tx_hash,
            replaced: Some(existing_hash),
        })
    }

    /// Pop up to `max_txs` ready transactions, highest priority first,
    /// within `max_bytes`, removing each from the pool and promoting its
    /// sender's next nonce into the ready heap (spec §4.G, §6, §8: "respects
    /// both budgets"). Stale (replaced/evicted) heap entries are discarded
    /// silently via lazy deletion.
    ///
    /// A tx that alone exceeds `max_bytes` is still returned if it is the
    /// first pick (spec §8: off-by-one allowed only when len==1); any
    /// further candidate that would overflow the budget is pushed back
    /// (re-scored at its original priority) and selection stops.
    pub fn fetch_ready(&mut self, max_txs: usize, max_bytes: u64, now_s: u64) -> Vec<Arc<PoolTx<T>>> {
        let mut out: Vec<Arc<PoolTx<T>>> = Vec::with_capacity(max_txs.min(16));
        let mut bytes_used: u64 = 0;
        while out.len() < max_txs {
            let Some(entry) = self.ready_heap.pop() else {
                break;
            };
            if self.current_tag.get(&entry.tx_hash) != Some(&entry.tag) {
                continue;
            }
            let Some(tx) = self.index.get(&entry.tx_hash) else {
                self.invalidate(&entry.tx_hash);
                continue;
            };
            let size = tx.meta.size_bytes as u64;
            if !out.is_empty() && bytes_used.saturating_add(size) > max_bytes {
                self.push_ready(entry.tx_hash, entry.priority);
                break;
            }

            let sender = tx.sender().to_vec();
            let nonce = tx.nonce();
            if self.sequencer.consume(&sender, nonce).is_none() {
                // Sender no longer has this nonce ready (consumed/evicted
                // elsewhere); discard the stale heap entry and keep looking.
                self.invalidate(&entry.tx_hash);
                continue;
            }
            self.index.remove_by_hash(&entry.tx_hash);
            self.invalidate(&entry.tx_hash);
            bytes_used += size;

            if let Some(q) = self.sequencer.queue(&sender) {
                if let Some(next) = q.peek_next() {
                    let score = self.priority.effective_priority(&next.fee, &next.meta, self.base_fee_wei, now_s);
                    self.push_ready(next.tx_hash, score);
                }
            }

            out.push(tx);
        }
        out
    }

    /// Record block inclusion: consumes the given `(sender, nonce)` pairs,
    /// promotes newly-ready successors, and updates the fee watermark from
    /// observed inclusion prices (spec §4.G, §4.B).
    pub fn on_new_block(&mut self, included: &[(Sender, u64)], now_s: u64, new_base_fee_wei: Option<u128>) {
        let mut inclusion_fees = Vec::with_capacity(included.len());
        for (sender, nonce) in included {
            if let Some(removed) = self.sequencer.consume(sender, *nonce) {
                inclusion_fees.push(removed.meta.effective_fee_wei);
                self.index.remove_by_hash(&removed.tx_hash);
                self.invalidate(&removed.tx_hash);
            }
            if let Some(q) = self.sequencer.queue(sender) {
                if let Some(next) = q.peek_next() {
                    let score = self.priority.effective_priority(&next.fee, &next.meta, new_base_fee_wei, now_s);
                    self.push_ready(next.tx_hash, score);
                }
            }
        }
        self.base_fee_wei = new_base_fee_wei;
        self.watermark.observe_block_inclusions(&inclusion_fees);

        // Spec §4.G: "if utilization ≥ target, run an eviction pass."
        if self.thresholds().utilization >= self.cfg.watermark.high_util {
            self.run_eviction(now_s, None);
        }
    }

    /// Evict according to the configured plan (spec §4.F) using a snapshot
    /// built from the sequencer's currently-held transactions.
    pub fn run_eviction(&mut self, now_s: u64, rss_bytes: Option<u64>) -> Vec<Victim> {
        let senders: Vec<Sender> = self.sequencer.senders().cloned().collect();
        let entries: Vec<Arc<PoolTx<T>>> = senders
            .iter()
            .filter_map(|s| self.sequencer.queue(s))
            .flat_map(|q| q.txs.values().cloned())
            .collect();

        let bytes_used: u64 = entries.iter().map(|t| t.meta.size_bytes as u64).sum();
        let snapshot = PoolSnapshot {
            entries: &entries,
            bytes_used,
            capacity_bytes: self.cfg.pool.capacity_bytes,
            capacity_txs: self.cfg.pool.capacity_txs,
            rss_bytes,
        };
        let plan = self.evictor.plan(&snapshot, now_s);

        for victim in &plan {
            if let Some(q) = self.sequencer.queue(&victim.sender) {
                let nonce = q.txs.iter().find(|(_, t)| t.tx_hash == victim.tx_hash).map(|(n, _)| *n);
                if let Some(nonce) = nonce {
                    self.sequencer.evict(&victim.sender, nonce);
                }
            }
            self.index.remove_by_hash(&victim.tx_hash);
            self.invalidate(&victim.tx_hash);
        }
        if !plan.is_empty() {
            warn!(count = plan.len(), "evicted transactions from pool");
        }
        plan
    }
}
