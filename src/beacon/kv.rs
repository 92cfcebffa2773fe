// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Logical byte-KV schema for the randomness subsystem (spec §4.L).
//! Grounded on `examples/original_source/randomness/store/{kv.py,index.py}`.
//! Keys are domain-separated by a 1-byte bucket prefix followed by
//! length-prefixed parts; secondary indexes (by round, by participant) are
//! maintained alongside the primary writes inside the same transaction.
//!
//! The backend here is an in-memory `BTreeMap`, matching
//! [`crate::mempool::index`]'s `parking_lot`-guarded style; embedding nodes
//! are expected to swap in a real KV engine behind the same [`KeyValueStore`]
//! trait (persistent storage format is explicitly out of scope, spec §2).

use std::collections::BTreeMap;

use parking_lot::RwLock;

pub const COMMITS_PREFIX: u8 = 0x01;
pub const REVEALS_PREFIX: u8 = 0x02;
pub const VDF_PREFIX: u8 = 0x03;
pub const BEACON_PREFIX: u8 = 0x04;
pub const META_PREFIX: u8 = 0x05;

pub const VDF_IN_TAG: u8 = b'I';
pub const VDF_PROOF_TAG: u8 = b'P';
pub const VDF_AUX_TAG: u8 = b'A';

pub const BEACON_OUT_TAG: u8 = b'O';
pub const BEACON_LIGHT_TAG: u8 = b'L';

pub const META_CURRENT_ROUND: &[u8] = b"current_round";
pub const META_LAST_FINALIZED: &[u8] = b"last_finalized_round";
pub const META_PARAMS_SNAPSHOT: &[u8] = b"params_snapshot";

fn k(prefix: u8, parts: &[&[u8]]) -> Vec<u8> {
    let mut out = vec![prefix];
    for p in parts {
        out.extend_from_slice(&(p.len() as u32).to_be_bytes());
        out.extend_from_slice(p);
    }
    out
}

fn k_tagged(prefix: u8, tag: u8, parts: &[&[u8]]) -> Vec<u8> {
    let mut out = vec![prefix, tag];
    for p in parts {
        out.extend_from_slice(&(p.len() as u32).to_be_bytes());
        out.extend_from_slice(p);
    }
    out
}

pub fn key_commit(round: u64, participant: &[u8]) -> Vec<u8> {
    k(COMMITS_PREFIX, &[&round.to_be_bytes(), participant])
}

pub fn key_reveal(round: u64, participant: &[u8]) -> Vec<u8> {
    k(REVEALS_PREFIX, &[&round.to_be_bytes(), participant])
}

pub fn key_vdf_input(round: u64) -> Vec<u8> {
    k_tagged(VDF_PREFIX, VDF_IN_TAG, &[&round.to_be_bytes()])
}

pub fn key_vdf_proof(round: u64) -> Vec<u8> {
    k_tagged(VDF_PREFIX, VDF_PROOF_TAG, &[&round.to_be_bytes()])
}

pub fn key_vdf_aux(round: u64) -> Vec<u8> {
    k_tagged(VDF_PREFIX, VDF_AUX_TAG, &[&round.to_be_bytes()])
}

pub fn key_beacon_out(round: u64) -> Vec<u8> {
    k_tagged(BEACON_PREFIX, BEACON_OUT_TAG, &[&round.to_be_bytes()])
}

pub fn key_beacon_light(round: u64) -> Vec<u8> {
    k_tagged(BEACON_PREFIX, BEACON_LIGHT_TAG, &[&round.to_be_bytes()])
}

pub fn key_meta(name: &[u8]) -> Vec<u8> {
    k(META_PREFIX, &[name])
}

fn idx_round_prefix(kind: u8, round: u64) -> Vec<u8> {
    let mut out = b"idx:round:".to_vec();
    out.push(kind);
    out.extend_from_slice(b":");
    out.extend_from_slice(&round.to_be_bytes());
    out
}

fn idx_round_key(kind: u8, round: u64, primary_key: &[u8]) -> Vec<u8> {
    let mut out = idx_round_prefix(kind, round);
    out.extend_from_slice(b":");
    out.extend_from_slice(primary_key);
    out
}

fn idx_addr_prefix(kind: u8, addr: &[u8]) -> Vec<u8> {
    let mut out = b"idx:addr:".to_vec();
    out.push(kind);
    out.extend_from_slice(b":");
    out.push(addr.len() as u8);
    out.extend_from_slice(addr);
    out
}

fn idx_addr_key(kind: u8, addr: &[u8], round: u64, primary_key: &[u8]) -> Vec<u8> {
    let mut out = idx_addr_prefix(kind, addr);
    out.extend_from_slice(b":");
    out.extend_from_slice(&round.to_be_bytes());
    out.extend_from_slice(b":");
    out.extend_from_slice(primary_key);
    out
}

const KIND_COMMIT: u8 = b'c';
const KIND_REVEAL: u8 = b'r';

/// Queued mutation applied atomically by [`KeyValueStore::transaction`].
enum Op {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// An in-flight batch of writes; the primary record and its secondary
/// indexes must land in the same batch so they can never drift apart (spec
/// §4.L: "Index writes must occur inside the same transaction as the
/// primary write.").
#[derive(Default)]
pub struct Transaction {
    ops: Vec<Op>,
}

impl Transaction {
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> &mut Self {
        self.ops.push(Op::Put(key, value));
        self
    }

    pub fn delete(&mut self, key: Vec<u8>) -> &mut Self {
        self.ops.push(Op::Delete(key));
        self
    }

    /// Stage a commit record plus its round/address secondary indexes.
    pub fn put_commit(&mut self, round: u64, participant: &[u8], value: Vec<u8>) -> &mut Self {
        let pk = key_commit(round, participant);
        self.put(idx_round_key(KIND_COMMIT, round, &pk), pk.clone());
        self.put(idx_addr_key(KIND_COMMIT, participant, round, &pk), pk.clone());
        self.put(pk, value)
    }

    /// Stage a reveal record plus its round/address secondary indexes.
    pub fn put_reveal(&mut self, round: u64, participant: &[u8], value: Vec<u8>) -> &mut Self {
        let pk = key_reveal(round, participant);
        self.put(idx_round_key(KIND_REVEAL, round, &pk), pk.clone());
        self.put(idx_addr_key(KIND_REVEAL, participant, round, &pk), pk.clone());
        self.put(pk, value)
    }
}

/// In-memory byte-KV backing store for the randomness subsystem (spec
/// §4.L). Wraps a `BTreeMap` so `iter_prefix` can use ordered range scans.
#[derive(Default)]
pub struct KeyValueStore {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.read().get(key).cloned()
    }

    pub fn has(&self, key: &[u8]) -> bool {
        self.inner.read().contains_key(key)
    }

    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        self.inner.write().insert(key, value);
    }

    pub fn delete(&self, key: &[u8]) {
        self.inner.write().remove(key);
    }

    /// Yield `(key, value)` pairs whose keys start with `prefix`, in
    /// ascending key order. Ordering is a `BTreeMap` artifact, not a
    /// guarantee callers should depend on across backends (spec §4.L).
    pub fn iter_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.inner
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Apply a batch of staged writes atomically under a single lock
    /// acquisition (spec §4.L transactional write requirement).
    pub fn transaction<F>(&self, build: F)
    where
        F: FnOnce(&mut Transaction),
    {
        let mut txn = Transaction::default();
        build(&mut txn);
        let mut guard = self.inner.write();
        for op in txn.ops {
            match op {
                Op::Put(k, v) => {
                    guard.insert(k, v);
                }
                Op::Delete(k) => {
                    guard.remove(&k);
                }
            }
        }
    }

    pub fn iter_commits_by_round(&self, round: u64) -> Vec<Vec<u8>> {
        self.iter_prefix(&idx_round_prefix(KIND_COMMIT, round))
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }

    pub fn iter_reveals_by_round(&self, round: u64) -> Vec<Vec<u8>> {
        self.iter_prefix(&idx_round_prefix(KIND_REVEAL, round))
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }

    pub fn iter_commits_by_address(&self, addr: &[u8]) -> Vec<Vec<u8>> {
        self.iter_prefix(&idx_addr_prefix(KIND_COMMIT, addr))
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }

    pub fn iter_reveals_by_address(&self, addr: &[u8]) -> Vec<Vec<u8>> {
        self.iter_prefix(&idx_addr_prefix(KIND_REVEAL, addr))
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_writes_primary_and_both_indexes_together() {
        let store = KeyValueStore::new();
        let addr = vec![7u8; 20];
        store.transaction(|txn| {
            txn.put_commit(5, &addr, b"commitment-bytes".to_vec());
        });

        assert_eq!(
            store.get(&key_commit(5, &addr)),
            Some(b"commitment-bytes".to_vec())
        );
        assert_eq!(store.iter_commits_by_round(5), vec![key_commit(5, &addr)]);
        assert_eq!(store.iter_commits_by_address(&addr), vec![key_commit(5, &addr)]);
    }

    #[test]
    fn iter_prefix_does_not_leak_across_buckets() {
        let store = KeyValueStore::new();
        store.put(key_commit(1, b"a"), b"v1".to_vec());
        store.put(key_reveal(1, b"a"), b"v2".to_vec());

        let commits = store.iter_prefix(&[COMMITS_PREFIX]);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].1, b"v1");
    }

    #[test]
    fn meta_singleton_roundtrip() {
        let store = KeyValueStore::new();
        store.put(key_meta(META_CURRENT_ROUND), 42u64.to_be_bytes().to_vec());
        assert_eq!(
            store.get(&key_meta(META_CURRENT_ROUND)),
            Some(42u64.to_be_bytes().to_vec())
        );
    }
}
