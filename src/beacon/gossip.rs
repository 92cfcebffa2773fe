// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Gossip adapter for the commit/reveal topics (spec §4.M). Grounded on
//! `examples/original_source/randomness/adapters/p2p_gossip.py`. Validation
//! never propagates errors to peers — malformed or stale frames are logged
//! and dropped, never a reason to penalize the transport.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use super::commit::build_commitment;
use super::errors::BeaconError;

pub const TOPIC_COMMIT: &str = "animica/rand/commit/1";
pub const TOPIC_REVEAL: &str = "animica/rand/reveal/1";

const MSG_VERSION: u32 = 1;

/// Wire schema for a commit announcement (spec §6 "Gossip messages" — codec
/// agnostic; transport framing is out of scope).
#[derive(Clone, Debug)]
pub struct CommitMsg {
    pub v: u32,
    pub round: u64,
    pub addr: Vec<u8>,
    pub commitment: [u8; 32],
    pub ts: u64,
}

/// Wire schema for a reveal announcement (spec §4.M).
#[derive(Clone, Debug)]
pub struct RevealMsg {
    pub v: u32,
    pub round: u64,
    pub addr: Vec<u8>,
    pub salt: Vec<u8>,
    pub payload: Vec<u8>,
    pub commitment: [u8; 32],
    pub ts: u64,
}

/// Transport seam: publish/subscribe over a generic P2P mesh. Left
/// unimplemented here — embedding nodes wire this to their actual gossip
/// stack (libp2p, or otherwise).
#[async_trait]
pub trait Mesh: Send + Sync {
    async fn publish(&self, topic: &str, data: &[u8]);
}

/// Soft window checks (log-only; gossip may legitimately carry late/early
/// messages across a lossy mesh, spec §4.M).
pub trait RoundChecker: Send + Sync {
    fn is_commit_open(&self, round: u64) -> bool;
    fn is_reveal_open(&self, round: u64) -> bool;
}

/// Delivery seam for accepted messages — updates the store and round
/// manager state (spec §4.M).
#[async_trait]
pub trait Sinks: Send + Sync {
    async fn on_commit(&self, msg: CommitMsg);
    async fn on_reveal(&self, msg: RevealMsg);
}

/// Fixed-capacity, TTL-bounded dedupe set keyed by arbitrary bytes.
/// Grounded on the Python `_TTLSet`: entries age out by wall-clock TTL in
/// addition to the LRU's capacity bound, so a burst of unique keys can't
/// revive an already-dropped one's slot before its TTL truly elapses.
struct TtlLru {
    cache: Mutex<LruCache<Vec<u8>, Instant>>,
    ttl: Duration,
}

impl TtlLru {
    fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap())),
            ttl,
        }
    }

    /// Returns `true` if `key` was newly inserted (i.e. not a duplicate).
    fn add_if_new(&self, key: Vec<u8>) -> bool {
        let now = Instant::now();
        let mut cache = self.cache.lock();
        if let Some(seen_at) = cache.get(&key) {
            if now.duration_since(*seen_at) < self.ttl {
                return false;
            }
        }
        cache.put(key, now);
        true
    }
}

struct Validator<'a> {
    round_checker: Option<&'a (dyn RoundChecker)>,
}

impl<'a> Validator<'a> {
    fn validate_commit(&self, msg: &CommitMsg) -> Result<(), BeaconError> {
        if msg.v != MSG_VERSION {
            return Err(BeaconError::RandError("unsupported commit message version".into()));
        }
        if !(super::commit::MIN_ADDR_LEN..=super::commit::MAX_ADDR_LEN).contains(&msg.addr.len()) {
            return Err(BeaconError::RandError("commit addr size out of range".into()));
        }
        if let Some(rc) = self.round_checker {
            if !rc.is_commit_open(msg.round) {
                debug!(round = msg.round, "commit for closed window");
            }
        }
        Ok(())
    }

    fn validate_reveal(&self, msg: &RevealMsg) -> Result<(), BeaconError> {
        if msg.v != MSG_VERSION {
            return Err(BeaconError::RandError("unsupported reveal message version".into()));
        }
        if let Some(rc) = self.round_checker {
            if !rc.is_reveal_open(msg.round) {
                debug!(round = msg.round, "reveal for closed window");
            }
        }
        // Always recompute the commitment and compare (spec §4.M: mandatory).
        let expect = build_commitment(&msg.addr, &msg.salt, &msg.payload, None)?;
        if !crate::hashing::ct_eq(&expect, &msg.commitment) {
            return Err(BeaconError::BadReveal {
                round: msg.round,
                reason: "reveal does not match commitment".into(),
            });
        }
        Ok(())
    }
}

/// Gossip adapter wiring commit/reveal topics to a [`Mesh`], with
/// TTL-LRU dedupe and mandatory structural/commitment validation before
/// handing frames to [`Sinks`] (spec §4.M).
pub struct RandomnessGossip<M, S, R> {
    mesh: M,
    sinks: S,
    round_checker: Option<R>,
    seen_commits: TtlLru,
    seen_reveals: TtlLru,
}

impl<M, S, R> RandomnessGossip<M, S, R>
where
    M: Mesh,
    S: Sinks,
    R: RoundChecker,
{
    pub fn new(mesh: M, sinks: S, round_checker: Option<R>, dedupe_size: usize, dedupe_ttl: Duration) -> Self {
        Self {
            mesh,
            sinks,
            round_checker,
            seen_commits: TtlLru::new(dedupe_size, dedupe_ttl),
            seen_reveals: TtlLru::new(dedupe_size, dedupe_ttl),
        }
    }

    pub async fn announce_commit(&self, round: u64, addr: &[u8], commitment: [u8; 32], ts: u64) {
        let msg = CommitMsg {
            v: MSG_VERSION,
            round,
            addr: addr.to_vec(),
            commitment,
            ts,
        };
        self.mesh.publish(TOPIC_COMMIT, &encode_commit(&msg)).await;
    }

    pub async fn announce_reveal(&self, round: u64, addr: &[u8], salt: &[u8], payload: &[u8], ts: u64) -> Result<(), BeaconError> {
        let commitment = build_commitment(addr, salt, payload, None)?;
        let msg = RevealMsg {
            v: MSG_VERSION,
            round,
            addr: addr.to_vec(),
            salt: salt.to_vec(),
            payload: payload.to_vec(),
            commitment,
            ts,
        };
        self.mesh.publish(TOPIC_REVEAL, &encode_reveal(&msg)).await;
        Ok(())
    }

    /// Handle a received, already-decoded commit frame. Drops and logs on
    /// any validation or dedupe failure; never surfaces an error to the
    /// caller (spec §4.M: gossip must never propagate errors to peers).
    pub async fn handle_commit(&self, msg: CommitMsg, peer: &str) {
        let validator = Validator {
            round_checker: self.round_checker.as_ref().map(|r| r as &dyn RoundChecker),
        };
        if let Err(e) = validator.validate_commit(&msg) {
            debug!(peer, error = %e, "drop commit");
            return;
        }
        if !self.seen_commits.add_if_new(msg.commitment.to_vec()) {
            debug!(peer, round = msg.round, "dupe commit");
            return;
        }
        self.sinks.on_commit(msg).await;
    }

    /// Handle a received, already-decoded reveal frame, deduped by
    /// `(round, addr)` — at most one reveal per address per round is
    /// delivered (spec §4.M).
    pub async fn handle_reveal(&self, msg: RevealMsg, peer: &str) {
        let validator = Validator {
            round_checker: self.round_checker.as_ref().map(|r| r as &dyn RoundChecker),
        };
        if let Err(e) = validator.validate_reveal(&msg) {
            debug!(peer, error = %e, "drop reveal");
            return;
        }
        let mut key = msg.round.to_be_bytes().to_vec();
        key.extend_from_slice(&msg.addr);
        if !self.seen_reveals.add_if_new(key) {
            debug!(peer, round = msg.round, "dupe reveal");
            return;
        }
        self.sinks.on_reveal(msg).await;
    }
}

fn encode_commit(msg: &CommitMsg) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 8 + msg.addr.len() + 32 + 8);
    out.extend_from_slice(&msg.v.to_be_bytes());
    out.extend_from_slice(&msg.round.to_be_bytes());
    out.extend_from_slice(&(msg.addr.len() as u32).to_be_bytes());
    out.extend_from_slice(&msg.addr);
    out.extend_from_slice(&msg.commitment);
    out.extend_from_slice(&msg.ts.to_be_bytes());
    out
}

fn encode_reveal(msg: &RevealMsg) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&msg.v.to_be_bytes());
    out.extend_from_slice(&msg.round.to_be_bytes());
    for part in [&msg.addr, &msg.salt, &msg.payload] {
        out.extend_from_slice(&(part.len() as u32).to_be_bytes());
        out.extend_from_slice(part);
    }
    out.extend_from_slice(&msg.commitment);
    out.extend_from_slice(&msg.ts.to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NullMesh;
    #[async_trait]
    impl Mesh for NullMesh {
        async fn publish(&self, _topic: &str, _data: &[u8]) {}
    }

    struct AlwaysOpen;
    impl RoundChecker for AlwaysOpen {
        fn is_commit_open(&self, _round: u64) -> bool {
            true
        }
        fn is_reveal_open(&self, _round: u64) -> bool {
            true
        }
    }

    struct CountingSinks {
        commits: Arc<AtomicUsize>,
        reveals: Arc<AtomicUsize>,
    }
    #[async_trait]
    impl Sinks for CountingSinks {
        async fn on_commit(&self, _msg: CommitMsg) {
            self.commits.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_reveal(&self, _msg: RevealMsg) {
            self.reveals.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn duplicate_commit_is_dropped() {
        let commits = Arc::new(AtomicUsize::new(0));
        let reveals = Arc::new(AtomicUsize::new(0));
        let gossip = RandomnessGossip::new(
            NullMesh,
            CountingSinks { commits: commits.clone(), reveals },
            Some(AlwaysOpen),
            1024,
            Duration::from_secs(60),
        );

        let msg = CommitMsg {
            v: 1,
            round: 1,
            addr: vec![1u8; 20],
            commitment: [9u8; 32],
            ts: 0,
        };
        gossip.handle_commit(msg.clone(), "peer-a").await;
        gossip.handle_commit(msg, "peer-a").await;
        assert_eq!(commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reveal_with_wrong_commitment_is_rejected() {
        let commits = Arc::new(AtomicUsize::new(0));
        let reveals = Arc::new(AtomicUsize::new(0));
        let gossip = RandomnessGossip::new(
            NullMesh,
            CountingSinks { commits, reveals: reveals.clone() },
            Some(AlwaysOpen),
            1024,
            Duration::from_secs(60),
        );

        let msg = RevealMsg {
            v: 1,
            round: 1,
            addr: vec![1u8; 20],
            salt: vec![2u8; 16],
            payload: vec![],
            commitment: [0u8; 32],
            ts: 0,
        };
        gossip.handle_reveal(msg, "peer-b").await;
        assert_eq!(reveals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_reveal_is_delivered() {
        let commits = Arc::new(AtomicUsize::new(0));
        let reveals = Arc::new(AtomicUsize::new(0));
        let gossip = RandomnessGossip::new(
            NullMesh,
            CountingSinks { commits, reveals: reveals.clone() },
            Some(AlwaysOpen),
            1024,
            Duration::from_secs(60),
        );

        let addr = vec![1u8; 20];
        let salt = vec![2u8; 16];
        let payload = vec![3u8; 4];
        let commitment = build_commitment(&addr, &salt, &payload, None).unwrap();
        let msg = RevealMsg {
            v: 1,
            round: 1,
            addr,
            salt,
            payload,
            commitment,
            ts: 0,
        };
        gossip.handle_reveal(msg, "peer-c").await;
        assert_eq!(reveals.load(Ordering::SeqCst), 1);
    }
}
