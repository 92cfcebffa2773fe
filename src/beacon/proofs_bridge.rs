// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! VDF proof ingestion bridge (spec §4.M, §5). Grounded on
//! `examples/original_source/randomness/adapters/proofs_bridge.py`:
//! fetches the expected input for a round, verifies, dedupes per round,
//! persists the first valid proof, and optionally triggers a
//! finalization callback. Same-round submissions are serialized by an
//! async mutex so two concurrent workers can't double-accept.
//!
//! Long-running verification is cancellable via a [`CancellationToken`]
//! (spec §5: "long VDF verifications should be cancellable by the round
//! manager when a round becomes irrelevant").

use std::sync::Arc;

use async_trait::async_trait;
use num_bigint::BigUint;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::VdfParams;
use super::errors::BeaconError;
use super::vdf::{self, VdfProof};

/// The expected public VDF input for a round: seed, modulus, and
/// iteration count (spec §4.J).
#[derive(Clone, Debug)]
pub struct VdfInput {
    pub seed: Vec<u8>,
    pub modulus: BigUint,
    pub params: VdfParams,
}

#[async_trait]
pub trait VdfInputProvider: Send + Sync {
    async fn get_vdf_input(&self, round_id: u64) -> Option<VdfInput>;
}

#[async_trait]
pub trait VdfStore: Send + Sync {
    async fn has_vdf_proof(&self, round_id: u64) -> bool;
    async fn write_vdf_proof(&self, round_id: u64, proof: &VdfProof, worker_id: Option<&str>, ts: u64);
}

#[async_trait]
pub trait OnAccept: Send + Sync {
    async fn on_accept(&self, round_id: u64, proof: &VdfProof, worker_id: Option<&str>);
}

/// Outcome of a single [`VdfProofsBridge::ingest_proof`] call, mirroring
/// the Python bridge's metric label set (spec §4.M).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    Ok,
    Dupe,
    InputMissing,
    VerifyErr,
    Bad,
    Cancelled,
}

/// Accepts VDF proofs for rounds, verifies them against the expected
/// input, dedupes, persists, and notifies an optional callback (spec
/// §4.M).
pub struct VdfProofsBridge<P, S, A> {
    inputs: P,
    store: S,
    on_accept: Option<A>,
    lock: Mutex<()>,
}

impl<P, S, A> VdfProofsBridge<P, S, A>
where
    P: VdfInputProvider,
    S: VdfStore,
    A: OnAccept,
{
    pub fn new(inputs: P, store: S, on_accept: Option<A>) -> Self {
        Self {
            inputs,
            store,
            on_accept,
            lock: Mutex::new(()),
        }
    }

    /// Ingest a single proof envelope for `round_id`. Idempotent: a round
    /// that already has a stored proof returns [`IngestOutcome::Dupe`]
    /// without re-verifying.
    pub async fn ingest_proof(
        &self,
        round_id: u64,
        proof: VdfProof,
        worker_id: Option<&str>,
        ts: u64,
        cancel: Option<&CancellationToken>,
    ) -> IngestOutcome {
        let _guard = self.lock.lock().await;

        if self.store.has_vdf_proof(round_id).await {
            return IngestOutcome::Dupe;
        }

        let Some(input) = self.inputs.get_vdf_input(round_id).await else {
            debug!(round = round_id, "no VDF input available");
            return IngestOutcome::InputMissing;
        };

        let verify_fut = async { vdf::verify(round_id, &input.seed, &proof, &input.params, &input.modulus) };
        let result = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(round = round_id, "VDF verification cancelled (round superseded)");
                    return IngestOutcome::Cancelled;
                }
                r = verify_fut => r,
            },
            None => verify_fut.await,
        };

        match result {
            Ok(()) => {}
            Err(BeaconError::VDFInvalid { .. }) => {
                debug!(round = round_id, "invalid VDF proof");
                return IngestOutcome::Bad;
            }
            Err(e) => {
                warn!(round = round_id, error = %e, "VDF verification error");
                return IngestOutcome::VerifyErr;
            }
        }

        self.store.write_vdf_proof(round_id, &proof, worker_id, ts).await;
        drop(_guard);

        if let Some(cb) = &self.on_accept {
            cb.on_accept(round_id, &proof, worker_id).await;
        }
        IngestOutcome::Ok
    }

    /// Ingest a batch of proofs sequentially; returns `(accepted,
    /// rejected)` counts (spec §4.M).
    pub async fn ingest_batch(&self, items: Vec<(u64, VdfProof, Option<String>, u64)>) -> (usize, usize) {
        let mut ok = 0;
        let mut bad = 0;
        for (round_id, proof, worker_id, ts) in items {
            let outcome = self
                .ingest_proof(round_id, proof, worker_id.as_deref(), ts, None)
                .await;
            if outcome == IngestOutcome::Ok || outcome == IngestOutcome::Dupe {
                ok += 1;
            } else {
                bad += 1;
            }
        }
        (ok, bad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tiny_params() -> VdfParams {
        VdfParams {
            modulus_bits: 1024,
            iterations: 20,
            challenge_bits: 64,
        }
    }

    struct FixedInput(VdfInput);
    #[async_trait]
    impl VdfInputProvider for FixedInput {
        async fn get_vdf_input(&self, _round_id: u64) -> Option<VdfInput> {
            Some(self.0.clone())
        }
    }

    struct NoInput;
    #[async_trait]
    impl VdfInputProvider for NoInput {
        async fn get_vdf_input(&self, _round_id: u64) -> Option<VdfInput> {
            None
        }
    }

    struct MemStore {
        seen: Mutex<HashMap<u64, VdfProof>>,
    }
    impl MemStore {
        fn new() -> Self {
            Self { seen: Mutex::new(HashMap::new()) }
        }
    }
    #[async_trait]
    impl VdfStore for MemStore {
        async fn has_vdf_proof(&self, round_id: u64) -> bool {
            self.seen.lock().await.contains_key(&round_id)
        }
        async fn write_vdf_proof(&self, round_id: u64, proof: &VdfProof, _worker_id: Option<&str>, _ts: u64) {
            self.seen.lock().await.insert(round_id, proof.clone());
        }
    }

    struct CountingCallback(Arc<AtomicUsize>);
    #[async_trait]
    impl OnAccept for CountingCallback {
        async fn on_accept(&self, _round_id: u64, _proof: &VdfProof, _worker_id: Option<&str>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn valid_proof_is_accepted_and_callback_runs() {
        let n = BigUint::from(3233u32);
        let params = tiny_params();
        let proof = vdf::prove(b"round-7-seed", &params, &n).unwrap();

        let input = VdfInput { seed: b"round-7-seed".to_vec(), modulus: n, params };
        let calls = Arc::new(AtomicUsize::new(0));
        let bridge = VdfProofsBridge::new(FixedInput(input), MemStore::new(), Some(CountingCallback(calls.clone())));

        let outcome = bridge.ingest_proof(7, proof, Some("worker-1"), 0, None).await;
        assert_eq!(outcome, IngestOutcome::Ok);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_round_is_idempotent() {
        let n = BigUint::from(3233u32);
        let params = tiny_params();
        let proof = vdf::prove(b"round-9-seed", &params, &n).unwrap();
        let input = VdfInput { seed: b"round-9-seed".to_vec(), modulus: n, params };

        let bridge: VdfProofsBridge<_, _, CountingCallback> = VdfProofsBridge::new(FixedInput(input), MemStore::new(), None);
        assert_eq!(bridge.ingest_proof(9, proof.clone(), None, 0, None).await, IngestOutcome::Ok);
        assert_eq!(bridge.ingest_proof(9, proof, None, 0, None).await, IngestOutcome::Dupe);
    }

    #[tokio::test]
    async fn missing_input_is_reported() {
        let n = BigUint::from(3233u32);
        let params = tiny_params();
        let proof = vdf::prove(b"whatever", &params, &n).unwrap();

        let bridge: VdfProofsBridge<_, _, CountingCallback> = VdfProofsBridge::new(NoInput, MemStore::new(), None);
        assert_eq!(bridge.ingest_proof(1, proof, None, 0, None).await, IngestOutcome::InputMissing);
    }

    #[tokio::test]
    async fn wrong_proof_is_rejected() {
        let n = BigUint::from(3233u32);
        let params = tiny_params();
        let wrong_proof = vdf::prove(b"other-seed", &params, &n).unwrap();
        let input = VdfInput { seed: b"expected-seed".to_vec(), modulus: n, params };

        let bridge: VdfProofsBridge<_, _, CountingCallback> = VdfProofsBridge::new(FixedInput(input), MemStore::new(), None);
        assert_eq!(bridge.ingest_proof(3, wrong_proof, None, 0, None).await, IngestOutcome::Bad);
    }

    #[tokio::test]
    async fn cancellation_short_circuits_verification() {
        let n = BigUint::from(3233u32);
        let params = tiny_params();
        let proof = vdf::prove(b"round-cancel", &params, &n).unwrap();
        let input = VdfInput { seed: b"round-cancel".to_vec(), modulus: n, params };

        let bridge: VdfProofsBridge<_, _, CountingCallback> = VdfProofsBridge::new(FixedInput(input), MemStore::new(), None);
        let token = CancellationToken::new();
        token.cancel();
        let outcome = bridge.ingest_proof(11, proof, None, 0, Some(&token)).await;
        assert_eq!(outcome, IngestOutcome::Cancelled);
    }
}
