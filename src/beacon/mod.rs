// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Commit-reveal + Wesolowski VDF randomness beacon (spec §2 components
//! H-M): round/phase timing, commitment construction and verification,
//! bias-resistant aggregation, a VDF prover/verifier, round finalization,
//! light-client proofs, the randomness KV schema, and gossip/proof-bridge
//! adapters.
//!
//! RPC endpoints, metrics exporters, and a concrete P2P transport are
//! explicitly out of scope here (spec §1); this module exposes the seams
//! (`Mesh`, `RoundChecker`, `Sinks`, `VdfInputProvider`, `VdfStore`,
//! `OnAccept`) an external collaborator wires those onto.

pub mod aggregate;
pub mod commit;
pub mod config;
pub mod errors;
pub mod finalize;
pub mod gossip;
pub mod kv;
pub mod light_proof;
pub mod proofs_bridge;
pub mod round_manager;
pub mod vdf;
pub mod verify;

pub use aggregate::{aggregate_reveals, hash_chain, hash_xor_fold};
pub use commit::{build_commitment, CommitRecord};
pub use config::{AggregationMode, QrngConfig, RoundParams, VdfParams};
pub use errors::{BeaconError, VdfInvalidReason};
pub use finalize::{finalize_round, BeaconOut, BeaconState};
pub use light_proof::{hash_beacon_out_min, verify_chain_from_anchor, verify_light_proof, LightProof};
pub use round_manager::{Phase, RoundBoundaries, RoundId, RoundManager};
pub use vdf::{prove, verify as vdf_verify, VdfProof};
pub use verify::{verify_reveal, RevealRecord};
