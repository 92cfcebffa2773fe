// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! `ledger_core`: a transaction mempool (admission, replacement, eviction,
//! priority selection) and a commit-reveal + Wesolowski VDF randomness
//! beacon, sharing a single domain-separated hashing layer.
//!
//! Neither subsystem performs consensus, signature/state verification
//! beyond admission-time duck-typed hooks, or network transport; those are
//! the concern of an embedding node (spec §1).

pub mod beacon;
pub mod hashing;
pub mod mempool;
