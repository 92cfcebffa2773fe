// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Mempool: admission, per-sender nonce sequencing, RBF, a fee watermark,
//! eviction, and a priority-ordered ready set (spec §2 components A-G).
//!
//! CLI surfaces, RPC endpoints, metrics exporters, and storage/network
//! adapters are explicitly out of scope here (spec §1); this module exposes
//! the pieces an external collaborator wires those concerns onto.

pub mod admission;
pub mod config;
pub mod errors;
pub mod eviction;
pub mod index;
pub mod pool;
pub mod priority;
pub mod sequencer;
pub mod tx;
pub mod watermark;

pub use errors::MempoolError;
pub use pool::{AddAction, AddResult, Pool, PoolConfigBundle};
pub use tx::{EffectiveFee, PoolTx, Transaction, TxMeta};
