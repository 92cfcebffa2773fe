// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Mempool error taxonomy (spec §7). Every variant carries a stable integer
//! code (reserved range 1000-1099) and a snake_case `reason()` label for
//! metrics-surface callers, matching the teacher's flat `thiserror` enum
//! style (`blockchain/message_pool/src/errors.rs`) rather than the original
//! source's dynamic subclassing of exception types (spec §9).

use std::collections::BTreeMap;
use thiserror::Error;

/// Small JSON-serializable context bag attached to admission/replacement
/// failures (spec §7: "Context is a small JSON-serializable map").
pub type ErrorContext = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum MempoolError {
    #[error("admission rejected: {reason}")]
    AdmissionError {
        reason: String,
        context: ErrorContext,
    },
    #[error("effective fee too low")]
    FeeTooLow { context: ErrorContext },
    #[error("nonce gap")]
    NonceGap { context: ErrorContext },
    #[error("transaction exceeds max size")]
    Oversize { context: ErrorContext },
    #[error("replacement underpriced")]
    ReplacementUnderpriced { context: ErrorContext },
    #[error("sender is rate-banned")]
    DoS { context: ErrorContext },
    #[error("transaction with this hash already present")]
    DuplicateTx { context: ErrorContext },
    #[error("transaction targets the wrong chain")]
    WrongChain { context: ErrorContext },
    #[error("unknown mempool error: {0}")]
    Unknown(String),
}

impl MempoolError {
    /// Stable integer code, reserved range 1000-1099 per spec §7.
    pub fn code(&self) -> u32 {
        match self {
            MempoolError::AdmissionError { .. } => 1000,
            MempoolError::FeeTooLow { .. } => 1001,
            MempoolError::NonceGap { .. } => 1002,
            MempoolError::Oversize { .. } => 1003,
            MempoolError::ReplacementUnderpriced { .. } => 1004,
            MempoolError::WrongChain { .. } => 1005,
            MempoolError::DuplicateTx { .. } => 1006,
            MempoolError::DoS { .. } => 1099,
            MempoolError::Unknown(_) => 1999,
        }
    }

    /// snake_case reason label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            MempoolError::AdmissionError { .. } => "admission_error",
            MempoolError::FeeTooLow { .. } => "fee_too_low",
            MempoolError::NonceGap { .. } => "nonce_gap",
            MempoolError::Oversize { .. } => "oversize",
            MempoolError::ReplacementUnderpriced { .. } => "replacement_underpriced",
            MempoolError::WrongChain { .. } => "wrong_chain",
            MempoolError::DuplicateTx { .. } => "duplicate_tx",
            MempoolError::DoS { .. } => "dos",
            MempoolError::Unknown(_) => "unknown",
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            MempoolError::AdmissionError { context, .. }
            | MempoolError::FeeTooLow { context }
            | MempoolError::NonceGap { context }
            | MempoolError::Oversize { context }
            | MempoolError::ReplacementUnderpriced { context }
            | MempoolError::WrongChain { context }
            | MempoolError::DuplicateTx { context }
            | MempoolError::DoS { context } => Some(context),
            MempoolError::Unknown(_) => None,
        }
    }
}

pub fn ctx(pairs: impl IntoIterator<Item = (&'static str, serde_json::Value)>) -> ErrorContext {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
