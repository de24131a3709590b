// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Error Taxonomy
//!
//! Central error type shared across the signing, protocol, gateway and
//! sandbox layers. Each variant maps to a distinct recovery strategy:
//!
//! | Variant | Recovery |
//! |---------|----------|
//! | `KeyUnavailable` | fall back to a software-backed key, else fatal for the operation |
//! | `RecoveryImpossible` | fatal, corrupted signature or wrong key |
//! | `NetworkUnreachable` | retried at the next scheduled attempt, never in-loop |
//! | `SubmissionRejected` | retried up to the fixed budget, then surfaced |
//! | `ScriptFault` | terminates the sandbox, reported to the requester |
//! | `ExecutionTimeout` | terminates the sandbox, reported to the requester |
//!
//! `ScriptFault` and `ExecutionTimeout` flow through the same channel so a
//! caller cannot distinguish slowness from a bug without inspecting the
//! reason.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The enclave (or its software fallback) could not produce or use a key.
    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),

    /// No recovery id in 0..=3 reconstructs the expected public key.
    #[error("signature recovery impossible: {0}")]
    RecoveryImpossible(String),

    /// No synced RPC endpoint responded within the probe window.
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    /// A chain node rejected the submitted transaction.
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// The job script threw, or misused a capability at the boundary.
    #[error("script fault: {0}")]
    ScriptFault(String),

    /// The job script exceeded its wall-clock execution budget.
    #[error("execution deadline exceeded after {0:?}")]
    ExecutionTimeout(std::time::Duration),

    /// Wire or address encoding failed (base58, hex, SCALE, RLP, Micheline).
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The embedded replay-state store failed.
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StoreError),
}

impl ProcessorError {
    /// Whether a submission guarded by this error is worth another attempt
    /// within the current retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SubmissionRejected(_))
    }
}

impl From<crate::crypto::CryptoError> for ProcessorError {
    fn from(e: crate::crypto::CryptoError) -> Self {
        match e {
            crate::crypto::CryptoError::KeyUnavailable(msg) => Self::KeyUnavailable(msg),
            crate::crypto::CryptoError::RecoveryImpossible(msg) => Self::RecoveryImpossible(msg),
            other => Self::KeyUnavailable(other.to_string()),
        }
    }
}
