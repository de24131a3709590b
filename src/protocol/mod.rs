// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Chain Protocols
//!
//! One implementation per supported chain family, all behind the same
//! contract: derive the account address from the signer's public key,
//! perform the one-time on-chain bootstrap, and turn an opaque fulfillment
//! payload into a signed, chain-native transaction submitted through the
//! gateway.

pub mod acurast;
pub mod ethereum;
pub mod tezos;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ProcessorError;
use crate::gateway::BoxFuture;

/// Identifies a job on the account-model origin chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobIdentifier {
    /// Requester account (32 bytes).
    pub requester: [u8; 32],
    /// Script reference bytes as registered on-chain.
    pub script: Vec<u8>,
}

/// Terminal result of a job execution, reported back to the origin chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success(Vec<u8>),
    Failure(Vec<u8>),
}

/// One fulfillment request, immutable once built, consumed exactly once.
#[derive(Debug, Clone)]
pub struct TransactionIntent {
    pub destination: String,
    pub payload: Vec<u8>,
    pub job: Option<JobIdentifier>,
    pub fee: Option<u64>,
    pub gas_limit: Option<u64>,
    pub storage_limit: Option<u64>,
    /// Chain-specific extras (entrypoint name, fee caps, ...).
    pub extras: HashMap<String, String>,
}

impl TransactionIntent {
    pub fn new(destination: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            destination: destination.into(),
            payload,
            job: None,
            fee: None,
            gas_limit: None,
            storage_limit: None,
            extras: HashMap::new(),
        }
    }
}

/// Common chain contract. Methods take `Arc<Self>` so implementations can
/// move themselves into the returned futures and stay object-safe.
pub trait ChainProtocol: Send + Sync {
    fn chain(&self) -> &'static str;

    /// Chain address derived from the signer's public key.
    fn address(&self) -> Result<String, ProcessorError>;

    /// One-time on-chain bootstrap (idempotent; a cached observation skips
    /// network I/O entirely).
    fn init(self: Arc<Self>) -> BoxFuture<Result<(), ProcessorError>>;

    /// Build, sign and submit a fulfillment transaction; resolves to the
    /// transaction identifier.
    fn fulfill(
        self: Arc<Self>,
        intent: TransactionIntent,
    ) -> BoxFuture<Result<String, ProcessorError>>;
}
