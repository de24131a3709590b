// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # tz-style Chain Protocol
//!
//! secp256r1-addressed (tz3) account with a one-time reveal bootstrap.
//! Fulfillments call a contract entrypoint with the job identifier and the
//! packed caller payload as a Micheline pair; forged bytes are watermarked,
//! Blake2b-256 hashed and signed raw.

pub mod forge;
pub mod micheline;
pub mod rpc;

use std::sync::Arc;

use url::Url;

use crate::coordinator::SubmissionCoordinator;
use crate::crypto::{blake2b_256, Secp256r1Signer, Signer};
use crate::error::ProcessorError;
use crate::gateway::{race_first_ok, BoxFuture, NodeGateway};
use crate::notify::Notifier;
use crate::protocol::{ChainProtocol, TransactionIntent};
use forge::{OperationContent, RevealContent, TransactionContent};
use micheline::Micheline;
use rpc::TezosRpc;

const REVEALED_FLAG: &str = "tezos/revealed";
const COUNTER_KEY: &str = "tezos";
const DEFAULT_ENTRYPOINT: &str = "fulfill";

pub struct TezosProtocol {
    signer: Arc<Secp256r1Signer>,
    gateway: NodeGateway,
    rpc: TezosRpc,
    coordinator: Arc<SubmissionCoordinator>,
    notifier: Arc<dyn Notifier>,
}

impl TezosProtocol {
    pub fn new(
        signer: Arc<Secp256r1Signer>,
        gateway: NodeGateway,
        coordinator: Arc<SubmissionCoordinator>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ProcessorError> {
        Ok(Self {
            signer,
            gateway,
            rpc: TezosRpc::new()?,
            coordinator,
            notifier,
        })
    }

    fn derive_address(&self) -> Result<String, ProcessorError> {
        let public_key = self.signer.public_key(true)?;
        Ok(forge::address_from_public_key(&public_key))
    }

    /// The parameter value of a fulfillment call: the job identifier paired
    /// with the packed caller payload.
    fn fulfill_value(job_identifier: &[u8], payload: &[u8]) -> Micheline {
        let packed = Micheline::Bytes(payload.to_vec()).pack();
        Micheline::pair(
            Micheline::Bytes(job_identifier.to_vec()),
            Micheline::Bytes(packed),
        )
    }

    /// Watermark, hash and sign forged bytes; returns `forged || sig` hex
    /// ready for injection.
    fn sign_group(
        &self,
        branch: &str,
        contents: &[OperationContent],
    ) -> Result<String, ProcessorError> {
        let forged = forge::forge_operation_group(branch, contents)?;
        let mut watermarked = Vec::with_capacity(forged.len() + 1);
        watermarked.push(forge::OPERATION_WATERMARK);
        watermarked.extend_from_slice(&forged);
        let digest = blake2b_256(&watermarked);
        let signature = self.signer.raw_sign(&digest)?;
        Ok(format!("{}{}", hex::encode(forged), hex::encode(signature)))
    }

    async fn fetch_branch(&self, endpoints: &[Url]) -> Result<String, ProcessorError> {
        let tasks: Vec<BoxFuture<Result<String, ProcessorError>>> = endpoints
            .iter()
            .cloned()
            .map(|endpoint| {
                let rpc = self.rpc.clone();
                Box::pin(async move { Ok(rpc.head_header(&endpoint).await?.hash) })
                    as BoxFuture<Result<String, ProcessorError>>
            })
            .collect();
        race_first_ok(tasks).await
    }

    async fn next_counter(
        &self,
        endpoints: &[Url],
        address: &str,
    ) -> Result<u64, ProcessorError> {
        let tasks: Vec<BoxFuture<Result<u64, ProcessorError>>> = endpoints
            .iter()
            .cloned()
            .map(|endpoint| {
                let rpc = self.rpc.clone();
                let address = address.to_owned();
                Box::pin(async move { rpc.counter(&endpoint, &address).await })
                    as BoxFuture<Result<u64, ProcessorError>>
            })
            .collect();
        // the context RPC returns the last consumed counter
        self.coordinator
            .next_counter(COUNTER_KEY, async { Ok(race_first_ok(tasks).await? + 1) })
            .await
    }

    async fn synced_urls(&self) -> Result<Vec<Url>, ProcessorError> {
        self.gateway.select_endpoints(&self.rpc).await
    }

    async fn ensure_revealed(&self) -> Result<(), ProcessorError> {
        if self.coordinator.is_bootstrapped(REVEALED_FLAG)? {
            return Ok(());
        }

        let endpoints = self.synced_urls().await?;
        let address = self.derive_address()?;

        let manager_tasks: Vec<BoxFuture<Result<Option<String>, ProcessorError>>> = endpoints
            .iter()
            .cloned()
            .map(|endpoint| {
                let rpc = self.rpc.clone();
                let address = address.clone();
                Box::pin(async move { rpc.manager_key(&endpoint, &address).await })
                    as BoxFuture<Result<Option<String>, ProcessorError>>
            })
            .collect();
        if race_first_ok(manager_tasks).await?.is_some() {
            self.coordinator.record_bootstrapped(REVEALED_FLAG)?;
            tracing::debug!("Account already revealed, flag cached");
            return Ok(());
        }

        let branch = self.fetch_branch(&endpoints).await?;
        let counter = self.next_counter(&endpoints, &address).await?;
        let reveal = OperationContent::Reveal(RevealContent {
            source: address,
            fee: forge::REVEAL_FEE,
            counter,
            gas_limit: forge::REVEAL_GAS_LIMIT,
            storage_limit: forge::REVEAL_STORAGE_LIMIT,
            public_key: self.signer.public_key(true)?,
        });
        let signed = self.sign_group(&branch, &[reveal])?;

        let rpc = self.rpc.clone();
        let hash = self
            .coordinator
            .submit(endpoints, move |endpoint| {
                let rpc = rpc.clone();
                let signed = signed.clone();
                Box::pin(async move { rpc.inject(&endpoint, &signed).await })
            })
            .await?;
        tracing::info!(operation = %hash, "Reveal injected");
        self.coordinator.record_bootstrapped(REVEALED_FLAG)?;
        Ok(())
    }

    async fn fulfill_inner(&self, intent: TransactionIntent) -> Result<String, ProcessorError> {
        let endpoints = self.synced_urls().await?;
        let address = self.derive_address()?;
        let branch = self.fetch_branch(&endpoints).await?;
        let counter = self.next_counter(&endpoints, &address).await?;

        let job_identifier = intent
            .job
            .as_ref()
            .map(|job| job.script.clone())
            .unwrap_or_default();
        let entrypoint = intent
            .extras
            .get("entrypoint")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ENTRYPOINT.to_owned());

        let transaction = OperationContent::Transaction(TransactionContent {
            source: address,
            fee: intent.fee.unwrap_or_default(),
            counter,
            gas_limit: intent.gas_limit.unwrap_or_default(),
            storage_limit: intent.storage_limit.unwrap_or_default(),
            amount: 0,
            destination: intent.destination.clone(),
            entrypoint,
            value: Self::fulfill_value(&job_identifier, &intent.payload),
        });
        let signed = self.sign_group(&branch, &[transaction])?;

        let rpc = self.rpc.clone();
        self.coordinator
            .submit(endpoints, move |endpoint| {
                let rpc = rpc.clone();
                let signed = signed.clone();
                Box::pin(async move { rpc.inject(&endpoint, &signed).await })
            })
            .await
    }
}

impl ChainProtocol for TezosProtocol {
    fn chain(&self) -> &'static str {
        "tezos"
    }

    fn address(&self) -> Result<String, ProcessorError> {
        self.derive_address()
    }

    fn init(self: Arc<Self>) -> BoxFuture<Result<(), ProcessorError>> {
        Box::pin(async move { self.ensure_revealed().await })
    }

    fn fulfill(
        self: Arc<Self>,
        intent: TransactionIntent,
    ) -> BoxFuture<Result<String, ProcessorError>> {
        Box::pin(async move {
            match self.fulfill_inner(intent).await {
                Ok(hash) => {
                    self.notifier
                        .notify("Fulfillment submitted", &format!("tezos operation {hash}"));
                    Ok(hash)
                }
                Err(e) => {
                    self.notifier
                        .notify("Fulfillment failed", &format!("tezos: {e}"));
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fulfill_value_nests_job_and_packed_payload() {
        let value = TezosProtocol::fulfill_value(&[0xAA, 0xBB], &[0x01]);
        // Pair(bytes(job), bytes(0x05 || bytes-encoding(payload)))
        assert_eq!(
            hex::encode(value.encode()),
            "07070a00000002aabb0a00000007050a0000000101"
        );
    }

    #[test]
    fn signature_b58_rendering_uses_curve_prefix() {
        let sig = [0u8; 64];
        assert!(forge::signature_to_b58(&sig).starts_with("p2sig"));
    }
}
