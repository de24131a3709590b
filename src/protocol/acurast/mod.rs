// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Account-Model Chain Protocol
//!
//! secp256r1-addressed substrate-style account. The account id is the
//! Blake2b-256 hash of the compressed public key, rendered as SS58; every
//! submission is a mortal signed extrinsic built from freshly raced chain
//! context (head number, block hashes, runtime versions) and a nonce
//! served through the coordinator's freshness cache.
//!
//! Besides job fulfillment this protocol carries the processor's own
//! lifecycle extrinsics: the fulfillment report and the liveness heartbeat.

pub mod codec;
pub mod rpc;

use std::sync::Arc;

use url::Url;

use crate::coordinator::SubmissionCoordinator;
use crate::crypto::{blake2b_256, Secp256r1Signer, Signer};
use crate::error::ProcessorError;
use crate::gateway::{race_first_ok, BoxFuture, NodeGateway};
use crate::notify::Notifier;
use crate::protocol::{ChainProtocol, ExecutionOutcome, JobIdentifier, TransactionIntent};
use codec::OperationContext;
use rpc::AcurastRpc;

const COUNTER_KEY: &str = "acurast";

pub struct AcurastProtocol {
    signer: Arc<Secp256r1Signer>,
    gateway: NodeGateway,
    rpc: AcurastRpc,
    coordinator: Arc<SubmissionCoordinator>,
    notifier: Arc<dyn Notifier>,
}

impl AcurastProtocol {
    pub fn new(
        signer: Arc<Secp256r1Signer>,
        gateway: NodeGateway,
        coordinator: Arc<SubmissionCoordinator>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ProcessorError> {
        Ok(Self {
            signer,
            gateway,
            rpc: AcurastRpc::new()?,
            coordinator,
            notifier,
        })
    }

    fn account_id(&self) -> Result<[u8; 32], ProcessorError> {
        let public_key = self.signer.public_key(true)?;
        Ok(blake2b_256(&public_key))
    }

    async fn synced_urls(&self) -> Result<Vec<Url>, ProcessorError> {
        self.gateway.select_endpoints(&self.rpc).await
    }

    async fn raced<T, F>(&self, endpoints: &[Url], fetch: F) -> Result<T, ProcessorError>
    where
        T: Send + 'static,
        F: Fn(AcurastRpc, Url) -> BoxFuture<Result<T, ProcessorError>>,
    {
        let tasks: Vec<BoxFuture<Result<T, ProcessorError>>> = endpoints
            .iter()
            .cloned()
            .map(|endpoint| fetch(self.rpc.clone(), endpoint))
            .collect();
        race_first_ok(tasks).await
    }

    /// Fetch everything the signing payload needs in one round: head
    /// number, checkpoint and genesis hashes, runtime versions and the
    /// account nonce.
    async fn operation_context(
        &self,
        endpoints: &[Url],
    ) -> Result<OperationContext, ProcessorError> {
        let head = self
            .raced(endpoints, |rpc, endpoint| {
                Box::pin(async move { rpc.header_number(&endpoint).await })
            })
            .await?;
        let genesis_hash = self
            .raced(endpoints, |rpc, endpoint| {
                Box::pin(async move { rpc.block_hash(&endpoint, 0).await })
            })
            .await?;
        let block_hash = self
            .raced(endpoints, move |rpc, endpoint| {
                Box::pin(async move { rpc.block_hash(&endpoint, head).await })
            })
            .await?;
        let (spec_version, transaction_version) = self
            .raced(endpoints, |rpc, endpoint| {
                Box::pin(async move { rpc.runtime_version(&endpoint).await })
            })
            .await?;

        let address = codec::ss58_encode(&self.account_id()?);
        let nonce = self
            .coordinator
            .next_counter(COUNTER_KEY, async {
                self.raced(endpoints, move |rpc, endpoint| {
                    let address = address.clone();
                    Box::pin(async move { rpc.account_next_index(&endpoint, &address).await })
                })
                .await
            })
            .await?;

        Ok(OperationContext {
            era: codec::mortal_era(head),
            nonce,
            tip: 0,
            spec_version,
            transaction_version,
            genesis_hash,
            block_hash,
        })
    }

    /// Sign `call` under `context` and assemble the submission-ready
    /// extrinsic. The runtime wants the recoverable form, `r || s || v`.
    fn sign_call(
        &self,
        call: &[u8],
        context: &OperationContext,
    ) -> Result<Vec<u8>, ProcessorError> {
        let payload = codec::signing_payload(call, context);
        let digest = codec::signing_digest(&payload);
        let signature = self.signer.raw_sign(&digest)?;
        let recovery_id = self.signer.find_recovery_id(&signature, &digest)?;

        let mut recoverable = [0u8; 65];
        recoverable[..64].copy_from_slice(&signature);
        recoverable[64] = recovery_id;

        Ok(codec::extrinsic(call, context, &self.account_id()?, &recoverable))
    }

    async fn submit_call(&self, call: Vec<u8>) -> Result<String, ProcessorError> {
        let endpoints = self.synced_urls().await?;
        let context = self.operation_context(&endpoints).await?;
        let extrinsic_hex = format!("0x{}", hex::encode(self.sign_call(&call, &context)?));

        let rpc = self.rpc.clone();
        self.coordinator
            .submit(endpoints, move |endpoint| {
                let rpc = rpc.clone();
                let extrinsic_hex = extrinsic_hex.clone();
                Box::pin(async move { rpc.submit_extrinsic(&endpoint, &extrinsic_hex).await })
            })
            .await
    }

    /// Report a job execution back to its requester pallet.
    pub async fn report(
        &self,
        job: &JobIdentifier,
        last: bool,
        outcome: &ExecutionOutcome,
    ) -> Result<String, ProcessorError> {
        let hash = self
            .submit_call(codec::report_call(job, last, outcome))
            .await?;
        tracing::info!(extrinsic = %hash, last, "Fulfillment report submitted");
        Ok(hash)
    }

    /// Liveness heartbeat extrinsic.
    pub async fn heartbeat(&self) -> Result<String, ProcessorError> {
        self.submit_call(codec::heartbeat_call()).await
    }

    fn call_index(intent: &TransactionIntent) -> Result<[u8; 2], ProcessorError> {
        let raw = intent
            .extras
            .get("callIndex")
            .ok_or_else(|| ProcessorError::Encoding("missing fulfill call index".into()))?;
        let bytes = hex::decode(raw)
            .map_err(|e| ProcessorError::Encoding(format!("bad call index {raw}: {e}")))?;
        bytes
            .try_into()
            .map_err(|_| ProcessorError::Encoding(format!("call index {raw} is not 2 bytes")))
    }

    async fn fulfill_inner(&self, intent: TransactionIntent) -> Result<String, ProcessorError> {
        let call_index = Self::call_index(&intent)?;
        let script = intent
            .job
            .as_ref()
            .map(|job| job.script.clone())
            .ok_or_else(|| {
                ProcessorError::Encoding("fulfillment requires a job identifier".into())
            })?;
        self.submit_call(codec::fulfill_call(call_index, &script, &intent.payload))
            .await
    }
}

impl ChainProtocol for AcurastProtocol {
    fn chain(&self) -> &'static str {
        "acurast"
    }

    fn address(&self) -> Result<String, ProcessorError> {
        Ok(codec::ss58_encode(&self.account_id()?))
    }

    fn init(self: Arc<Self>) -> BoxFuture<Result<(), ProcessorError>> {
        // the account needs no on-chain reveal; registration is handled by
        // the onboarding flow outside this process
        Box::pin(async { Ok(()) })
    }

    fn fulfill(
        self: Arc<Self>,
        intent: TransactionIntent,
    ) -> BoxFuture<Result<String, ProcessorError>> {
        Box::pin(async move {
            match self.fulfill_inner(intent).await {
                Ok(hash) => {
                    self.notifier
                        .notify("Fulfillment submitted", &format!("acurast extrinsic {hash}"));
                    Ok(hash)
                }
                Err(e) => {
                    self.notifier
                        .notify("Fulfillment failed", &format!("acurast: {e}"));
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keystore::software::SoftwareP256KeyStore;
    use crate::notify::test_support::RecordingNotifier;
    use crate::storage::ProcessorStore;

    fn protocol() -> (tempfile::TempDir, AcurastProtocol) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ProcessorStore::open(&dir.path().join("state.redb")).unwrap());
        let key = p256::ecdsa::SigningKey::from_slice(&[0x42u8; 32]).unwrap();
        let signer = Arc::new(Secp256r1Signer::new(Arc::new(
            SoftwareP256KeyStore::from_signing_key(key),
        )));
        let protocol = AcurastProtocol::new(
            signer,
            NodeGateway::new(Vec::new()),
            Arc::new(SubmissionCoordinator::new(store)),
            Arc::new(RecordingNotifier::default()),
        )
        .unwrap();
        (dir, protocol)
    }

    #[test]
    fn address_is_the_hashed_public_key_in_ss58() {
        let (_dir, protocol) = protocol();
        let account = protocol.account_id().unwrap();
        let address = protocol.address().unwrap();
        assert_eq!(address, codec::ss58_encode(&account));
        assert_eq!(address.len(), 48);
    }

    #[test]
    fn signed_extrinsic_carries_a_valid_recovery_id() {
        let (_dir, protocol) = protocol();
        let context = OperationContext {
            era: [0x05, 0x00],
            nonce: 3,
            tip: 0,
            spec_version: 1,
            transaction_version: 1,
            genesis_hash: [0u8; 32],
            block_hash: [0u8; 32],
        };
        let encoded = protocol
            .sign_call(&codec::heartbeat_call(), &context)
            .unwrap();
        // recovery id sits at the end of the 65-byte signature field,
        // which starts one tag byte past the 34-byte address
        let body = &encoded[2..];
        assert_eq!(body[34], 0x03);
        assert!(body[35 + 64] <= 3);
    }

    #[test]
    fn fulfill_call_index_comes_from_the_intent() {
        let mut intent = TransactionIntent::new("", vec![0x01]);
        assert!(matches!(
            AcurastProtocol::call_index(&intent),
            Err(ProcessorError::Encoding(_))
        ));

        intent.extras.insert("callIndex".into(), "3c00".into());
        assert_eq!(AcurastProtocol::call_index(&intent).unwrap(), [0x3c, 0x00]);

        intent.extras.insert("callIndex".into(), "3c".into());
        assert!(AcurastProtocol::call_index(&intent).is_err());
    }
}
