// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # EVM Chain Protocol
//!
//! secp256k1-addressed account submitting EIP-1559 contract calls. The
//! unsigned transaction is `0x02 || RLP(fields)`, hashed with keccak256 and
//! signed raw; the recovery id becomes the y-parity field of the signed
//! encoding. No on-chain bootstrap is required.

pub mod abi;
pub mod rpc;

use std::sync::Arc;

use alloy::primitives::{keccak256, Address, Bytes, U256};
use alloy::rlp::{Encodable, Header};
use url::Url;

use crate::coordinator::SubmissionCoordinator;
use crate::crypto::{Secp256k1Signer, Signer};
use crate::error::ProcessorError;
use crate::gateway::{race_first_ok, BoxFuture, NodeGateway};
use crate::notify::Notifier;
use crate::protocol::{ChainProtocol, TransactionIntent};
use rpc::EthereumRpc;

const DEFAULT_METHOD_SIGNATURE: &str = "fulfill(bytes)";
const DEFAULT_GAS_LIMIT: u64 = 9_000_000;

/// Transaction envelope type byte for dynamic-fee transactions.
const EIP1559_TYPE: u8 = 0x02;

#[derive(Debug, Clone)]
pub struct Eip1559Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl Eip1559Transaction {
    fn encode_fields(&self, signature: Option<(u8, U256, U256)>, out: &mut Vec<u8>) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        self.max_priority_fee_per_gas.encode(out);
        self.max_fee_per_gas.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.data.encode(out);
        // empty access list
        Header {
            list: true,
            payload_length: 0,
        }
        .encode(out);
        if let Some((y_parity, r, s)) = signature {
            (y_parity as u64).encode(out);
            r.encode(out);
            s.encode(out);
        }
    }

    fn envelope(&self, signature: Option<(u8, U256, U256)>) -> Vec<u8> {
        let mut body = Vec::new();
        self.encode_fields(signature, &mut body);

        let mut out = vec![EIP1559_TYPE];
        Header {
            list: true,
            payload_length: body.len(),
        }
        .encode(&mut out);
        out.extend_from_slice(&body);
        out
    }

    /// Digest signed by the account key.
    pub fn signing_digest(&self) -> [u8; 32] {
        keccak256(self.envelope(None)).0
    }

    /// Fully signed wire encoding.
    pub fn into_signed(self, y_parity: u8, signature: &[u8; 64]) -> Vec<u8> {
        let r = U256::from_be_slice(&signature[..32]);
        let s = U256::from_be_slice(&signature[32..]);
        self.envelope(Some((y_parity, r, s)))
    }
}

pub struct EthereumProtocol {
    signer: Arc<Secp256k1Signer>,
    gateway: NodeGateway,
    rpc: EthereumRpc,
    coordinator: Arc<SubmissionCoordinator>,
    notifier: Arc<dyn Notifier>,
}

impl EthereumProtocol {
    pub fn new(
        signer: Arc<Secp256k1Signer>,
        gateway: NodeGateway,
        coordinator: Arc<SubmissionCoordinator>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ProcessorError> {
        Ok(Self {
            signer,
            gateway,
            rpc: EthereumRpc::new()?,
            coordinator,
            notifier,
        })
    }

    fn derive_address(&self) -> Result<Address, ProcessorError> {
        let public_key = self.signer.public_key(false)?;
        // skip the SEC1 tag byte, keep the last 20 bytes of the hash
        let hash = keccak256(&public_key[1..]);
        Ok(Address::from_slice(&hash[12..]))
    }

    /// Endpoint set for one submission: the script-provided RPC overrides
    /// the configured gateway.
    async fn resolve_endpoints(
        &self,
        intent: &TransactionIntent,
    ) -> Result<Vec<Url>, ProcessorError> {
        if let Some(rpc) = intent.extras.get("rpc") {
            let url = Url::parse(rpc)
                .map_err(|e| ProcessorError::Encoding(format!("bad rpc url {rpc}: {e}")))?;
            return Ok(vec![url]);
        }
        self.gateway.select_endpoints(&self.rpc).await
    }

    async fn raced_quantity<F>(&self, endpoints: &[Url], fetch: F) -> Result<u64, ProcessorError>
    where
        F: Fn(EthereumRpc, Url) -> BoxFuture<Result<u64, ProcessorError>>,
    {
        let tasks: Vec<BoxFuture<Result<u64, ProcessorError>>> = endpoints
            .iter()
            .cloned()
            .map(|endpoint| fetch(self.rpc.clone(), endpoint))
            .collect();
        race_first_ok(tasks).await
    }

    async fn fulfill_inner(&self, intent: TransactionIntent) -> Result<String, ProcessorError> {
        let endpoints = self.resolve_endpoints(&intent).await?;
        let address = self.derive_address()?;

        let chain_id = self
            .raced_quantity(&endpoints, |rpc, endpoint| {
                Box::pin(async move { rpc.chain_id(&endpoint).await })
            })
            .await?;
        let from = address.to_string();
        let nonce = self
            .raced_quantity(&endpoints, move |rpc, endpoint| {
                let from = from.clone();
                Box::pin(async move { rpc.transaction_count(&endpoint, &from).await })
            })
            .await?;

        let to: Address = intent
            .destination
            .parse()
            .map_err(|e| ProcessorError::Encoding(format!("bad destination address: {e}")))?;
        let method_signature = intent
            .extras
            .get("methodSignature")
            .map(String::as_str)
            .unwrap_or(DEFAULT_METHOD_SIGNATURE);
        let parse_fee = |key: &str| -> Result<u128, ProcessorError> {
            match intent.extras.get(key) {
                Some(value) => value
                    .parse()
                    .map_err(|e| ProcessorError::Encoding(format!("bad {key}: {e}"))),
                None => Ok(0),
            }
        };

        let transaction = Eip1559Transaction {
            chain_id,
            nonce,
            max_priority_fee_per_gas: parse_fee("maxPriorityFeePerGas")?,
            max_fee_per_gas: parse_fee("maxFeePerGas")?,
            gas_limit: intent.gas_limit.unwrap_or(DEFAULT_GAS_LIMIT),
            to,
            value: U256::ZERO,
            data: Bytes::from(abi::call_data(method_signature, &intent.payload)),
        };

        let digest = transaction.signing_digest();
        let signature = self.signer.raw_sign(&digest)?;
        let y_parity = self.signer.find_recovery_id(&signature, &digest)?;
        let raw = format!("0x{}", hex::encode(transaction.into_signed(y_parity, &signature)));

        let rpc = self.rpc.clone();
        self.coordinator
            .submit(endpoints, move |endpoint| {
                let rpc = rpc.clone();
                let raw = raw.clone();
                Box::pin(async move { rpc.send_raw_transaction(&endpoint, &raw).await })
            })
            .await
    }
}

impl ChainProtocol for EthereumProtocol {
    fn chain(&self) -> &'static str {
        "ethereum"
    }

    fn address(&self) -> Result<String, ProcessorError> {
        Ok(self.derive_address()?.to_string())
    }

    fn init(self: Arc<Self>) -> BoxFuture<Result<(), ProcessorError>> {
        // no on-chain bootstrap on the EVM side
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
                        .notify("Fulfillment submitted", &format!("ethereum tx {hash}"));
                    Ok(hash)
                }
                Err(e) => {
                    self.notifier
                        .notify("Fulfillment failed", &format!("ethereum: {e}"));
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keystore::software::SoftwareK256KeyStore;

    fn transaction() -> Eip1559Transaction {
        Eip1559Transaction {
            chain_id: 1,
            nonce: 0,
            max_priority_fee_per_gas: 0,
            max_fee_per_gas: 0,
            gas_limit: 21_000,
            to: Address::from_slice(&[0x11u8; 20]),
            value: U256::ZERO,
            data: Bytes::new(),
        }
    }

    #[test]
    fn unsigned_envelope_matches_reference_encoding() {
        let envelope = transaction().envelope(None);
        assert_eq!(
            hex::encode(envelope),
            "02df018080808252089411111111111111111111111111111111111111118080c0"
        );
    }

    #[test]
    fn signed_envelope_appends_parity_r_s() {
        let mut signature = [0u8; 64];
        signature[31] = 0x01; // r = 1
        signature[63] = 0x02; // s = 2
        let signed = transaction().into_signed(1, &signature);
        let hex = hex::encode(signed);
        assert!(hex.starts_with("02"));
        assert!(hex.ends_with("010102"), "y_parity=1, r=1, s=2 as trailing items");
    }

    #[test]
    fn address_derivation_matches_known_key() {
        // Reference key pair from the EIP-155 example.
        let key = k256::ecdsa::SigningKey::from_slice(&[0x46u8; 32]).unwrap();
        let signer =
            Secp256k1Signer::new(Arc::new(SoftwareK256KeyStore::from_signing_key(key)));
        let public_key = signer.public_key(false).unwrap();
        let hash = keccak256(&public_key[1..]);
        let address = Address::from_slice(&hash[12..]);
        assert_eq!(
            address.to_string().to_lowercase(),
            "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f"
        );
    }
}
