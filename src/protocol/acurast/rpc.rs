// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Account-Model Node RPC
//!
//! JSON-RPC 2.0 client for extrinsic submission: chain head and block
//! hashes, runtime versions, the account's next nonce and the author
//! endpoint. The liveness probe leans on `system_health` since substrate
//! headers carry no wall-clock timestamp.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::config::RPC_TIMEOUT;
use crate::error::ProcessorError;
use crate::gateway::{BoxFuture, HeadProbe};

#[derive(Debug, Clone)]
pub struct AcurastRpc {
    http: Client,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RuntimeVersion {
    #[serde(rename = "specVersion")]
    spec_version: u32,
    #[serde(rename = "transactionVersion")]
    transaction_version: u32,
}

#[derive(Debug, Deserialize)]
struct Health {
    #[serde(rename = "isSyncing")]
    is_syncing: bool,
}

fn parse_hex_u64(value: &Value) -> Result<u64, ProcessorError> {
    let text = value
        .as_str()
        .ok_or_else(|| ProcessorError::Encoding("hex number is not a string".into()))?;
    u64::from_str_radix(text.trim_start_matches("0x"), 16)
        .map_err(|e| ProcessorError::Encoding(format!("bad hex number {text}: {e}")))
}

fn parse_hash(value: &Value) -> Result<[u8; 32], ProcessorError> {
    let text = value
        .as_str()
        .ok_or_else(|| ProcessorError::Encoding("block hash is not a string".into()))?;
    let bytes = hex::decode(text.trim_start_matches("0x"))
        .map_err(|e| ProcessorError::Encoding(format!("bad block hash {text}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| ProcessorError::Encoding(format!("block hash {text} is not 32 bytes")))
}

impl AcurastRpc {
    pub fn new() -> Result<Self, ProcessorError> {
        let http = Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?;
        Ok(Self { http })
    }

    async fn call(
        &self,
        base: &Url,
        method: &str,
        params: Value,
    ) -> Result<Value, ProcessorError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response: RpcResponse = self
            .http
            .post(base.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProcessorError::NetworkUnreachable(format!("bad RPC body: {e}")))?;

        if let Some(error) = response.error {
            return Err(ProcessorError::SubmissionRejected(format!(
                "{method} failed: {}",
                error.message
            )));
        }
        response
            .result
            .ok_or_else(|| ProcessorError::NetworkUnreachable(format!("{method}: empty result")))
    }

    /// Number of the endpoint's current chain head.
    pub async fn header_number(&self, base: &Url) -> Result<u64, ProcessorError> {
        let result = self.call(base, "chain_getHeader", json!([])).await?;
        let number = result
            .get("number")
            .ok_or_else(|| ProcessorError::NetworkUnreachable("header missing number".into()))?;
        parse_hex_u64(number)
    }

    /// Hash of block `number`; block 0 yields the genesis hash.
    pub async fn block_hash(&self, base: &Url, number: u64) -> Result<[u8; 32], ProcessorError> {
        let result = self.call(base, "chain_getBlockHash", json!([number])).await?;
        parse_hash(&result)
    }

    pub async fn runtime_version(
        &self,
        base: &Url,
    ) -> Result<(u32, u32), ProcessorError> {
        let result = self
            .call(base, "state_getRuntimeVersion", json!([]))
            .await?;
        let version: RuntimeVersion = serde_json::from_value(result)
            .map_err(|e| ProcessorError::Encoding(format!("bad runtime version: {e}")))?;
        Ok((version.spec_version, version.transaction_version))
    }

    /// Next nonce the chain expects for `address`, pending pool included.
    pub async fn account_next_index(
        &self,
        base: &Url,
        address: &str,
    ) -> Result<u64, ProcessorError> {
        let result = self
            .call(base, "system_accountNextIndex", json!([address]))
            .await?;
        result
            .as_u64()
            .ok_or_else(|| ProcessorError::Encoding("nonce is not an integer".into()))
    }

    pub async fn submit_extrinsic(
        &self,
        base: &Url,
        extrinsic_hex: &str,
    ) -> Result<String, ProcessorError> {
        let result = self
            .call(base, "author_submitExtrinsic", json!([extrinsic_hex]))
            .await?;
        result
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ProcessorError::SubmissionRejected("missing extrinsic hash".into()))
    }

    pub async fn health(&self, base: &Url) -> Result<bool, ProcessorError> {
        let result = self.call(base, "system_health", json!([])).await?;
        let health: Health = serde_json::from_value(result)
            .map_err(|e| ProcessorError::Encoding(format!("bad health report: {e}")))?;
        Ok(!health.is_syncing)
    }
}

impl HeadProbe for AcurastRpc {
    /// A node reporting itself in sync counts as current; the health report
    /// has no head timestamp to compare against.
    fn head_timestamp(&self, endpoint: Url) -> BoxFuture<Result<DateTime<Utc>, ProcessorError>> {
        let rpc = self.clone();
        Box::pin(async move {
            if rpc.health(&endpoint).await? {
                Ok(Utc::now())
            } else {
                Err(ProcessorError::NetworkUnreachable(format!(
                    "{endpoint} is still syncing"
                )))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_numbers_and_hashes() {
        assert_eq!(parse_hex_u64(&json!("0x1a")).unwrap(), 26);
        assert!(parse_hex_u64(&json!(26)).is_err());

        let hash = parse_hash(&json!(format!("0x{}", "ab".repeat(32)))).unwrap();
        assert_eq!(hash, [0xab; 32]);
        assert!(parse_hash(&json!("0x1234")).is_err());
    }
}
