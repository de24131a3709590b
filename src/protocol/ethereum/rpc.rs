// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # EVM Node RPC
//!
//! Minimal JSON-RPC 2.0 client for the submission path: chain id, account
//! nonce, latest block timestamp (liveness probe) and raw transaction
//! submission.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::config::RPC_TIMEOUT;
use crate::error::ProcessorError;
use crate::gateway::{BoxFuture, HeadProbe};

#[derive(Debug, Clone)]
pub struct EthereumRpc {
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

fn parse_quantity(value: &Value) -> Result<u64, ProcessorError> {
    let text = value
        .as_str()
        .ok_or_else(|| ProcessorError::Encoding("quantity is not a string".into()))?;
    u64::from_str_radix(text.trim_start_matches("0x"), 16)
        .map_err(|e| ProcessorError::Encoding(format!("bad quantity {text}: {e}")))
}

impl EthereumRpc {
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

    pub async fn chain_id(&self, base: &Url) -> Result<u64, ProcessorError> {
        let result = self.call(base, "eth_chainId", json!([])).await?;
        parse_quantity(&result)
    }

    /// Next nonce for `address` as of the latest block.
    pub async fn transaction_count(
        &self,
        base: &Url,
        address: &str,
    ) -> Result<u64, ProcessorError> {
        let result = self
            .call(base, "eth_getTransactionCount", json!([address, "latest"]))
            .await?;
        parse_quantity(&result)
    }

    pub async fn send_raw_transaction(
        &self,
        base: &Url,
        raw_hex: &str,
    ) -> Result<String, ProcessorError> {
        let result = self
            .call(base, "eth_sendRawTransaction", json!([raw_hex]))
            .await?;
        result
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ProcessorError::SubmissionRejected("missing transaction hash".into()))
    }

    pub async fn latest_block_timestamp(
        &self,
        base: &Url,
    ) -> Result<DateTime<Utc>, ProcessorError> {
        let result = self
            .call(base, "eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let timestamp = result
            .get("timestamp")
            .ok_or_else(|| ProcessorError::NetworkUnreachable("block missing timestamp".into()))?;
        let seconds = parse_quantity(timestamp)?;
        DateTime::<Utc>::from_timestamp(seconds as i64, 0)
            .ok_or_else(|| ProcessorError::Encoding("block timestamp out of range".into()))
    }
}

impl HeadProbe for EthereumRpc {
    fn head_timestamp(&self, endpoint: Url) -> BoxFuture<Result<DateTime<Utc>, ProcessorError>> {
        let rpc = self.clone();
        Box::pin(async move { rpc.latest_block_timestamp(&endpoint).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_quantities() {
        assert_eq!(parse_quantity(&json!("0x0")).unwrap(), 0);
        assert_eq!(parse_quantity(&json!("0x5208")).unwrap(), 21000);
        assert!(parse_quantity(&json!(12)).is_err());
    }
}
