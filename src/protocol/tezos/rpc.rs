// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # tz-style Node RPC
//!
//! Thin reqwest client over the handful of node endpoints the fulfillment
//! path needs: head header (branch + timestamp), account counter, manager
//! key and operation injection.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::RPC_TIMEOUT;
use crate::error::ProcessorError;
use crate::gateway::{BoxFuture, HeadProbe};

#[derive(Debug, Clone)]
pub struct TezosRpc {
    http: Client,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadHeader {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
}

impl TezosRpc {
    pub fn new() -> Result<Self, ProcessorError> {
        let http = Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?;
        Ok(Self { http })
    }

    fn join(base: &Url, path: &str) -> Result<Url, ProcessorError> {
        base.join(path)
            .map_err(|e| ProcessorError::Encoding(format!("bad RPC path: {e}")))
    }

    pub async fn head_header(&self, base: &Url) -> Result<HeadHeader, ProcessorError> {
        let url = Self::join(base, "chains/main/blocks/head/header")?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| ProcessorError::NetworkUnreachable(format!("bad header body: {e}")))
    }

    /// Last counter consumed by `address`, as tracked by the node.
    pub async fn counter(&self, base: &Url, address: &str) -> Result<u64, ProcessorError> {
        let url = Self::join(
            base,
            &format!("chains/main/blocks/head/context/contracts/{address}/counter"),
        )?;
        let body: String = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProcessorError::NetworkUnreachable(format!("bad counter body: {e}")))?;
        body.parse()
            .map_err(|e| ProcessorError::Encoding(format!("counter is not a number: {e}")))
    }

    /// The revealed manager key of `address`, if any.
    pub async fn manager_key(
        &self,
        base: &Url,
        address: &str,
    ) -> Result<Option<String>, ProcessorError> {
        let url = Self::join(
            base,
            &format!("chains/main/blocks/head/context/contracts/{address}/manager_key"),
        )?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?;
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProcessorError::NetworkUnreachable(format!("bad manager key: {e}")))?;
        Ok(value.as_str().map(str::to_owned))
    }

    /// Inject a signed operation (`forged || signature`, hex) and return
    /// the operation hash.
    pub async fn inject(&self, base: &Url, signed_hex: &str) -> Result<String, ProcessorError> {
        let url = Self::join(base, "injection/operation")?;
        let response = self
            .http
            .post(url)
            .json(&signed_hex)
            .send()
            .await
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?;
        if !status.is_success() {
            return Err(ProcessorError::SubmissionRejected(format!(
                "injection returned {status}: {body}"
            )));
        }
        let hash: String = serde_json::from_str(&body)
            .map_err(|e| ProcessorError::SubmissionRejected(format!("bad injection body: {e}")))?;
        Ok(hash)
    }
}

impl HeadProbe for TezosRpc {
    fn head_timestamp(&self, endpoint: Url) -> BoxFuture<Result<DateTime<Utc>, ProcessorError>> {
        let rpc = self.clone();
        Box::pin(async move {
            let header = rpc.head_header(&endpoint).await?;
            Ok(header.timestamp)
        })
    }
}
