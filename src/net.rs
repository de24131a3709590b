// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Script HTTP Capability
//!
//! Outbound HTTP for sandboxed scripts. Responses carry the SHA-256
//! fingerprint of the server's leaf certificate so scripts can pin the
//! peer they talked to; the body is returned for any status code, only
//! transport failures surface as errors.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::tls::TlsInfo;
use reqwest::Client;

use crate::config::CAPABILITY_HTTP_TIMEOUT;
use crate::crypto::sha256;
use crate::error::ProcessorError;

/// Body plus the certificate fingerprint of the responding server.
#[derive(Debug, Clone)]
pub struct CapabilityResponse {
    pub body: String,
    /// Hex SHA-256 of the peer's DER leaf certificate; absent on plain
    /// HTTP connections.
    pub certificate_fingerprint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CapabilityHttp {
    http: Client,
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, ProcessorError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name: HeaderName = name
            .parse()
            .map_err(|e| ProcessorError::ScriptFault(format!("bad header name {name}: {e}")))?;
        let value: HeaderValue = value
            .parse()
            .map_err(|e| ProcessorError::ScriptFault(format!("bad header value for {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

impl CapabilityHttp {
    pub fn new() -> Result<Self, ProcessorError> {
        let http = Client::builder()
            .timeout(CAPABILITY_HTTP_TIMEOUT)
            .tls_info(true)
            .build()
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?;
        Ok(Self { http })
    }

    pub async fn get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<CapabilityResponse, ProcessorError> {
        let request = self.http.get(url).headers(header_map(headers)?);
        Self::finish(request).await
    }

    pub async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: String,
    ) -> Result<CapabilityResponse, ProcessorError> {
        let request = self.http.post(url).headers(header_map(headers)?).body(body);
        Self::finish(request).await
    }

    async fn finish(
        request: reqwest::RequestBuilder,
    ) -> Result<CapabilityResponse, ProcessorError> {
        let response = request
            .send()
            .await
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?;

        let certificate_fingerprint = response
            .extensions()
            .get::<TlsInfo>()
            .and_then(|tls| tls.peer_certificate())
            .map(|der| hex::encode(sha256(der)));

        let body = response
            .text()
            .await
            .map_err(|e| ProcessorError::NetworkUnreachable(e.to_string()))?;

        Ok(CapabilityResponse {
            body,
            certificate_fingerprint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_header_maps_from_script_input() {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_owned(), "application/json".to_owned());
        headers.insert("X-Job".to_owned(), "42".to_owned());
        let map = header_map(&headers).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("content-type").unwrap(), "application/json");
    }

    #[test]
    fn rejects_malformed_header_names() {
        let mut headers = HashMap::new();
        headers.insert("bad header".to_owned(), "x".to_owned());
        assert!(matches!(
            header_map(&headers),
            Err(ProcessorError::ScriptFault(_))
        ));
    }
}
