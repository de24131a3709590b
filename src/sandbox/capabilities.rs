// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Script Capability Table
//!
//! The fixed set of native functions injected into a script engine:
//! chain fulfillment, per-curve stream encryption, HTTP with certificate
//! fingerprints, attestation, environment lookup and secure randomness.
//! Every argument is validated at the boundary before dispatch; capability
//! failures surface as script runtime errors, never as sandbox crashes.

use std::collections::HashMap;
use std::sync::Arc;

use rand::RngCore;
use rhai::{Dynamic, Engine, EvalAltResult, Map, Module};
use tokio::runtime::Handle;

use crate::crypto::{Curve, Signer};
use crate::error::ProcessorError;
use crate::net::CapabilityHttp;
use crate::protocol::{ChainProtocol, JobIdentifier, TransactionIntent};
use crate::storage::ProcessorStore;

/// Device-integrity evidence provider.
pub trait Attestor: Send + Sync {
    /// Opaque attestation token, hex-encoded.
    fn attest(&self) -> Result<String, ProcessorError>;
}

/// Placeholder for builds without an attestation backend.
pub struct NoAttestor;

impl Attestor for NoAttestor {
    fn attest(&self) -> Result<String, ProcessorError> {
        Err(ProcessorError::ScriptFault(
            "attestation is not available on this build".into(),
        ))
    }
}

/// Native resources the capability table closes over.
pub struct Capabilities {
    pub protocols: HashMap<&'static str, Arc<dyn ChainProtocol>>,
    pub signers: HashMap<Curve, Arc<dyn Signer>>,
    pub http: CapabilityHttp,
    pub store: Arc<ProcessorStore>,
    pub attestor: Arc<dyn Attestor>,
}

fn script_err(e: impl ToString) -> Box<EvalAltResult> {
    e.to_string().into()
}

fn decode_hex(label: &str, value: &str) -> Result<Vec<u8>, Box<EvalAltResult>> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| script_err(format!("bad {label} hex: {e}")))
}

fn string_map(map: &Map) -> HashMap<String, String> {
    map.iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn build_intent(
    rpc: &str,
    destination: &str,
    payload_hex: &str,
    options: &Map,
    job: Option<JobIdentifier>,
) -> Result<TransactionIntent, Box<EvalAltResult>> {
    let mut intent = TransactionIntent::new(destination, decode_hex("payload", payload_hex)?);
    intent.job = job;
    if !rpc.is_empty() {
        intent.extras.insert("rpc".to_owned(), rpc.to_owned());
    }
    for (key, value) in options {
        let limit = || -> Result<u64, Box<EvalAltResult>> {
            value
                .as_int()
                .map(|v| v as u64)
                .map_err(|t| script_err(format!("option {key} must be an integer, got {t}")))
        };
        match key.as_str() {
            "fee" => intent.fee = Some(limit()?),
            "gasLimit" => intent.gas_limit = Some(limit()?),
            "storageLimit" => intent.storage_limit = Some(limit()?),
            _ => {
                intent.extras.insert(key.to_string(), value.to_string());
            }
        }
    }
    Ok(intent)
}

fn chain_module(
    chain: &'static str,
    protocol: Arc<dyn ChainProtocol>,
    handle: Handle,
    job: Option<JobIdentifier>,
) -> Module {
    let mut module = Module::new();
    module.set_native_fn(
        "fulfill",
        move |rpc: &str, destination: &str, payload_hex: &str, options: Map| {
            let intent = build_intent(rpc, destination, payload_hex, &options, job.clone())?;
            tracing::debug!(chain, destination = %intent.destination, "Script fulfillment");
            handle
                .block_on(protocol.clone().fulfill(intent))
                .map_err(script_err)
        },
    );
    module
}

fn signer_module(signer: Arc<dyn Signer>) -> Module {
    let mut module = Module::new();

    let encrypting = signer.clone();
    module.set_native_fn(
        "encrypt",
        move |peer_hex: &str, salt_hex: &str, payload_hex: &str| {
            let sealed = encrypting
                .stream_encrypt(
                    &decode_hex("peer public key", peer_hex)?,
                    &decode_hex("salt", salt_hex)?,
                    &decode_hex("payload", payload_hex)?,
                )
                .map_err(script_err)?;
            Ok(hex::encode(sealed))
        },
    );

    module.set_native_fn(
        "decrypt",
        move |peer_hex: &str, salt_hex: &str, payload_hex: &str| {
            let opened = signer
                .stream_decrypt(
                    &decode_hex("peer public key", peer_hex)?,
                    &decode_hex("salt", salt_hex)?,
                    &decode_hex("payload", payload_hex)?,
                )
                .map_err(script_err)?;
            Ok(hex::encode(opened))
        },
    );
    module
}

/// Install the full capability table on `engine` for one job execution.
pub fn install(
    engine: &mut Engine,
    capabilities: Arc<Capabilities>,
    handle: Handle,
    job: Option<JobIdentifier>,
    job_tag: String,
) {
    // chains::<variant>::fulfill
    let mut chains = Module::new();
    for (chain, protocol) in &capabilities.protocols {
        chains.set_sub_module(
            *chain,
            chain_module(chain, protocol.clone(), handle.clone(), job.clone()),
        );
    }
    engine.register_static_module("chains", chains.into());

    // signers::<curve>::{encrypt, decrypt}
    let mut signers = Module::new();
    for (curve, signer) in &capabilities.signers {
        signers.set_sub_module(curve.name(), signer_module(signer.clone()));
    }
    engine.register_static_module("signers", signers.into());

    // random::generate_secure_random_hex
    let mut random = Module::new();
    random.set_native_fn(
        "generate_secure_random_hex",
        || -> Result<String, Box<EvalAltResult>> {
            let mut bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            Ok(hex::encode(bytes))
        },
    );
    engine.register_static_module("random", random.into());

    let http = capabilities.http.clone();
    let getter = handle.clone();
    engine.register_fn(
        "http_get",
        move |url: &str, headers: Map| -> Result<Map, Box<EvalAltResult>> {
            let response = getter
                .block_on(http.get(url, &string_map(&headers)))
                .map_err(script_err)?;
            let mut out = Map::new();
            out.insert("body".into(), response.body.into());
            out.insert(
                "certificate_fingerprint".into(),
                response
                    .certificate_fingerprint
                    .map(Dynamic::from)
                    .unwrap_or(Dynamic::UNIT),
            );
            Ok(out)
        },
    );

    let http = capabilities.http.clone();
    let poster = handle.clone();
    engine.register_fn(
        "http_post",
        move |url: &str, headers: Map, body: &str| -> Result<Map, Box<EvalAltResult>> {
            let response = poster
                .block_on(http.post(url, &string_map(&headers), body.to_owned()))
                .map_err(script_err)?;
            let mut out = Map::new();
            out.insert("body".into(), response.body.into());
            out.insert(
                "certificate_fingerprint".into(),
                response
                    .certificate_fingerprint
                    .map(Dynamic::from)
                    .unwrap_or(Dynamic::UNIT),
            );
            Ok(out)
        },
    );

    let attestor = capabilities.attestor.clone();
    engine.register_fn("attest", move || -> Result<String, Box<EvalAltResult>> {
        attestor.attest().map_err(script_err)
    });

    let store = capabilities.store.clone();
    engine.register_fn(
        "environment",
        move |key: &str| -> Result<String, Box<EvalAltResult>> {
            Ok(store.environment(key).map_err(script_err)?.unwrap_or_default())
        },
    );

    engine.on_print(move |text| {
        tracing::info!(target: "script", job = %job_tag, "{text}");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_options_split_limits_from_extras() {
        let mut options = Map::new();
        options.insert("fee".into(), Dynamic::from(1450_i64));
        options.insert("gasLimit".into(), Dynamic::from(2000_i64));
        options.insert("entrypoint".into(), "store".into());

        let intent =
            build_intent("https://node.example", "KT1abc", "aabb", &options, None).unwrap();
        assert_eq!(intent.fee, Some(1450));
        assert_eq!(intent.gas_limit, Some(2000));
        assert_eq!(intent.storage_limit, None);
        assert_eq!(intent.payload, vec![0xAA, 0xBB]);
        assert_eq!(intent.extras.get("entrypoint").unwrap(), "store");
        assert_eq!(intent.extras.get("rpc").unwrap(), "https://node.example");
    }

    #[test]
    fn intent_rejects_non_integer_limits() {
        let mut options = Map::new();
        options.insert("fee".into(), "cheap".into());
        assert!(build_intent("", "KT1abc", "", &options, None).is_err());
    }

    #[test]
    fn hex_arguments_accept_an_optional_prefix() {
        assert_eq!(decode_hex("payload", "0xff").unwrap(), vec![0xFF]);
        assert_eq!(decode_hex("payload", "ff").unwrap(), vec![0xFF]);
        assert!(decode_hex("payload", "zz").is_err());
    }
}
