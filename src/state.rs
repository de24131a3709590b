// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Processor Context
//!
//! Everything with process lifetime, constructed once at startup and handed
//! to the components that need chain access: the replay-state store, the
//! per-curve signers over their key stores, one protocol instance per
//! configured chain and the submission coordinator. There is no ambient
//! global state; anything needing these resources receives the context.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use url::Url;

use crate::config;
use crate::coordinator::SubmissionCoordinator;
use crate::crypto::keystore::software::{SoftwareK256KeyStore, SoftwareP256KeyStore};
use crate::crypto::{Curve, Secp256k1Signer, Secp256r1Signer, Signer};
use crate::error::ProcessorError;
use crate::gateway::NodeGateway;
use crate::net::CapabilityHttp;
use crate::notify::{LogNotifier, Notifier};
use crate::protocol::acurast::AcurastProtocol;
use crate::protocol::ethereum::EthereumProtocol;
use crate::protocol::tezos::TezosProtocol;
use crate::protocol::ChainProtocol;
use crate::sandbox::capabilities::{Attestor, Capabilities, NoAttestor};
use crate::sandbox::Sandbox;
use crate::storage::ProcessorStore;

pub struct ProcessorContext {
    pub store: Arc<ProcessorStore>,
    pub coordinator: Arc<SubmissionCoordinator>,
    pub notifier: Arc<dyn Notifier>,
    pub signers: HashMap<Curve, Arc<dyn Signer>>,
    pub protocols: HashMap<&'static str, Arc<dyn ChainProtocol>>,
    /// The account-model chain doubling as the job origin, when configured.
    pub origin: Option<Arc<AcurastProtocol>>,
    pub attestor: Arc<dyn Attestor>,
}

fn parse_urls(raw: Vec<String>) -> Result<Vec<Url>, ProcessorError> {
    raw.into_iter()
        .map(|url| {
            Url::parse(&url)
                .map_err(|e| ProcessorError::Encoding(format!("bad RPC url {url}: {e}")))
        })
        .collect()
}

impl ProcessorContext {
    /// Open the store, load (or create) the per-curve identities and build
    /// one protocol per chain with configured endpoints.
    pub fn bootstrap(data_dir: &Path, wrap_key: &[u8; 32]) -> Result<Self, ProcessorError> {
        let store = Arc::new(ProcessorStore::open(&data_dir.join("state.redb"))?);
        let coordinator = Arc::new(SubmissionCoordinator::new(store.clone()));
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

        let secp256r1 = Arc::new(Secp256r1Signer::new(Arc::new(
            SoftwareP256KeyStore::load_or_generate(&store, wrap_key)?,
        )));
        let secp256k1 = Arc::new(Secp256k1Signer::new(Arc::new(
            SoftwareK256KeyStore::load_or_generate(&store, wrap_key)?,
        )));

        let mut signers: HashMap<Curve, Arc<dyn Signer>> = HashMap::new();
        signers.insert(Curve::Secp256r1, secp256r1.clone());
        signers.insert(Curve::Secp256k1, secp256k1.clone());

        let mut protocols: HashMap<&'static str, Arc<dyn ChainProtocol>> = HashMap::new();
        let mut origin = None;

        let acurast_urls = parse_urls(config::rpc_urls_from_env(config::ACURAST_RPC_URLS_ENV))?;
        if !acurast_urls.is_empty() {
            let protocol = Arc::new(AcurastProtocol::new(
                secp256r1.clone(),
                NodeGateway::new(acurast_urls),
                coordinator.clone(),
                notifier.clone(),
            )?);
            origin = Some(protocol.clone());
            protocols.insert("acurast", protocol);
        }

        let ethereum_urls = parse_urls(config::rpc_urls_from_env(config::ETHEREUM_RPC_URLS_ENV))?;
        if !ethereum_urls.is_empty() {
            protocols.insert(
                "ethereum",
                Arc::new(EthereumProtocol::new(
                    secp256k1,
                    NodeGateway::new(ethereum_urls),
                    coordinator.clone(),
                    notifier.clone(),
                )?),
            );
        }

        let tezos_urls = parse_urls(config::rpc_urls_from_env(config::TEZOS_RPC_URLS_ENV))?;
        if !tezos_urls.is_empty() {
            protocols.insert(
                "tezos",
                Arc::new(TezosProtocol::new(
                    secp256r1,
                    NodeGateway::new(tezos_urls),
                    coordinator.clone(),
                    notifier.clone(),
                )?),
            );
        }

        Ok(Self {
            store,
            coordinator,
            notifier,
            signers,
            protocols,
            origin,
            attestor: Arc::new(NoAttestor),
        })
    }

    /// Run each chain's one-time bootstrap. A failing chain is logged and
    /// retried implicitly on its next submission; it never blocks startup.
    pub async fn init_protocols(&self) {
        for (chain, protocol) in &self.protocols {
            match protocol.clone().init().await {
                Ok(()) => {
                    if let Ok(address) = protocol.address() {
                        tracing::info!(chain, address, "Chain protocol ready");
                    }
                }
                Err(e) => tracing::warn!(chain, error = %e, "Chain bootstrap failed"),
            }
        }
    }

    /// Sandbox wired to this context's capability table.
    pub fn sandbox(&self) -> Result<Sandbox, ProcessorError> {
        let capabilities = Arc::new(Capabilities {
            protocols: self.protocols.clone(),
            signers: self.signers.clone(),
            http: CapabilityHttp::new()?,
            store: self.store.clone(),
            attestor: self.attestor.clone(),
        });
        Ok(Sandbox::new(capabilities, self.origin.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_without_chain_endpoints_still_yields_identities() {
        let dir = tempfile::tempdir().unwrap();
        let context = ProcessorContext::bootstrap(dir.path(), &[3u8; 32]).unwrap();
        assert!(context.protocols.is_empty());
        assert!(context.origin.is_none());
        assert_eq!(context.signers.len(), 2);

        // same sealed identities on a second bootstrap
        let again = ProcessorContext::bootstrap(dir.path(), &[3u8; 32]).unwrap();
        assert_eq!(
            context.signers[&Curve::Secp256r1].public_key(true).unwrap(),
            again.signers[&Curve::Secp256r1].public_key(true).unwrap()
        );
    }

    #[test]
    fn rejects_malformed_endpoint_urls() {
        assert!(parse_urls(vec!["not a url".into()]).is_err());
    }
}
