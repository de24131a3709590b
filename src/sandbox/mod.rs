// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Script Sandbox
//!
//! Runs one untrusted job script per engine instance on a dedicated
//! blocking worker, with the capability table installed for exactly that
//! job. A wall-clock deadline is enforced through the interpreter's
//! progress hook; expiry terminates evaluation from inside the engine, and
//! the worker is always joined before the execution resolves, so resources
//! are never released while the engine might still touch them.
//!
//! Every execution resolves to exactly one terminal outcome. If the job
//! carries a requester identity, that outcome is also reported back to the
//! account-model chain on a best-effort basis; a failed report is logged
//! and never escalated.

pub mod capabilities;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rhai::{Dynamic, Engine, EvalAltResult};
use tokio::runtime::Handle;

use crate::config::SCRIPT_EXECUTION_DEADLINE;
use crate::error::ProcessorError;
use crate::protocol::acurast::AcurastProtocol;
use crate::protocol::{ExecutionOutcome, JobIdentifier};
use capabilities::Capabilities;

pub struct Sandbox {
    capabilities: Arc<Capabilities>,
    /// Chain that receives fulfillment reports, when configured.
    origin: Option<Arc<AcurastProtocol>>,
    deadline: Duration,
}

impl Sandbox {
    pub fn new(capabilities: Arc<Capabilities>, origin: Option<Arc<AcurastProtocol>>) -> Self {
        Self {
            capabilities,
            origin,
            deadline: SCRIPT_EXECUTION_DEADLINE,
        }
    }

    #[cfg(test)]
    fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Execute `script` for `job`, then report the outcome to the origin
    /// chain if the job names a requester.
    pub async fn execute(
        &self,
        job: Option<JobIdentifier>,
        is_last: bool,
        script: String,
    ) -> Result<(), ProcessorError> {
        let result = self.evaluate(job.clone(), script).await;

        if let (Some(job), Some(origin)) = (&job, &self.origin) {
            let outcome = match &result {
                Ok(()) => ExecutionOutcome::Success(Vec::new()),
                Err(e) => ExecutionOutcome::Failure(e.to_string().into_bytes()),
            };
            if let Err(e) = origin.report(job, is_last, &outcome).await {
                tracing::warn!(error = %e, "Fulfillment report failed");
            }
        }
        result
    }

    /// Run the script to completion on a blocking worker.
    async fn evaluate(
        &self,
        job: Option<JobIdentifier>,
        script: String,
    ) -> Result<(), ProcessorError> {
        let capabilities = self.capabilities.clone();
        let deadline = self.deadline;
        let handle = Handle::current();
        let job_tag = job
            .as_ref()
            .map(|j| hex::encode(&j.requester[..8]))
            .unwrap_or_else(|| "adhoc".to_owned());

        let worker = tokio::task::spawn_blocking(move || {
            let mut engine = Engine::new();
            capabilities::install(&mut engine, capabilities, handle, job, job_tag);

            let started = Instant::now();
            engine.on_progress(move |_| {
                if started.elapsed() > deadline {
                    Some(Dynamic::from("deadline"))
                } else {
                    None
                }
            });

            engine.run(&script)
        });

        match worker.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Self::classify(*e, deadline)),
            Err(e) => Err(ProcessorError::ScriptFault(format!(
                "engine worker failed: {e}"
            ))),
        }
    }

    fn classify(error: EvalAltResult, deadline: Duration) -> ProcessorError {
        match error {
            EvalAltResult::ErrorTerminated(..) => ProcessorError::ExecutionTimeout(deadline),
            other => ProcessorError::ScriptFault(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::crypto::keystore::software::SoftwareP256KeyStore;
    use crate::crypto::{Curve, Secp256r1Signer, Signer};
    use crate::net::CapabilityHttp;
    use crate::storage::ProcessorStore;
    use capabilities::NoAttestor;

    fn sandbox() -> (tempfile::TempDir, Sandbox, Arc<dyn Signer>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ProcessorStore::open(&dir.path().join("state.redb")).unwrap());
        let key = p256::ecdsa::SigningKey::from_slice(&[0x07u8; 32]).unwrap();
        let signer: Arc<dyn Signer> = Arc::new(Secp256r1Signer::new(Arc::new(
            SoftwareP256KeyStore::from_signing_key(key),
        )));

        let mut signers: HashMap<Curve, Arc<dyn Signer>> = HashMap::new();
        signers.insert(Curve::Secp256r1, signer.clone());

        let capabilities = Arc::new(Capabilities {
            protocols: HashMap::new(),
            signers,
            http: CapabilityHttp::new().unwrap(),
            store,
            attestor: Arc::new(NoAttestor),
        });
        (dir, Sandbox::new(capabilities, None), signer)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deadline_exceeded_terminates_with_timeout() {
        let (_dir, sandbox, _) = sandbox();
        let sandbox = sandbox.with_deadline(Duration::from_millis(100));
        let result = sandbox
            .execute(None, false, "while true {}".to_owned())
            .await;
        assert!(matches!(result, Err(ProcessorError::ExecutionTimeout(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn script_faults_surface_through_the_error_channel() {
        let (_dir, sandbox, _) = sandbox();
        let result = sandbox
            .execute(None, false, "no_such_capability()".to_owned())
            .await;
        assert!(matches!(result, Err(ProcessorError::ScriptFault(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn random_capability_yields_32_hex_bytes() {
        let (_dir, sandbox, _) = sandbox();
        let script = r#"
            let value = random::generate_secure_random_hex();
            if value.len() != 64 { throw "unexpected length" }
        "#;
        sandbox.execute(None, false, script.to_owned()).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn environment_capability_reads_persisted_configuration() {
        let (_dir, sandbox, _) = sandbox();
        sandbox
            .capabilities
            .store
            .set_environment("region", "eu-1")
            .unwrap();
        let script = r#"
            if environment("region") != "eu-1" { throw "missing" }
            if environment("absent") != "" { throw "phantom" }
        "#;
        sandbox.execute(None, false, script.to_owned()).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn script_can_round_trip_stream_encryption() {
        let (_dir, sandbox, signer) = sandbox();
        let peer = hex::encode(signer.public_key(true).unwrap());
        sandbox
            .capabilities
            .store
            .set_environment("peer", &peer)
            .unwrap();
        let script = r#"
            let peer = environment("peer");
            let sealed = signers::secp256r1::encrypt(peer, "", "aabbcc");
            if signers::secp256r1::decrypt(peer, "", sealed) != "aabbcc" {
                throw "round trip mismatch"
            }
        "#;
        sandbox.execute(None, false, script.to_owned()).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn attest_failure_is_a_script_fault_not_a_crash() {
        let (_dir, sandbox, _) = sandbox();
        let result = sandbox
            .execute(None, false, "attest()".to_owned())
            .await;
        assert!(matches!(result, Err(ProcessorError::ScriptFault(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn print_is_routed_to_the_diagnostic_sink() {
        let (_dir, sandbox, _) = sandbox();
        sandbox
            .execute(None, false, r#"print("hello")"#.to_owned())
            .await
            .unwrap();
    }
}
