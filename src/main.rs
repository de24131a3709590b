// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

mod config;
mod coordinator;
mod crypto;
mod error;
mod gateway;
mod net;
mod notify;
mod protocol;
mod sandbox;
mod scheduler;
mod state;
mod storage;

#[cfg(not(test))]
use std::{env, path::PathBuf, sync::Arc};

#[cfg(not(test))]
use tokio_util::sync::CancellationToken;

#[cfg(not(test))]
use protocol::acurast::AcurastProtocol;
#[cfg(not(test))]
use scheduler::JobScheduler;
#[cfg(not(test))]
use state::ProcessorContext;

#[cfg(not(test))]
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(not(test))]
fn load_wrap_key() -> [u8; 32] {
    let hex_key =
        env::var(config::KEY_WRAP_SECRET_ENV).expect("KEY_WRAP_SECRET must be set");
    let bytes = hex::decode(hex_key.trim()).expect("KEY_WRAP_SECRET must be hex");
    bytes
        .try_into()
        .expect("KEY_WRAP_SECRET must be exactly 32 bytes")
}

/// Periodic on-chain liveness signal toward the origin chain.
#[cfg(not(test))]
async fn heartbeat_loop(origin: Arc<AcurastProtocol>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config::HEARTBEAT_INTERVAL) => {}
            _ = shutdown.cancelled() => return,
        }
        match origin.heartbeat().await {
            Ok(hash) => tracing::info!(extrinsic = %hash, "Heartbeat submitted"),
            Err(e) => tracing::warn!(error = %e, "Heartbeat failed"),
        }
    }
}

#[cfg(not(test))]
#[tokio::main]
async fn main() {
    init_tracing();

    let data_dir = PathBuf::from(
        env::var(config::DATA_DIR_ENV).unwrap_or_else(|_| config::DEFAULT_DATA_DIR.to_owned()),
    );
    let wrap_key = load_wrap_key();

    let context = Arc::new(
        ProcessorContext::bootstrap(&data_dir, &wrap_key)
            .expect("Failed to bootstrap processor context"),
    );
    context.init_protocols().await;

    let sandbox = Arc::new(context.sandbox().expect("Failed to build sandbox"));
    let (job_source, job_feed) = tokio::sync::mpsc::channel(64);
    let scheduler = JobScheduler::new(sandbox, job_feed);

    let shutdown = CancellationToken::new();
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    if let Some(origin) = context.origin.clone() {
        tokio::spawn(heartbeat_loop(origin, shutdown.clone()));
    }

    // Job registrations arrive through this sender; the content-addressed
    // fetch layer that feeds it lives outside this process core. Dropping
    // it would close the scheduler, so it is held for the process lifetime.
    let _job_source: tokio::sync::mpsc::Sender<scheduler::ScheduledJob> = job_source;

    tracing::info!(data_dir = %data_dir.display(), "Attested processor running");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
    let _ = scheduler_handle.await;
}
