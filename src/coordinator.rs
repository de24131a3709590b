// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Submission Coordinator
//!
//! Owns the hot-path state around a chain submission: the persisted account
//! counter with its freshness window, the bootstrap ("revealed") flag, and
//! the race-then-retry composition of endpoint submissions.
//!
//! Counter discipline is single-writer: all reads and bumps go through one
//! async mutex so two concurrent submissions can never compute the same
//! next counter. A cache younger than the freshness window is bumped
//! locally without any network read; anything older is re-fetched and the
//! fetched value persisted with its timestamp.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use url::Url;

use crate::config::COUNTER_FRESHNESS_WINDOW;
use crate::error::ProcessorError;
use crate::gateway::{race_first_ok, retry_submission, BoxFuture};
use crate::storage::{CounterCache, ProcessorStore};

pub struct SubmissionCoordinator {
    store: Arc<ProcessorStore>,
    counter_lock: Mutex<()>,
}

impl SubmissionCoordinator {
    pub fn new(store: Arc<ProcessorStore>) -> Self {
        Self {
            store,
            counter_lock: Mutex::new(()),
        }
    }

    /// Next account counter to use for a submission on `chain`.
    ///
    /// `fetch` must resolve to the next counter the chain expects; it is
    /// awaited only when the local cache is missing or stale. A fresh cache
    /// hands out the last persisted value plus one.
    pub async fn next_counter<F>(&self, chain: &str, fetch: F) -> Result<u64, ProcessorError>
    where
        F: Future<Output = Result<u64, ProcessorError>>,
    {
        let _guard = self.counter_lock.lock().await;

        let now = Utc::now().timestamp_millis();
        if let Some(cache) = self.store.counter(chain)? {
            let age = now.saturating_sub(cache.fetched_at);
            if age >= 0 && (age as u128) < COUNTER_FRESHNESS_WINDOW.as_millis() {
                let next = cache.counter + 1;
                self.store.set_counter(
                    chain,
                    CounterCache {
                        counter: next,
                        fetched_at: now,
                    },
                )?;
                tracing::debug!(chain, counter = next, "Counter served from fresh cache");
                return Ok(next);
            }
        }

        let next = fetch.await?;
        self.store.set_counter(
            chain,
            CounterCache {
                counter: next,
                fetched_at: now,
            },
        )?;
        tracing::debug!(chain, counter = next, "Counter refreshed from network");
        Ok(next)
    }

    /// Whether the one-time bootstrap for `flag` was already observed.
    pub fn is_bootstrapped(&self, flag: &str) -> Result<bool, ProcessorError> {
        Ok(self.store.flag(flag)?)
    }

    /// Record a confirmed bootstrap observation so later submissions skip
    /// the network check entirely.
    pub fn record_bootstrapped(&self, flag: &str) -> Result<(), ProcessorError> {
        self.store.set_flag(flag, true)?;
        Ok(())
    }

    /// Submit one logical transaction: each attempt races `build`-produced
    /// submissions across all given endpoints, the attempt budget applies
    /// linear backoff on rejection.
    pub async fn submit<F>(
        &self,
        endpoints: Vec<Url>,
        build: F,
    ) -> Result<String, ProcessorError>
    where
        F: Fn(Url) -> BoxFuture<Result<String, ProcessorError>> + Send + Sync,
    {
        retry_submission(|attempt| {
            let tasks: Vec<BoxFuture<Result<String, ProcessorError>>> =
                endpoints.iter().cloned().map(&build).collect();
            tracing::debug!(attempt, endpoints = tasks.len(), "Racing submission round");
            Box::pin(race_first_ok(tasks))
        })
        .await
    }
}
