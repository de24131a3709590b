// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # RPC Node Gateway
//!
//! Keeps the candidate endpoint set per chain, probes liveness/freshness
//! concurrently, draws a random race set of synced endpoints and wraps
//! submission attempts with linear-backoff retry. Racing semantics rely on the
//! [`once::Once`] invoker only; in-flight losers are never cancelled.
//!
//! A probe round fails closed: if no endpoint answers inside the probe
//! window, the round yields `NetworkUnreachable` rather than guessing.

pub mod once;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use tokio::task::JoinSet;
use url::Url;

use crate::config::{
    ENDPOINT_RACE_SET_SIZE, NODE_PROBE_TIMEOUT, NODE_SYNC_THRESHOLD, SUBMISSION_RETRY_ATTEMPTS,
    SUBMISSION_RETRY_BASE_DELAY,
};
use crate::error::ProcessorError;
use once::Once;

/// Boxed future used at the probe/submission seams so callers can spawn
/// heterogeneous chain-specific work.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Chain-specific head query used by the liveness probe.
pub trait HeadProbe: Send + Sync {
    /// Timestamp of the endpoint's current chain head.
    fn head_timestamp(&self, endpoint: Url) -> BoxFuture<Result<DateTime<Utc>, ProcessorError>>;
}

/// A probed endpoint with its observed head age.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: Url,
    pub head_age_secs: u64,
}

pub struct NodeGateway {
    endpoints: Vec<Url>,
}

impl NodeGateway {
    pub fn new(endpoints: Vec<Url>) -> Self {
        Self { endpoints }
    }

    /// Probe every candidate concurrently and keep those whose head
    /// timestamp is within the sync threshold of local wall-clock time.
    pub async fn synced_endpoints(
        &self,
        probe: &dyn HeadProbe,
    ) -> Result<Vec<Endpoint>, ProcessorError> {
        let mut probes = JoinSet::new();
        for url in self.endpoints.iter().cloned() {
            let head = probe.head_timestamp(url.clone());
            probes.spawn(async move {
                match tokio::time::timeout(NODE_PROBE_TIMEOUT, head).await {
                    Ok(Ok(timestamp)) => Some((url, timestamp)),
                    Ok(Err(e)) => {
                        tracing::debug!(endpoint = %url, error = %e, "Head probe failed");
                        None
                    }
                    Err(_) => {
                        tracing::debug!(endpoint = %url, "Head probe timed out");
                        None
                    }
                }
            });
        }

        let now = Utc::now();
        let mut synced = Vec::new();
        while let Some(joined) = probes.join_next().await {
            if let Ok(Some((url, timestamp))) = joined {
                // abs() tolerates endpoints slightly ahead of local time
                let age = (now - timestamp).num_seconds().unsigned_abs();
                if age <= NODE_SYNC_THRESHOLD.as_secs() {
                    synced.push(Endpoint {
                        url,
                        head_age_secs: age,
                    });
                } else {
                    tracing::debug!(endpoint = %url, age_secs = age, "Endpoint behind head");
                }
            }
        }

        if synced.is_empty() {
            return Err(ProcessorError::NetworkUnreachable(
                "no synced endpoint in candidate set".into(),
            ));
        }
        Ok(synced)
    }

    /// Probe, then pick the endpoint set for one logical operation: a
    /// uniformly random draw of at most [`ENDPOINT_RACE_SET_SIZE`] synced
    /// endpoints. The first pick spreads load across the candidate set;
    /// the rest are failover targets for the race.
    pub async fn select_endpoints(&self, probe: &dyn HeadProbe) -> Result<Vec<Url>, ProcessorError> {
        let mut synced = self.synced_endpoints(probe).await?;
        synced.shuffle(&mut rand::thread_rng());
        synced.truncate(ENDPOINT_RACE_SET_SIZE);
        for endpoint in &synced {
            tracing::debug!(endpoint = %endpoint.url, head_age_secs = endpoint.head_age_secs,
                "Endpoint selected");
        }
        Ok(synced.into_iter().map(|e| e.url).collect())
    }
}

/// Race one logical operation across several endpoint-bound futures and
/// return the first success. Later completions are suppressed by the
/// once-only invoker; failures only surface when every task has failed.
pub async fn race_first_ok<T>(
    tasks: Vec<BoxFuture<Result<T, ProcessorError>>>,
) -> Result<T, ProcessorError>
where
    T: Send + 'static,
{
    if tasks.is_empty() {
        return Err(ProcessorError::NetworkUnreachable(
            "no endpoint to race against".into(),
        ));
    }

    let (once, mut winner) = Once::channel();
    let once = Arc::new(once);
    let mut set = JoinSet::new();
    for task in tasks {
        let once = once.clone();
        set.spawn(async move {
            match task.await {
                Ok(value) => {
                    once.deliver(value);
                    None
                }
                Err(e) => Some(e),
            }
        });
    }

    let mut last_error = None;
    loop {
        tokio::select! {
            delivered = &mut winner => {
                let value = delivered.map_err(|_| {
                    ProcessorError::NetworkUnreachable("race delivery channel closed".into())
                })?;
                // Let the losing calls run to completion on their own.
                set.detach_all();
                return Ok(value);
            }
            joined = set.join_next() => {
                match joined {
                    Some(Ok(Some(e))) => last_error = Some(e),
                    Some(_) => {}
                    None => {
                        // All tasks finished; a winning delivery may still
                        // have raced the final join.
                        if let Ok(value) = winner.try_recv() {
                            return Ok(value);
                        }
                        return Err(last_error.unwrap_or_else(|| {
                            ProcessorError::NetworkUnreachable(
                                "every raced endpoint failed".into(),
                            )
                        }));
                    }
                }
            }
        }
    }
}

/// Retry a submission up to the fixed budget with linear backoff
/// (`attempt x base delay`). Non-retryable errors surface immediately.
pub async fn retry_submission<T, F>(mut submit: F) -> Result<T, ProcessorError>
where
    F: FnMut(u32) -> BoxFuture<Result<T, ProcessorError>>,
{
    let mut attempt = 1;
    loop {
        match submit(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < SUBMISSION_RETRY_ATTEMPTS => {
                let delay = SUBMISSION_RETRY_BASE_DELAY * attempt;
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e,
                    "Submission attempt failed, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    struct FixedProbe {
        /// endpoint host -> head timestamp offset from now, seconds in the past
        ages: Vec<(&'static str, i64)>,
        /// hosts that never answer
        hang: Vec<&'static str>,
    }

    impl HeadProbe for FixedProbe {
        fn head_timestamp(
            &self,
            endpoint: Url,
        ) -> BoxFuture<Result<DateTime<Utc>, ProcessorError>> {
            let host = endpoint.host_str().unwrap_or_default().to_owned();
            let age = self
                .ages
                .iter()
                .find(|(h, _)| *h == host)
                .map(|(_, a)| *a);
            let hangs = self.hang.iter().any(|h| *h == host);
            Box::pin(async move {
                if hangs {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                age.map(|a| Utc::now() - chrono::Duration::seconds(a))
                    .ok_or_else(|| ProcessorError::NetworkUnreachable("unknown host".into()))
            })
        }
    }

    fn gateway(hosts: &[&str]) -> NodeGateway {
        NodeGateway::new(
            hosts
                .iter()
                .map(|h| Url::parse(&format!("https://{h}")).unwrap())
                .collect(),
        )
    }

    #[tokio::test]
    async fn stale_and_hanging_endpoints_are_excluded() {
        let probe = FixedProbe {
            ages: vec![("fresh.example", 5), ("stale.example", 600)],
            hang: vec!["dead.example"],
        };
        let gateway = gateway(&["fresh.example", "stale.example", "dead.example"]);
        let synced = gateway.synced_endpoints(&probe).await.unwrap();
        assert_eq!(synced.len(), 1);
        assert_eq!(synced[0].url.host_str(), Some("fresh.example"));
    }

    #[tokio::test]
    async fn selection_only_picks_synced_endpoints() {
        let probe = FixedProbe {
            ages: vec![("one.example", 2), ("two.example", 900)],
            hang: vec![],
        };
        let gateway = gateway(&["one.example", "two.example"]);
        for _ in 0..8 {
            let selected = gateway.select_endpoints(&probe).await.unwrap();
            assert_eq!(selected.len(), 1);
            assert_eq!(selected[0].host_str(), Some("one.example"));
        }
    }

    #[tokio::test]
    async fn selection_caps_the_race_set_and_varies_its_head() {
        let hosts = [
            "a.example",
            "b.example",
            "c.example",
            "d.example",
            "e.example",
        ];
        let probe = FixedProbe {
            ages: hosts.iter().map(|h| (*h, 1)).collect(),
            hang: vec![],
        };
        let gateway = gateway(&hosts);

        let mut first_hosts = std::collections::HashSet::new();
        for _ in 0..32 {
            let selected = gateway.select_endpoints(&probe).await.unwrap();
            assert_eq!(selected.len(), ENDPOINT_RACE_SET_SIZE);
            for url in &selected {
                assert!(hosts.contains(&url.host_str().unwrap()));
            }
            first_hosts.insert(selected[0].host_str().unwrap().to_owned());
        }
        // a uniform draw over five candidates does not pin the first slot
        assert!(first_hosts.len() > 1);
    }

    #[tokio::test]
    async fn probe_round_fails_closed() {
        let probe = FixedProbe {
            ages: vec![],
            hang: vec!["dead.example"],
        };
        let gateway = gateway(&["dead.example"]);
        assert!(matches!(
            gateway.synced_endpoints(&probe).await,
            Err(ProcessorError::NetworkUnreachable(_))
        ));
    }

    #[tokio::test]
    async fn race_returns_first_success_and_suppresses_the_rest() {
        let tasks: Vec<BoxFuture<Result<u32, ProcessorError>>> = vec![
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(1)
            }),
            Box::pin(async { Ok(2) }),
            Box::pin(async {
                Err(ProcessorError::SubmissionRejected("rejected".into()))
            }),
        ];
        assert_eq!(race_first_ok(tasks).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn race_surfaces_error_when_all_fail() {
        let tasks: Vec<BoxFuture<Result<u32, ProcessorError>>> = vec![
            Box::pin(async { Err(ProcessorError::SubmissionRejected("a".into())) }),
            Box::pin(async { Err(ProcessorError::SubmissionRejected("b".into())) }),
        ];
        assert!(matches!(
            race_first_ok(tasks).await,
            Err(ProcessorError::SubmissionRejected(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn submission_retries_with_linear_backoff_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let result = retry_submission(move |_attempt| {
            let calls = counted.clone();
            Box::pin(async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProcessorError::SubmissionRejected("busy".into()))
                } else {
                    Ok("op-hash".to_owned())
                }
            }) as BoxFuture<Result<String, ProcessorError>>
        })
        .await;
        assert_eq!(result.unwrap(), "op-hash");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_surfaces_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let result: Result<(), _> = retry_submission(move |_| {
            let calls = counted.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProcessorError::NetworkUnreachable("down".into()))
            }) as BoxFuture<Result<(), ProcessorError>>
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
