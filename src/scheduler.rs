// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Job Scheduler
//!
//! Turns registered jobs into timed sandbox executions. A job carries a
//! {start, end, interval} window in wall-clock milliseconds; the next slot
//! is aligned to the interval grid shifted by the job's start offset and
//! clamped into the window. Jobs whose window already closed are dropped,
//! and a job is armed at most once per registration.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown; armed
//! executions observe the same token while sleeping toward their slot.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::protocol::JobIdentifier;
use crate::sandbox::Sandbox;

/// Execution window, wall-clock milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSchedule {
    pub start: i64,
    pub end: i64,
    /// Zero or negative means a single occurrence at `start`.
    pub interval: i64,
}

/// A job as handed over by the registration source, script already
/// resolved to source text.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub job: JobIdentifier,
    pub script: String,
    pub schedule: JobSchedule,
}

/// Next execution slot within the window, or `None` once the window has
/// closed. Periodic slots sit on the interval grid shifted by
/// `start % interval`, clamped to `[start, end]`.
pub fn next_execution_time(schedule: &JobSchedule, now: i64) -> Option<i64> {
    if schedule.end < now {
        return None;
    }
    if schedule.interval <= 0 {
        return Some(schedule.start);
    }
    let time_shift = schedule.start % schedule.interval;
    let aligned = (now / schedule.interval + 1) * schedule.interval + time_shift;
    Some(aligned.max(schedule.start).min(schedule.end))
}

/// Whether `next` is the job's final occurrence.
pub fn is_last_occurrence(schedule: &JobSchedule, next: i64) -> bool {
    next + schedule.interval > schedule.end
}

pub struct JobScheduler {
    sandbox: Arc<Sandbox>,
    jobs: mpsc::Receiver<ScheduledJob>,
    armed: HashSet<String>,
}

impl JobScheduler {
    pub fn new(sandbox: Arc<Sandbox>, jobs: mpsc::Receiver<ScheduledJob>) -> Self {
        Self {
            sandbox,
            jobs,
            armed: HashSet::new(),
        }
    }

    /// Run the arming loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(scheduler.run(shutdown.clone()));
    /// ```
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Job scheduler starting");

        loop {
            tokio::select! {
                received = self.jobs.recv() => {
                    match received {
                        Some(job) => self.arm(job, shutdown.clone()),
                        None => {
                            info!("Job source closed, scheduler shutting down");
                            return;
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Job scheduler shutting down");
                    return;
                }
            }
        }
    }

    fn arm_key(job: &ScheduledJob) -> String {
        format!(
            "{}:{}",
            hex::encode(job.job.requester),
            hex::encode(&job.job.script)
        )
    }

    fn arm(&mut self, job: ScheduledJob, shutdown: CancellationToken) {
        let key = Self::arm_key(&job);
        if !self.armed.insert(key.clone()) {
            tracing::debug!(job = %key, "Job already armed, skipping");
            return;
        }

        let now = Utc::now().timestamp_millis();
        if next_execution_time(&job.schedule, now).is_none() {
            warn!(job = %key, "Job window already closed, not arming");
            return;
        }

        let sandbox = self.sandbox.clone();
        tokio::spawn(async move {
            Self::run_occurrences(sandbox, job, shutdown).await;
        });
    }

    /// Sleep toward each slot of the window in turn, executing the script
    /// once per slot until the final occurrence or shutdown.
    async fn run_occurrences(
        sandbox: Arc<Sandbox>,
        job: ScheduledJob,
        shutdown: CancellationToken,
    ) {
        loop {
            let now = Utc::now().timestamp_millis();
            let Some(next) = next_execution_time(&job.schedule, now) else {
                return;
            };
            let is_last = is_last_occurrence(&job.schedule, next);
            let wait = Duration::from_millis(next.saturating_sub(now).max(0) as u64);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.cancelled() => return,
            }

            let result = sandbox
                .execute(Some(job.job.clone()), is_last, job.script.clone())
                .await;
            match result {
                Ok(()) => info!(slot = next, is_last, "Job execution completed"),
                Err(e) => warn!(slot = next, is_last, error = %e, "Job execution failed"),
            }

            if is_last || job.schedule.interval <= 0 {
                return;
            }
        }
    }
}
