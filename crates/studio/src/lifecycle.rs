use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::StudioConfig;
use crate::jobs::{JobRecord, JobStatus, JobStore, StoreError};
use crate::runner::{JobRunner, RunnerReport, RunnerStatus};

/// Error text attached to jobs whose deadline passed.
pub const TIMEOUT_REASON: &str = "timeout";

/// What the runner (or the clock) said about a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    /// The runner accepted the job under `runner_job_id`.
    Acknowledged { runner_job_id: String },
    /// The runner is still working on it.
    Pending,
    Succeeded { result: String },
    Failed { reason: String },
    /// The job's deadline elapsed without a terminal answer.
    TimedOut,
}

impl Signal {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Signal::Succeeded { .. } | Signal::Failed { .. } | Signal::TimedOut
        )
    }

    /// Map a poll answer onto a signal.
    pub fn from_report(report: RunnerReport) -> Self {
        match report.status {
            RunnerStatus::Queued | RunnerStatus::Processing => Signal::Pending,
            RunnerStatus::Completed => match report.result {
                Some(result) => Signal::Succeeded { result },
                None => Signal::Failed {
                    reason: "runner reported completion without a result".to_string(),
                },
            },
            RunnerStatus::Failed => Signal::Failed {
                reason: report
                    .error
                    .unwrap_or_else(|| "runner reported a failure".to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job {id} is already {status}")]
    AlreadyTerminal { id: String, status: JobStatus },
    #[error("job {id} cannot go from {from} to {to}")]
    Invalid {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Apply a signal to a record, moving its status forward.
///
/// Returns the statuses the record entered, in order (empty when nothing
/// changed). A failure reported while the job is still queued passes
/// through `processing` so the status history never skips a step. On error
/// the record is left untouched.
pub fn apply_signal(
    record: &mut JobRecord,
    signal: &Signal,
    now: DateTime<Utc>,
) -> Result<Vec<JobStatus>, TransitionError> {
    if record.status.is_terminal() {
        return Err(TransitionError::AlreadyTerminal {
            id: record.id.clone(),
            status: record.status,
        });
    }

    match (record.status, signal) {
        (_, Signal::Pending) => Ok(Vec::new()),

        (JobStatus::Queued, Signal::Acknowledged { runner_job_id }) => {
            record.runner_job_id = Some(runner_job_id.clone());
            start(record, now);
            Ok(vec![JobStatus::Processing])
        }
        (_, Signal::Acknowledged { .. }) => Err(invalid(record, JobStatus::Processing)),

        (JobStatus::Processing, Signal::Succeeded { result }) => {
            record.result = Some(result.clone());
            record.error = None;
            finish(record, JobStatus::Completed, now);
            Ok(vec![JobStatus::Completed])
        }
        (_, Signal::Succeeded { .. }) => Err(invalid(record, JobStatus::Completed)),

        (status, Signal::Failed { .. } | Signal::TimedOut) => {
            let reason = match signal {
                Signal::Failed { reason } => reason.clone(),
                _ => TIMEOUT_REASON.to_string(),
            };
            let mut entered = Vec::with_capacity(2);
            if status == JobStatus::Queued {
                start(record, now);
                entered.push(JobStatus::Processing);
            }
            record.result = None;
            record.error = Some(reason);
            finish(record, JobStatus::Failed, now);
            entered.push(JobStatus::Failed);
            Ok(entered)
        }
    }
}

fn invalid(record: &JobRecord, to: JobStatus) -> TransitionError {
    TransitionError::Invalid {
        id: record.id.clone(),
        from: record.status,
        to,
    }
}

fn start(record: &mut JobRecord, now: DateTime<Utc>) {
    record.status = JobStatus::Processing;
    record.started_at = Some(now);
}

fn finish(record: &mut JobRecord, status: JobStatus, now: DateTime<Utc>) {
    record.status = status;
    record.finished_at = Some(now);
}

/// Polling cadence and deadline for one job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// Per-job deadline, counted from the moment the job enters `processing`.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            multiplier: 1.5,
            timeout: Duration::from_secs(900),
        }
    }
}

impl PollPolicy {
    pub fn from_config(config: &StudioConfig) -> Self {
        Self {
            initial_interval: Duration::from_millis(config.poll_initial_ms),
            max_interval: Duration::from_millis(config.poll_max_ms),
            multiplier: config.poll_multiplier,
            timeout: Duration::from_secs(config.job_timeout_secs),
        }
    }

    /// Wait times between consecutive polls of one job.
    pub fn intervals(&self) -> Backoff {
        Backoff {
            next: self.initial_interval.min(self.max_interval),
            max: self.max_interval,
            multiplier: if self.multiplier.is_finite() {
                self.multiplier.max(1.0)
            } else {
                1.0
            },
        }
    }

    /// Whether a job that started processing at `started_at` is past its deadline.
    pub fn deadline_passed(&self, started_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        // Timeouts too large for chrono never elapse.
        chrono::Duration::from_std(self.timeout)
            .ok()
            .and_then(|timeout| started_at.checked_add_signed(timeout))
            .map(|deadline| now >= deadline)
            .unwrap_or(false)
    }
}

/// Non-decreasing sequence of poll intervals, capped at the policy maximum.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        let grown = Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max);
        self.next = grown.max(current).min(self.max);
        Some(current)
    }
}

/// Result of one [`StatusDriver::advance`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    pub record: JobRecord,
    /// Statuses entered during this step, in order.
    pub entered: Vec<JobStatus>,
}

#[derive(Debug, Error)]
pub enum AdvanceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Drives jobs through their lifecycle by talking to a [`JobRunner`].
#[derive(Clone)]
pub struct StatusDriver {
    runner: Arc<dyn JobRunner>,
    policy: PollPolicy,
}

impl StatusDriver {
    pub fn new(runner: Arc<dyn JobRunner>, policy: PollPolicy) -> Self {
        Self { runner, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn runner(&self) -> &Arc<dyn JobRunner> {
        &self.runner
    }

    /// Hand a queued job to the runner. Submissions that outlive the job
    /// timeout count as timed out.
    pub async fn dispatch(&self, record: &JobRecord) -> Signal {
        let submit = self.runner.submit(record.kind, &record.parameters);
        match tokio::time::timeout(self.policy.timeout, submit).await {
            Ok(Ok(runner_job_id)) => Signal::Acknowledged { runner_job_id },
            Ok(Err(e)) => {
                warn!("Runner rejected job {}: {}", record.id_prefix(), e);
                Signal::Failed {
                    reason: e.to_string(),
                }
            }
            Err(_) => Signal::TimedOut,
        }
    }

    /// Ask the runner about a processing job.
    pub async fn check(&self, record: &JobRecord) -> Signal {
        let Some(runner_job_id) = record.runner_job_id.as_deref() else {
            return Signal::Failed {
                reason: "job has no runner id".to_string(),
            };
        };

        match self.runner.poll(runner_job_id).await {
            Ok(report) => Signal::from_report(report),
            Err(e) => {
                warn!("Polling job {} failed: {}", record.id_prefix(), e);
                Signal::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Work out the next signal for a non-terminal record at time `now`.
    pub async fn next_signal(&self, record: &JobRecord, now: DateTime<Utc>) -> Signal {
        match record.status {
            JobStatus::Queued => self.dispatch(record).await,
            JobStatus::Processing => {
                let started_at = record.started_at.unwrap_or(record.created_at);
                if self.policy.deadline_passed(started_at, now) {
                    Signal::TimedOut
                } else {
                    self.check(record).await
                }
            }
            JobStatus::Completed | JobStatus::Failed => Signal::Pending,
        }
    }

    /// Move a job one step along its lifecycle.
    ///
    /// Terminal jobs are returned unchanged without contacting the runner.
    pub async fn advance(&self, store: &mut JobStore, job_id: &str) -> Result<Advance, AdvanceError> {
        self.advance_at(store, job_id, Utc::now()).await
    }

    /// [`StatusDriver::advance`] with an explicit clock reading.
    pub async fn advance_at(
        &self,
        store: &mut JobStore,
        job_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Advance, AdvanceError> {
        let snapshot = store
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownJob(job_id.to_string()))?;

        if snapshot.status.is_terminal() {
            debug!("Job {} is already {}", snapshot.id_prefix(), snapshot.status);
            return Ok(Advance {
                record: snapshot,
                entered: Vec::new(),
            });
        }

        let signal = self.next_signal(&snapshot, now).await;
        let (record, entered) = store.update(job_id, |record| {
            apply_signal(record, &signal, now).map(|entered| (record.clone(), entered))
        })??;

        for status in &entered {
            info!("Job {} is now {}", record.id_prefix(), status);
        }
        Ok(Advance { record, entered })
    }
}
