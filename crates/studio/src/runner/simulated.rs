use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{JobRunner, RunnerError, RunnerReport};
use crate::jobs::{new_job_id, JobKind};
use crate::params::JobParameters;

/// Placeholder artifact handed back for every finished simulated job.
pub const PLACEHOLDER_RESULT_URL: &str = "https://example.com/video.mp4";

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Complete,
    Fail,
}

#[derive(Debug)]
struct SimulatedJob {
    polls: u32,
}

/// In-memory runner for demos and tests.
///
/// Every job is accepted, reports `processing` until it has been polled
/// `polls_to_complete` times, and then finishes with the placeholder URL.
#[derive(Debug)]
pub struct SimulatedRunner {
    polls_to_complete: u32,
    outcome: Outcome,
    failure_message: String,
    result_url: String,
    submitted: AtomicU64,
    jobs: Mutex<HashMap<String, SimulatedJob>>,
}

impl SimulatedRunner {
    pub fn new(polls_to_complete: u32) -> Self {
        Self {
            polls_to_complete: polls_to_complete.max(1),
            outcome: Outcome::Complete,
            failure_message: String::new(),
            result_url: PLACEHOLDER_RESULT_URL.to_string(),
            submitted: AtomicU64::new(0),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Make every job fail with `message` instead of completing.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.outcome = Outcome::Fail;
        self.failure_message = message.into();
        self
    }

    pub fn with_result_url(mut self, url: impl Into<String>) -> Self {
        self.result_url = url.into();
        self
    }

    /// Number of jobs accepted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, SimulatedJob>> {
        // The map holds plain counters, so a poisoned lock is still usable.
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SimulatedRunner {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl JobRunner for SimulatedRunner {
    async fn submit(&self, kind: JobKind, _parameters: &JobParameters) -> Result<String, RunnerError> {
        let runner_job_id = format!("sim-{}", new_job_id());
        self.jobs().insert(runner_job_id.clone(), SimulatedJob { polls: 0 });
        self.submitted.fetch_add(1, Ordering::SeqCst);
        debug!("Simulated runner accepted {} job as {}", kind, runner_job_id);
        Ok(runner_job_id)
    }

    async fn poll(&self, runner_job_id: &str) -> Result<RunnerReport, RunnerError> {
        let mut jobs = self.jobs();
        let job = jobs
            .get_mut(runner_job_id)
            .ok_or_else(|| RunnerError::UnknownJob(runner_job_id.to_string()))?;

        job.polls = job.polls.saturating_add(1);
        if job.polls < self.polls_to_complete {
            return Ok(RunnerReport::processing());
        }

        Ok(match self.outcome {
            Outcome::Complete => RunnerReport::completed(self.result_url.clone()),
            Outcome::Fail => RunnerReport::failed(self.failure_message.clone()),
        })
    }
}
