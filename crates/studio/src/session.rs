use anyhow::Context;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::activity::ActivityLog;
use crate::config::{RunnerBackend, StudioConfig};
use crate::jobs::{JobKind, JobRecord, JobStatus, JobStore, StoreError};
use crate::lifecycle::{apply_signal, AdvanceError, PollPolicy, StatusDriver, TransitionError};
use crate::params::JobParameters;
use crate::poller::{spawn_poller, JobUpdate};
use crate::runner::{HttpRunner, JobRunner, SimulatedRunner};
use crate::submit::{self, ValidationError};
use crate::view::{self, Action, Command, ViewModel};

const UPDATE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("job {0} is driven by a background poller")]
    Tracked(String),
    #[error("job {0} stopped before reaching a terminal status")]
    Stalled(String),
    #[error("failed to serialize activity log: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<AdvanceError> for SessionError {
    fn from(e: AdvanceError) -> Self {
        match e {
            AdvanceError::Store(e) => SessionError::Store(e),
            AdvanceError::Transition(e) => SessionError::Transition(e),
        }
    }
}

/// What executing a [`Command`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Submitted(JobRecord),
    Cleared(usize),
    Download { job_id: String, url: String },
    Logs(String),
    Rejected(String),
}

/// One user's working session: the job store, the pollers driving its
/// jobs and the activity log.
///
/// The session is the only writer of the store. Pollers report through a
/// channel and their updates are applied by [`Session::pump`] or
/// [`Session::next_update`].
pub struct Session {
    store: JobStore,
    driver: StatusDriver,
    pollers: HashMap<String, JoinHandle<()>>,
    updates_tx: mpsc::Sender<JobUpdate>,
    updates_rx: mpsc::Receiver<JobUpdate>,
    activity: ActivityLog,
}

impl Session {
    pub fn new(runner: Arc<dyn JobRunner>, policy: PollPolicy, activity_capacity: usize) -> Self {
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            store: JobStore::new(),
            driver: StatusDriver::new(runner, policy),
            pollers: HashMap::new(),
            updates_tx,
            updates_rx,
            activity: ActivityLog::new(activity_capacity),
        }
    }

    pub fn from_config(config: &StudioConfig) -> anyhow::Result<Self> {
        let runner: Arc<dyn JobRunner> = match config.runner {
            RunnerBackend::Simulated => {
                Arc::new(SimulatedRunner::new(config.simulated_polls_to_complete))
            }
            RunnerBackend::Http => {
                let url = config
                    .runner_url
                    .as_deref()
                    .context("runner_url is required for the http runner")?;
                let runner = HttpRunner::new(url, Duration::from_secs(config.request_timeout_secs))
                    .context("Failed to build HTTP runner")?;
                info!("Using HTTP runner at {}", runner.base_url());
                Arc::new(runner)
            }
        };

        Ok(Self::new(
            runner,
            PollPolicy::from_config(config),
            config.activity_log_capacity,
        ))
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn driver(&self) -> &StatusDriver {
        &self.driver
    }

    pub fn render(&self) -> ViewModel {
        view::render(&self.store)
    }

    /// Whether a live poller currently owns the job.
    pub fn is_tracked(&self, job_id: &str) -> bool {
        self.pollers
            .get(job_id)
            .map_or(false, |handle| !handle.is_finished())
    }

    pub fn tracked_count(&self) -> usize {
        self.pollers.values().filter(|h| !h.is_finished()).count()
    }

    /// Validate and store a new queued job. Nothing is sent to the runner.
    pub fn submit(
        &mut self,
        kind: JobKind,
        parameters: JobParameters,
    ) -> Result<JobRecord, SessionError> {
        let record = submit::submit(&mut self.store, kind, parameters)?;
        self.activity.record(
            Some(&record.id),
            format!("Job submitted: {}", record.id_prefix()),
        );
        Ok(record)
    }

    /// Submit a job and start a background poller for it.
    pub fn submit_and_track(
        &mut self,
        kind: JobKind,
        parameters: JobParameters,
    ) -> Result<JobRecord, SessionError> {
        let record = self.submit(kind, parameters)?;
        self.track(&record.id)?;
        Ok(record)
    }

    /// Start a poller for a job unless it is finished or already tracked.
    pub fn track(&mut self, id_or_prefix: &str) -> Result<(), SessionError> {
        let record = self.store.find(id_or_prefix)?.clone();
        if record.status.is_terminal() || self.is_tracked(&record.id) {
            return Ok(());
        }

        debug!("Tracking job {}", record.id_prefix());
        let id = record.id.clone();
        let handle = spawn_poller(self.driver.clone(), record, self.updates_tx.clone());
        self.pollers.insert(id, handle);
        Ok(())
    }

    /// Move an untracked job one step along its lifecycle.
    pub async fn advance(&mut self, id_or_prefix: &str) -> Result<JobRecord, SessionError> {
        let id = self.store.find(id_or_prefix)?.id.clone();
        if self.is_tracked(&id) {
            return Err(SessionError::Tracked(id));
        }

        let advance = self.driver.advance(&mut self.store, &id).await?;
        for status in &advance.entered {
            self.log_transition(&advance.record, *status);
        }
        Ok(advance.record)
    }

    /// Apply one poller update to the store.
    ///
    /// Updates for jobs that no longer exist, or that already finished, are
    /// dropped and yield `None`.
    pub fn apply_update(&mut self, update: JobUpdate) -> Result<Option<JobRecord>, SessionError> {
        let JobUpdate { job_id, signal } = update;
        let now = Utc::now();

        let applied = match self
            .store
            .update(&job_id, |record| apply_signal(record, &signal, now).map(|e| (record.clone(), e)))
        {
            Ok(applied) => applied,
            Err(StoreError::UnknownJob(_)) => {
                debug!("Dropping update for removed job {}", job_id);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let (record, entered) = match applied {
            Ok(applied) => applied,
            Err(TransitionError::AlreadyTerminal { .. }) => {
                debug!("Dropping stale update for job {}", job_id);
                return Ok(None);
            }
            Err(e) => {
                warn!("Rejected update for job {}: {}", job_id, e);
                return Err(e.into());
            }
        };

        for status in &entered {
            self.log_transition(&record, *status);
        }
        if record.status.is_terminal() {
            self.pollers.remove(&record.id);
        }
        Ok(Some(record))
    }

    /// Apply every update that is already waiting. Never blocks.
    pub fn pump(&mut self) -> Vec<JobRecord> {
        let mut changed = Vec::new();
        loop {
            match self.updates_rx.try_recv() {
                Ok(update) => match self.apply_update(update) {
                    Ok(Some(record)) => changed.push(record),
                    Ok(None) => {}
                    Err(e) => warn!("Failed to apply job update: {}", e),
                },
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        changed
    }

    /// Wait for the next applicable update and return the affected record.
    ///
    /// Returns `None` once no poller is running and nothing is left to apply.
    pub async fn next_update(&mut self) -> Option<JobRecord> {
        let recheck = self.driver.policy().max_interval.max(Duration::from_millis(50));
        loop {
            // Pollers send before they finish, so a finished poller's last
            // update is already in the channel.
            self.pollers.retain(|_, handle| !handle.is_finished());

            let update = match self.updates_rx.try_recv() {
                Ok(update) => update,
                Err(_) if self.pollers.is_empty() => return None,
                Err(_) => match tokio::time::timeout(recheck, self.updates_rx.recv()).await {
                    Ok(Some(update)) => update,
                    Ok(None) => return None,
                    Err(_) => continue,
                },
            };

            match self.apply_update(update) {
                Ok(Some(record)) => return Some(record),
                Ok(None) => {}
                Err(e) => warn!("Failed to apply job update: {}", e),
            }
        }
    }

    /// Track a job and wait until it completes or fails.
    pub async fn wait_for_terminal(&mut self, id_or_prefix: &str) -> Result<JobRecord, SessionError> {
        let id = self.store.find(id_or_prefix)?.id.clone();
        self.track(&id)?;

        loop {
            let record = self
                .store
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::UnknownJob(id.clone()))?;
            if record.status.is_terminal() {
                return Ok(record);
            }
            if self.next_update().await.is_none() {
                let finished = self
                    .store
                    .get(&id)
                    .filter(|r| r.status.is_terminal())
                    .cloned();
                return finished.ok_or(SessionError::Stalled(id));
            }
        }
    }

    /// Cancel every poller and remove every job, whatever its status.
    pub fn clear(&mut self) -> usize {
        self.abort_pollers();
        while self.updates_rx.try_recv().is_ok() {}

        let removed = self.store.clear();
        info!("Cleared {} jobs", removed);
        self.activity.record(None, format!("Cleared {} jobs", removed));
        removed
    }

    pub fn execute(&mut self, command: Command) -> Result<Outcome, SessionError> {
        match command {
            Command::Submit { kind, parameters } => {
                let record = self.submit_and_track(kind, parameters)?;
                Ok(Outcome::Submitted(record))
            }
            Command::Clear => Ok(Outcome::Cleared(self.clear())),
            Command::Download { job_id, url } => {
                let prefix = crate::jobs::id_prefix(&job_id).to_string();
                self.activity
                    .record(Some(&job_id), format!("Download requested: {}", prefix));
                Ok(Outcome::Download { job_id, url })
            }
            Command::ShowLogs => Ok(Outcome::Logs(self.activity.to_json()?)),
            Command::Reject { reason } => {
                debug!("Rejected action: {}", reason);
                Ok(Outcome::Rejected(reason))
            }
        }
    }

    /// Translate a user gesture and execute the resulting command.
    pub fn handle(&mut self, action: Action) -> Result<Outcome, SessionError> {
        let command = view::on_action(&self.store, action);
        self.execute(command)
    }

    /// Stop every poller. Records keep whatever status they last reached.
    pub fn shutdown(&mut self) {
        let running = self.tracked_count();
        if running > 0 {
            info!("Stopping {} pollers", running);
        }
        self.abort_pollers();
    }

    fn abort_pollers(&mut self) {
        for (_, handle) in self.pollers.drain() {
            handle.abort();
        }
    }

    fn log_transition(&mut self, record: &JobRecord, status: JobStatus) {
        let prefix = record.id_prefix();
        let message = match status {
            JobStatus::Queued => format!("Job queued: {}", prefix),
            JobStatus::Processing => format!("Job started: {}", prefix),
            JobStatus::Completed => format!("Job completed: {}", prefix),
            JobStatus::Failed => format!(
                "Job failed: {} ({})",
                prefix,
                record.error.as_deref().unwrap_or("unknown error")
            ),
        };
        self.activity.record(Some(&record.id), message);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.abort_pollers();
    }
}
