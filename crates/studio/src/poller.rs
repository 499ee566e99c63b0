use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, warn};

use crate::jobs::{JobRecord, JobStatus};
use crate::lifecycle::{apply_signal, Signal, StatusDriver};

/// A signal for one job, travelling from its poller to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobUpdate {
    pub job_id: String,
    pub signal: Signal,
}

/// Spawn the background task that drives `record` to a terminal state.
pub fn spawn_poller(
    driver: StatusDriver,
    record: JobRecord,
    updates: mpsc::Sender<JobUpdate>,
) -> JoinHandle<()> {
    tokio::spawn(run_poller(driver, record, updates))
}

/// Dispatch a job, then poll it with backoff until it finishes, fails or
/// runs out of time. Every signal is forwarded on `updates`; the task ends
/// after a terminal signal or when the receiving side is gone.
///
/// The task keeps its own copy of the record and applies the same
/// transitions the session does, so it always knows which step comes next.
pub async fn run_poller(
    driver: StatusDriver,
    mut record: JobRecord,
    updates: mpsc::Sender<JobUpdate>,
) {
    let policy = *driver.policy();
    let mut intervals = policy.intervals();
    let mut deadline: Option<Instant> = None;

    debug!("Poller started for job {}", record.id_prefix());

    loop {
        let signal = match record.status {
            JobStatus::Queued => driver.dispatch(&record).await,
            JobStatus::Processing => {
                let deadline = *deadline.get_or_insert_with(|| deadline_after(policy.timeout));
                if Instant::now() >= deadline {
                    Signal::TimedOut
                } else {
                    timeout_at(deadline, driver.check(&record))
                        .await
                        .unwrap_or(Signal::TimedOut)
                }
            }
            JobStatus::Completed | JobStatus::Failed => break,
        };

        if let Err(e) = apply_signal(&mut record, &signal, Utc::now()) {
            warn!("Poller for job {} stopped: {}", record.id_prefix(), e);
            break;
        }
        if record.status == JobStatus::Processing && deadline.is_none() {
            deadline = Some(deadline_after(policy.timeout));
        }

        let terminal = signal.is_terminal();
        let update = JobUpdate {
            job_id: record.id.clone(),
            signal,
        };
        if updates.send(update).await.is_err() {
            debug!("Session closed, poller for job {} exiting", record.id_prefix());
            break;
        }
        if terminal {
            break;
        }

        let wake = deadline_after(intervals.next().unwrap_or(policy.max_interval));
        let wake = match deadline {
            Some(deadline) => wake.min(deadline),
            None => wake,
        };
        sleep_until(wake).await;
    }

    debug!("Poller finished for job {}", record.id_prefix());
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    // Absurdly large timeouts are clamped to a year.
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobKind;
    use crate::lifecycle::PollPolicy;
    use crate::params::JobParameters;
    use crate::runner::SimulatedRunner;
    use std::sync::Arc;

    fn policy() -> PollPolicy {
        PollPolicy {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(1),
            multiplier: 2.0,
            timeout: Duration::from_secs(30),
        }
    }

    async fn collect(mut rx: mpsc::Receiver<JobUpdate>) -> Vec<Signal> {
        let mut signals = Vec::new();
        while let Some(update) = rx.recv().await {
            signals.push(update.signal);
        }
        signals
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_runs_job_to_completion() {
        let driver = StatusDriver::new(Arc::new(SimulatedRunner::new(2)), policy());
        let record = JobRecord::new(JobKind::TextToVideo, JobParameters::text("A cat"));
        let (tx, rx) = mpsc::channel(16);

        let handle = spawn_poller(driver, record, tx);
        let signals = collect(rx).await;
        handle.await.unwrap();

        assert!(matches!(signals[0], Signal::Acknowledged { .. }));
        assert_eq!(signals[1], Signal::Pending);
        assert_eq!(
            signals[2],
            Signal::Succeeded {
                result: crate::runner::simulated::PLACEHOLDER_RESULT_URL.to_string()
            }
        );
        assert_eq!(signals.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_times_out() {
        let driver = StatusDriver::new(Arc::new(SimulatedRunner::new(u32::MAX)), policy());
        let record = JobRecord::new(JobKind::TextToVideo, JobParameters::text("A cat"));
        let (tx, rx) = mpsc::channel(1024);

        let started = Instant::now();
        spawn_poller(driver, record, tx);
        let signals = collect(rx).await;

        assert_eq!(signals.last(), Some(&Signal::TimedOut));
        assert!(signals[1..signals.len() - 1].iter().all(|s| *s == Signal::Pending));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(32));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_stops_when_session_is_gone() {
        let driver = StatusDriver::new(Arc::new(SimulatedRunner::new(u32::MAX)), policy());
        let record = JobRecord::new(JobKind::TextToVideo, JobParameters::text("A cat"));
        let (tx, rx) = mpsc::channel(16);
        drop(rx);

        // Returns instead of polling until the deadline.
        let handle = spawn_poller(driver, record, tx);
        handle.await.unwrap();
    }
}
