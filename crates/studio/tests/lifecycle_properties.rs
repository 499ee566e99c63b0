use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use studio_core::jobs::{JobKind, JobRecord, JobStatus, JobStore};
use studio_core::lifecycle::{apply_signal, PollPolicy, Signal, StatusDriver, TIMEOUT_REASON};
use studio_core::params::JobParameters;
use studio_core::runner::SimulatedRunner;

fn signal_strategy() -> impl Strategy<Value = Signal> {
    prop_oneof![
        "[a-z0-9]{1,8}".prop_map(|id| Signal::Acknowledged { runner_job_id: id }),
        Just(Signal::Pending),
        "https://x/[a-z]{1,8}\\.mp4".prop_map(|result| Signal::Succeeded { result }),
        "[a-z ]{1,16}".prop_map(|reason| Signal::Failed { reason }),
        Just(Signal::TimedOut),
    ]
}

/// Status paths a job may legally follow.
const PATHS: [[JobStatus; 3]; 2] = [
    [JobStatus::Queued, JobStatus::Processing, JobStatus::Completed],
    [JobStatus::Queued, JobStatus::Processing, JobStatus::Failed],
];

fn is_legal_history(history: &[JobStatus]) -> bool {
    PATHS
        .iter()
        .any(|path| history.len() <= path.len() && path[..history.len()] == *history)
}

/// **Property: status history is always a prefix of a legal path**
#[test]
fn property_status_history_is_a_legal_prefix() {
    proptest!(|(signals in prop::collection::vec(signal_strategy(), 0..20))| {
        let mut record = JobRecord::new(JobKind::TextToVideo, JobParameters::text("A cat"));
        let mut history = vec![record.status];
        let mut now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        for signal in &signals {
            now += ChronoDuration::seconds(1);
            let before = record.clone();
            match apply_signal(&mut record, signal, now) {
                Ok(entered) => history.extend(entered),
                Err(_) => prop_assert_eq!(&record, &before, "Rejected signal changed the record"),
            }
            prop_assert!(is_legal_history(&history), "Illegal history {:?}", history);
        }

        // Terminal records carry exactly the field their status calls for.
        match record.status {
            JobStatus::Completed => {
                prop_assert!(record.result.is_some());
                prop_assert!(record.error.is_none());
                prop_assert!(record.finished_at.is_some());
            }
            JobStatus::Failed => {
                prop_assert!(record.result.is_none());
                prop_assert!(record.error.is_some());
                prop_assert!(record.finished_at.is_some());
            }
            JobStatus::Queued | JobStatus::Processing => {
                prop_assert!(record.finished_at.is_none());
            }
        }
        if let (Some(started), Some(finished)) = (record.started_at, record.finished_at) {
            prop_assert!(started <= finished);
        }
    });
}

/// **Property: once terminal, a record never changes again**
#[test]
fn property_terminal_records_are_frozen() {
    proptest!(|(
        reason in "[a-z]{1,10}",
        succeed in any::<bool>(),
        later in prop::collection::vec(signal_strategy(), 1..10),
    )| {
        let mut record = JobRecord::new(JobKind::ExtendVideo, JobParameters::extend("a.mp4", 8));
        let now = Utc::now();
        apply_signal(&mut record, &Signal::Acknowledged { runner_job_id: "r".to_string() }, now).unwrap();
        let last = if succeed {
            Signal::Succeeded { result: "https://x/video.mp4".to_string() }
        } else {
            Signal::Failed { reason }
        };
        apply_signal(&mut record, &last, now).unwrap();
        let frozen = record.clone();

        for signal in &later {
            prop_assert!(apply_signal(&mut record, signal, now).is_err());
            prop_assert_eq!(&record, &frozen);
        }
    });
}

/// **Property: backoff intervals never shrink and never exceed the cap**
#[test]
fn property_backoff_is_monotonic_and_capped() {
    proptest!(|(
        initial_ms in 1_u64..5_000,
        extra_ms in 0_u64..60_000,
        multiplier in 1.0_f64..5.0,
    )| {
        let policy = PollPolicy {
            initial_interval: Duration::from_millis(initial_ms),
            max_interval: Duration::from_millis(initial_ms + extra_ms),
            multiplier,
            timeout: Duration::from_secs(60),
        };

        let intervals: Vec<Duration> = policy.intervals().take(50).collect();
        prop_assert_eq!(intervals.len(), 50);
        prop_assert_eq!(intervals[0], policy.initial_interval);
        for pair in intervals.windows(2) {
            prop_assert!(pair[0] <= pair[1], "Interval shrank: {:?}", pair);
        }
        prop_assert!(intervals.iter().all(|d| *d <= policy.max_interval));
    });
}

#[tokio::test]
async fn test_advance_on_terminal_job_is_identity() {
    let runner = Arc::new(SimulatedRunner::new(1));
    let driver = StatusDriver::new(runner.clone(), PollPolicy::default());
    let mut store = JobStore::new();
    let id = store
        .insert_new(JobKind::TextToVideo, JobParameters::text("A cat"))
        .id
        .clone();

    driver.advance(&mut store, &id).await.unwrap();
    let done = driver.advance(&mut store, &id).await.unwrap();
    assert_eq!(done.record.status, JobStatus::Completed);

    for _ in 0..3 {
        let again = driver.advance(&mut store, &id).await.unwrap();
        assert!(again.entered.is_empty());
        assert_eq!(again.record, done.record);
        assert_eq!(store.get(&id), Some(&done.record));
    }
    assert_eq!(runner.submitted(), 1);
}

#[tokio::test]
async fn test_advance_past_deadline_times_out() {
    let policy = PollPolicy {
        timeout: Duration::from_secs(60),
        ..PollPolicy::default()
    };
    let driver = StatusDriver::new(Arc::new(SimulatedRunner::new(u32::MAX)), policy);
    let mut store = JobStore::new();
    let id = store
        .insert_new(JobKind::TextToVideo, JobParameters::text("A cat"))
        .id
        .clone();

    let start = Utc::now();
    let step = driver.advance_at(&mut store, &id, start).await.unwrap();
    assert_eq!(step.entered, vec![JobStatus::Processing]);

    let step = driver
        .advance_at(&mut store, &id, start + ChronoDuration::seconds(30))
        .await
        .unwrap();
    assert_eq!(step.record.status, JobStatus::Processing);

    let step = driver
        .advance_at(&mut store, &id, start + ChronoDuration::seconds(61))
        .await
        .unwrap();
    assert_eq!(step.entered, vec![JobStatus::Failed]);
    assert_eq!(step.record.error.as_deref(), Some(TIMEOUT_REASON));
    assert!(step.record.result.is_none());
}

#[tokio::test]
async fn test_advance_unknown_job() {
    let driver = StatusDriver::new(Arc::new(SimulatedRunner::default()), PollPolicy::default());
    let mut store = JobStore::new();
    assert!(driver.advance(&mut store, "missing").await.is_err());
}
