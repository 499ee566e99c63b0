use std::time::Duration;

use crate::jobs::{JobKind, JobRecord, JobStatus, JobStore, StoreError};
use crate::params::JobParameters;

/// Header figures of the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Kpis {
    pub total_jobs: usize,
    /// Queued plus processing.
    pub active_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    /// Mean render time over jobs that have both started and finished.
    pub average_render_time: Option<Duration>,
}

impl Kpis {
    /// `HH:MM:SS`, or `--:--:--` when nothing has finished yet.
    pub fn average_render_time_display(&self) -> String {
        match self.average_render_time {
            Some(d) => format_hms(d),
            None => "--:--:--".to_string(),
        }
    }
}

/// One row of the job list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCard {
    pub id: String,
    pub id_prefix: String,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Present only for completed jobs.
    pub download_url: Option<String>,
    /// Present only for failed jobs.
    pub error: Option<String>,
}

impl JobCard {
    fn from_record(record: &JobRecord) -> Self {
        Self {
            id: record.id.clone(),
            id_prefix: record.id_prefix().to_string(),
            kind: record.kind,
            status: record.status,
            download_url: match record.status {
                JobStatus::Completed => record.result.clone(),
                _ => None,
            },
            error: match record.status {
                JobStatus::Failed => record.error.clone(),
                _ => None,
            },
        }
    }

    /// `[abcd1234] text_to_video — queued`
    pub fn summary_line(&self) -> String {
        format!("[{}] {} — {}", self.id_prefix, self.kind, self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewModel {
    pub kpis: Kpis,
    /// Newest first.
    pub jobs: Vec<JobCard>,
}

impl ViewModel {
    pub fn recent(&self, limit: usize) -> &[JobCard] {
        &self.jobs[..limit.min(self.jobs.len())]
    }

    /// Newest completed job, if any: what the download button offers.
    pub fn latest_download(&self) -> Option<&JobCard> {
        self.jobs.iter().find(|card| card.download_url.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Build the view from the store alone.
pub fn render(store: &JobStore) -> ViewModel {
    let jobs: Vec<JobCard> = store.iter().rev().map(JobCard::from_record).collect();

    let render_times: Vec<Duration> = store
        .iter()
        .filter_map(|r| r.render_time())
        .filter_map(|d| d.to_std().ok())
        .collect();
    let average_render_time = if render_times.is_empty() {
        None
    } else {
        let total: Duration = render_times.iter().sum();
        Some(total / render_times.len() as u32)
    };

    let kpis = Kpis {
        total_jobs: jobs.len(),
        active_jobs: jobs.iter().filter(|c| c.status.is_active()).count(),
        completed_jobs: jobs
            .iter()
            .filter(|c| c.status == JobStatus::Completed)
            .count(),
        failed_jobs: jobs.iter().filter(|c| c.status == JobStatus::Failed).count(),
        average_render_time,
    };

    ViewModel { kpis, jobs }
}

/// User gestures coming from the interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SubmitForm {
        kind: JobKind,
        parameters: JobParameters,
    },
    ClearAll,
    /// `job_id` may be a full id or an id prefix.
    RequestDownload { job_id: String },
    FetchLogs,
}

/// What the session should do in response to an [`Action`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit {
        kind: JobKind,
        parameters: JobParameters,
    },
    Clear,
    Download { job_id: String, url: String },
    ShowLogs,
    Reject { reason: String },
}

/// Translate a gesture into a command. Never touches the store.
pub fn on_action(store: &JobStore, action: Action) -> Command {
    match action {
        Action::SubmitForm { kind, parameters } => Command::Submit { kind, parameters },
        Action::ClearAll => Command::Clear,
        Action::FetchLogs => Command::ShowLogs,
        Action::RequestDownload { job_id } => match store.find(&job_id) {
            Ok(record) => match (&record.status, &record.result) {
                (JobStatus::Completed, Some(url)) => Command::Download {
                    job_id: record.id.clone(),
                    url: url.clone(),
                },
                (status, _) => Command::Reject {
                    reason: format!("job {} is {}, nothing to download", record.id_prefix(), status),
                },
            },
            Err(StoreError::AmbiguousPrefix(prefix)) => Command::Reject {
                reason: format!("job id {} is ambiguous", prefix),
            },
            Err(_) => Command::Reject {
                reason: format!("no job {}", job_id),
            },
        },
    }
}

pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
