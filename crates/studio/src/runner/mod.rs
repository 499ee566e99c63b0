pub mod http;
pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jobs::JobKind;
use crate::params::JobParameters;

pub use http::HttpRunner;
pub use simulated::SimulatedRunner;

/// Status vocabulary of the external job runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Answer to a poll request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerReport {
    pub status: RunnerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunnerReport {
    pub fn queued() -> Self {
        Self {
            status: RunnerStatus::Queued,
            result: None,
            error: None,
        }
    }

    pub fn processing() -> Self {
        Self {
            status: RunnerStatus::Processing,
            result: None,
            error: None,
        }
    }

    pub fn completed(result: impl Into<String>) -> Self {
        Self {
            status: RunnerStatus::Completed,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RunnerStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("runner does not know job {0}")]
    UnknownJob(String),
    #[error("runner returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("runner request failed: {0}")]
    Transport(String),
    #[error("runner sent an invalid response: {0}")]
    InvalidResponse(String),
}

/// The backend that actually renders videos.
///
/// Implementations must be cheap to share across polling tasks.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Hand a job to the runner. Returns the runner's id for it.
    async fn submit(&self, kind: JobKind, parameters: &JobParameters) -> Result<String, RunnerError>;

    /// Ask the runner how a previously submitted job is doing.
    async fn poll(&self, runner_job_id: &str) -> Result<RunnerReport, RunnerError>;
}
