use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{JobRunner, RunnerError, RunnerReport};
use crate::jobs::JobKind;
use crate::params::JobParameters;

#[derive(Serialize)]
struct SubmitRequest<'a> {
    kind: JobKind,
    parameters: &'a JobParameters,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

/// Job runner reached over a small JSON API:
///
/// - `POST {base_url}/jobs` with `{"kind": .., "parameters": ..}` answers `{"id": ..}`
/// - `GET {base_url}/jobs/{id}` answers a [`RunnerReport`]
#[derive(Debug, Clone)]
pub struct HttpRunner {
    client: Client,
    base_url: String,
}

impl HttpRunner {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, RunnerError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RunnerError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn jobs_url(&self) -> String {
        format!("{}/jobs", self.base_url)
    }

    fn job_url(&self, runner_job_id: &str) -> String {
        format!("{}/jobs/{}", self.base_url, runner_job_id)
    }
}

/// Turn non-2xx responses into errors, keeping the body for diagnostics.
async fn check_status(response: Response) -> Result<Response, RunnerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(RunnerError::Http {
        status: status.as_u16(),
        body: error_body(response.text().await),
    })
}

fn error_body(text: reqwest::Result<String>) -> String {
    text.unwrap_or_else(|e| format!("<unreadable body: {}>", e))
}

#[async_trait]
impl JobRunner for HttpRunner {
    async fn submit(&self, kind: JobKind, parameters: &JobParameters) -> Result<String, RunnerError> {
        let url = self.jobs_url();
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&SubmitRequest { kind, parameters })
            .send()
            .await
            .map_err(|e| RunnerError::Transport(e.to_string()))?;

        let body: SubmitResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| RunnerError::InvalidResponse(e.to_string()))?;

        Ok(body.id)
    }

    async fn poll(&self, runner_job_id: &str) -> Result<RunnerReport, RunnerError> {
        let url = self.job_url(runner_job_id);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RunnerError::Transport(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RunnerError::UnknownJob(runner_job_id.to_string()));
        }

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| RunnerError::InvalidResponse(e.to_string()))
    }
}
