use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::params::JobParameters;

/// Number of id characters shown in job lists.
pub const ID_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    TextToVideo,
    ImageToVideo,
    ReferenceImages,
    FirstLastFrames,
    ExtendVideo,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::TextToVideo,
        JobKind::ImageToVideo,
        JobKind::ReferenceImages,
        JobKind::FirstLastFrames,
        JobKind::ExtendVideo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::TextToVideo => "text_to_video",
            JobKind::ImageToVideo => "image_to_video",
            JobKind::ReferenceImages => "reference_images",
            JobKind::FirstLastFrames => "first_last_frames",
            JobKind::ExtendVideo => "extend_video",
        }
    }

    /// Human readable name used as a tab title.
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::TextToVideo => "Text → Video",
            JobKind::ImageToVideo => "Image → Video",
            JobKind::ReferenceImages => "Reference Images",
            JobKind::FirstLastFrames => "First+Last Frames",
            JobKind::ExtendVideo => "Extend Video",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Processing)
    }

    /// Statuses only move forward: queued -> processing -> completed | failed.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    // Identity
    pub id: String,
    pub kind: JobKind,

    // Status
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    // Submission payload
    pub parameters: JobParameters,

    // Runner handle, set once the runner acknowledges the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner_job_id: Option<String>,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(kind: JobKind, parameters: JobParameters) -> Self {
        Self {
            id: new_job_id(),
            kind,
            status: JobStatus::Queued,
            result: None,
            error: None,
            parameters,
            runner_job_id: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn id_prefix(&self) -> &str {
        id_prefix(&self.id)
    }

    /// Wall-clock render time, known once the job has both started and finished.
    pub fn render_time(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) if finished >= started => Some(finished - started),
            _ => None,
        }
    }
}

/// Fresh job id: a v4 UUID in 32-character hex form.
pub fn new_job_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn id_prefix(id: &str) -> &str {
    match id.char_indices().nth(ID_PREFIX_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("a job with id {0} already exists")]
    DuplicateId(String),
    #[error("no job with id {0}")]
    UnknownJob(String),
    #[error("job id prefix {0} matches more than one job")]
    AmbiguousPrefix(String),
}

/// Insertion-ordered collection of the jobs submitted in one session.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    records: Vec<JobRecord>,
    index: HashMap<String, usize>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&JobRecord> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }

    /// Look a job up by its full id or by a unique id prefix.
    pub fn find(&self, id_or_prefix: &str) -> Result<&JobRecord, StoreError> {
        if let Some(record) = self.get(id_or_prefix) {
            return Ok(record);
        }
        if id_or_prefix.is_empty() {
            return Err(StoreError::UnknownJob(String::new()));
        }

        let mut matches = self
            .records
            .iter()
            .filter(|r| r.id.starts_with(id_or_prefix));
        match (matches.next(), matches.next()) {
            (Some(record), None) => Ok(record),
            (Some(_), Some(_)) => Err(StoreError::AmbiguousPrefix(id_or_prefix.to_string())),
            (None, _) => Err(StoreError::UnknownJob(id_or_prefix.to_string())),
        }
    }

    /// Records in submission order.
    pub fn iter(&self) -> std::slice::Iter<'_, JobRecord> {
        self.records.iter()
    }

    /// The newest `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<&JobRecord> {
        self.records.iter().rev().take(limit).collect()
    }

    pub fn count_by_status(&self, status: JobStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    pub fn append(&mut self, record: JobRecord) -> Result<&JobRecord, StoreError> {
        if self.index.contains_key(&record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }
        let pos = self.records.len();
        self.index.insert(record.id.clone(), pos);
        self.records.push(record);
        Ok(&self.records[pos])
    }

    /// Append a new queued record, drawing ids until one is unused.
    pub fn insert_new(&mut self, kind: JobKind, parameters: JobParameters) -> &JobRecord {
        let mut record = JobRecord::new(kind, parameters);
        while self.index.contains_key(&record.id) {
            record.id = new_job_id();
        }
        let pos = self.records.len();
        self.index.insert(record.id.clone(), pos);
        self.records.push(record);
        &self.records[pos]
    }

    /// Update a record in place. The closure must not change the record's id.
    pub fn update<F, T>(&mut self, id: &str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut JobRecord) -> T,
    {
        let pos = *self
            .index
            .get(id)
            .ok_or_else(|| StoreError::UnknownJob(id.to_string()))?;
        let record = &mut self.records[pos];
        let out = f(record);
        debug_assert_eq!(record.id, id, "job ids are immutable");
        Ok(out)
    }

    /// Remove every record regardless of status. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        self.index.clear();
        removed
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Asset, JobParameters};

    fn extend_params() -> JobParameters {
        JobParameters::ExtendVideo {
            base_video: Some(Asset::new("clip.mp4")),
            extend_seconds: 8,
        }
    }

    #[test]
    fn test_new_job_id_is_hex() {
        let id = new_job_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_id_prefix_shorter_than_limit() {
        assert_eq!(id_prefix("abc"), "abc");
        assert_eq!(id_prefix("0123456789"), "01234567");
    }

    #[test]
    fn test_status_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));

        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Processing));
    }

    #[test]
    fn test_append_rejects_duplicate_id() {
        let mut store = JobStore::new();
        let record = JobRecord::new(JobKind::ExtendVideo, extend_params());
        store.append(record.clone()).unwrap();

        let err = store.append(record.clone()).unwrap_err();
        assert_eq!(err, StoreError::DuplicateId(record.id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_find_by_prefix() {
        let mut store = JobStore::new();
        let mut a = JobRecord::new(JobKind::ExtendVideo, extend_params());
        a.id = "aaaa1111bbbb".to_string();
        let mut b = JobRecord::new(JobKind::ExtendVideo, extend_params());
        b.id = "aaaa2222cccc".to_string();
        store.append(a).unwrap();
        store.append(b).unwrap();

        assert_eq!(store.find("aaaa1").unwrap().id, "aaaa1111bbbb");
        assert_eq!(store.find("aaaa2222cccc").unwrap().id, "aaaa2222cccc");
        assert!(matches!(store.find("aaaa"), Err(StoreError::AmbiguousPrefix(_))));
        assert!(matches!(store.find("ffff"), Err(StoreError::UnknownJob(_))));
        assert!(matches!(store.find(""), Err(StoreError::UnknownJob(_))));
    }

    #[test]
    fn test_recent_is_newest_first() {
        let mut store = JobStore::new();
        let ids: Vec<String> = (0..6)
            .map(|_| store.insert_new(JobKind::ExtendVideo, extend_params()).id.clone())
            .collect();

        let recent: Vec<&str> = store.recent(3).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(recent, vec![ids[5].as_str(), ids[4].as_str(), ids[3].as_str()]);
        assert_eq!(store.recent(100).len(), 6);
    }

    #[test]
    fn test_update_unknown_job() {
        let mut store = JobStore::new();
        let err = store.update("missing", |r| r.status).unwrap_err();
        assert_eq!(err, StoreError::UnknownJob("missing".to_string()));
    }

    #[test]
    fn test_clear_resets_index() {
        let mut store = JobStore::new();
        let id = store.insert_new(JobKind::ExtendVideo, extend_params()).id.clone();
        assert_eq!(store.clear(), 1);
        assert!(store.is_empty());
        assert!(!store.contains(&id));
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_record_json_shape() {
        let record = JobRecord::new(JobKind::ExtendVideo, extend_params());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "extend_video");
        assert_eq!(json["status"], "queued");
        assert!(json.get("result").is_none());
        assert!(json.get("error").is_none());

        let back: JobRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
