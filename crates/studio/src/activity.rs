use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub time: DateTime<Utc>,
    pub job_id: Option<String>,
    pub message: String,
}

/// Line of the "Fetch Logs" panel.
#[derive(Serialize)]
struct LogLine<'a> {
    time: String,
    msg: &'a str,
}

/// Bounded, oldest-first record of what happened in a session.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn record(&mut self, job_id: Option<&str>, message: impl Into<String>) {
        self.record_at(Utc::now(), job_id, message);
    }

    pub fn record_at(&mut self, time: DateTime<Utc>, job_id: Option<&str>, message: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ActivityEntry {
            time,
            job_id: job_id.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    /// Entries mentioning one job, oldest first.
    pub fn for_job<'a>(&'a self, job_id: &'a str) -> impl Iterator<Item = &'a ActivityEntry> {
        self.entries
            .iter()
            .filter(move |e| e.job_id.as_deref() == Some(job_id))
    }

    /// The log as a JSON array of `{"time", "msg"}` objects.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let lines: Vec<LogLine<'_>> = self
            .entries
            .iter()
            .map(|e| LogLine {
                time: e.time.format(TIME_FORMAT).to_string(),
                msg: &e.message,
            })
            .collect();
        serde_json::to_string_pretty(&lines)
    }
}
