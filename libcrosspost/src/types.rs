//! Core types for Crosspost

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Client identity used when a request carries no API key
pub const DEFAULT_CLIENT_ID: &str = "default";

/// One publish of one piece of content to one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishJob {
    pub id: Uuid,
    pub platform: String,
    pub content: String,
    pub client_id: String,
    /// Number of times the job has been claimed by a worker
    pub attempt: u32,
    /// Unix milliseconds
    pub created_at: i64,
}

impl PublishJob {
    pub fn new(platform: impl Into<String>, content: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            platform: platform.into(),
            content: content.into(),
            client_id: client_id.into(),
            attempt: 0,
            created_at: now_millis(),
        }
    }
}

/// Job lifecycle:
/// `Queued -> InProgress -> {Succeeded | Retrying -> InProgress | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Retrying,
    Succeeded,
    /// Retries exhausted or a permanent error
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::InProgress,
        JobStatus::Retrying,
        JobStatus::Succeeded,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::InProgress => "in_progress",
            JobStatus::Retrying => "retrying",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "Invalid job status '{}'. Valid options: queued, in_progress, retrying, succeeded, failed",
                    s
                )
            })
    }
}

/// Persisted view of a job, including queue bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub platform: String,
    pub content: String,
    pub client_id: String,
    pub status: JobStatus,
    pub attempt: u32,
    pub created_at: i64,
    pub available_at: i64,
    pub lease_expires_at: Option<i64>,
    pub worker_id: Option<String>,
    pub last_error: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub completed_at: Option<i64>,
}

impl JobRecord {
    /// Terminal outcome, if the job has one
    pub fn result(&self) -> Option<JobResult> {
        let outcome = match self.status {
            JobStatus::Succeeded => JobOutcome::Succeeded {
                payload: self.payload.clone().unwrap_or(serde_json::Value::Null),
            },
            JobStatus::Failed => JobOutcome::Failed {
                error: self.last_error.clone().unwrap_or_default(),
            },
            _ => return None,
        };

        Some(JobResult {
            job_id: self.id,
            platform: self.platform.clone(),
            outcome,
            attempt: self.attempt,
            completed_at: self.completed_at.unwrap_or(self.available_at),
        })
    }
}

/// Written once when a job reaches a terminal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub platform: String,
    #[serde(flatten)]
    pub outcome: JobOutcome,
    pub attempt: u32,
    pub completed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded { payload: serde_json::Value },
    Failed { error: String },
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Succeeded { .. })
    }
}

/// Current time in Unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
