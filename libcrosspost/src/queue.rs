//! Durable publish job queue
//!
//! Jobs live in the `publish_jobs` table of the shared database, so anything
//! enqueued before a crash is still there afterwards. A worker claims a job by
//! taking a lease on it; a job whose lease runs out without a recorded outcome
//! is handed to the next worker that asks. Every claim counts as an attempt,
//! including one that ended in a crash.
//!
//! State changes after a claim are fenced on the claiming worker's id, so a
//! worker that lost its lease cannot overwrite the outcome of the worker that
//! took the job over.
//!
//! With an attempt ceiling set, a job whose lease expires during its final
//! attempt is marked failed instead of being handed out again.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{DbError, Result};
use crate::types::{now_millis, JobRecord, JobResult, JobStatus, PublishJob};

/// Recorded on a job whose worker vanished during its last allowed attempt
pub const WORKER_LOST_ERROR: &str = "Worker lost during final attempt";

const RECORD_COLUMNS: &str = "id, platform, content, client_id, status, attempt, created_at, \
     available_at, lease_expires_at, worker_id, last_error, payload, completed_at";

/// Filter for [`JobQueue::list`]
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub platform: Option<String>,
    pub client_id: Option<String>,
    pub limit: Option<u32>,
}

/// Job counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: u64,
    pub in_progress: u64,
    pub retrying: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.queued + self.in_progress + self.retrying + self.succeeded + self.failed
    }

    /// Jobs that have not reached a terminal state
    pub fn pending(&self) -> u64 {
        self.queued + self.in_progress + self.retrying
    }
}

#[derive(Clone)]
pub struct JobQueue {
    db: Database,
    lease: Duration,
    max_attempts: Option<u32>,
    notify: Arc<Notify>,
}

impl JobQueue {
    /// `lease` must exceed the publish timeout, otherwise a slow but healthy
    /// publish gets redelivered.
    pub fn new(db: Database, lease: Duration) -> Self {
        Self {
            db,
            lease,
            max_attempts: None,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Stop redelivering a job once it has been claimed `max_attempts` times
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Persist a job as `queued` and wake an idle worker in this process
    pub async fn enqueue(&self, job: &PublishJob) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO publish_jobs (id, platform, content, client_id, status, attempt, created_at, available_at)
            VALUES (?, ?, ?, ?, 'queued', 0, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.platform)
        .bind(&job.content)
        .bind(&job.client_id)
        .bind(job.created_at)
        .bind(job.created_at)
        .execute(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        debug!(job_id = %job.id, platform = %job.platform, "Enqueued publish job");
        self.notify.notify_one();
        Ok(job.id)
    }

    /// Claim the oldest ready job for `worker_id`
    pub async fn claim(&self, worker_id: &str) -> Result<Option<PublishJob>> {
        self.claim_at(worker_id, now_millis()).await
    }

    /// Claim as of `now` (Unix millis)
    ///
    /// Ready means `queued` or `retrying` with `available_at <= now`, or
    /// `in_progress` with an expired lease and attempts left. Selection and
    /// update happen in one statement, so two workers never claim the same job.
    pub async fn claim_at(&self, worker_id: &str, now: i64) -> Result<Option<PublishJob>> {
        if let Some(max_attempts) = self.max_attempts {
            self.fail_abandoned(now, max_attempts).await?;
        }

        let lease_expires_at = now + self.lease.as_millis() as i64;
        let max_attempts = self.max_attempts.map_or(i64::MAX, i64::from);

        let row = sqlx::query(
            r#"
            UPDATE publish_jobs
            SET status = 'in_progress',
                attempt = attempt + 1,
                worker_id = ?1,
                lease_expires_at = ?2
            WHERE id = (
                SELECT id FROM publish_jobs
                WHERE (status IN ('queued', 'retrying') AND available_at <= ?3)
                   OR (status = 'in_progress' AND lease_expires_at <= ?3 AND attempt < ?4)
                ORDER BY available_at, created_at
                LIMIT 1
            )
            RETURNING id, platform, content, client_id, attempt, created_at
            "#,
        )
        .bind(worker_id)
        .bind(lease_expires_at)
        .bind(now)
        .bind(max_attempts)
        .fetch_optional(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let job = PublishJob {
            id: parse_id(&row.get::<String, _>("id"))?,
            platform: row.get("platform"),
            content: row.get("content"),
            client_id: row.get("client_id"),
            attempt: row.get::<i64, _>("attempt") as u32,
            created_at: row.get("created_at"),
        };
        debug!(job_id = %job.id, worker_id, attempt = job.attempt, "Claimed publish job");
        Ok(Some(job))
    }

    /// Fail expired leases that were already on their last attempt
    async fn fail_abandoned(&self, now: i64, max_attempts: u32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE publish_jobs
            SET status = 'failed', last_error = ?1, completed_at = ?2, lease_expires_at = NULL
            WHERE status = 'in_progress' AND lease_expires_at <= ?2 AND attempt >= ?3
            "#,
        )
        .bind(WORKER_LOST_ERROR)
        .bind(now)
        .bind(i64::from(max_attempts))
        .execute(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        let failed = result.rows_affected();
        if failed > 0 {
            warn!(jobs = failed, max_attempts, "Failed jobs whose worker was lost during the final attempt");
        }
        Ok(failed)
    }

    /// Record success. Returns false if `worker_id` no longer holds the job.
    pub async fn complete(&self, job_id: Uuid, worker_id: &str, payload: &serde_json::Value) -> Result<bool> {
        let payload = serde_json::to_string(payload).map_err(|e| DbError::CorruptRow(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE publish_jobs
            SET status = 'succeeded', payload = ?, last_error = NULL,
                completed_at = ?, lease_expires_at = NULL
            WHERE id = ? AND worker_id = ? AND status = 'in_progress'
            "#,
        )
        .bind(payload)
        .bind(now_millis())
        .bind(job_id.to_string())
        .bind(worker_id)
        .execute(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(fenced(result.rows_affected(), job_id, worker_id))
    }

    /// Put the job back for another attempt after `delay`
    pub async fn schedule_retry(&self, job_id: Uuid, worker_id: &str, error: &str, delay: Duration) -> Result<bool> {
        let available_at = now_millis() + delay.as_millis() as i64;

        let result = sqlx::query(
            r#"
            UPDATE publish_jobs
            SET status = 'retrying', available_at = ?, last_error = ?, lease_expires_at = NULL
            WHERE id = ? AND worker_id = ? AND status = 'in_progress'
            "#,
        )
        .bind(available_at)
        .bind(error)
        .bind(job_id.to_string())
        .bind(worker_id)
        .execute(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        let held = fenced(result.rows_affected(), job_id, worker_id);
        if held && delay.is_zero() {
            self.notify.notify_one();
        }
        Ok(held)
    }

    /// Record a terminal failure
    pub async fn fail_permanent(&self, job_id: Uuid, worker_id: &str, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE publish_jobs
            SET status = 'failed', last_error = ?, completed_at = ?, lease_expires_at = NULL
            WHERE id = ? AND worker_id = ? AND status = 'in_progress'
            "#,
        )
        .bind(error)
        .bind(now_millis())
        .bind(job_id.to_string())
        .bind(worker_id)
        .execute(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(fenced(result.rows_affected(), job_id, worker_id))
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>> {
        let query = format!("SELECT {} FROM publish_jobs WHERE id = ?", RECORD_COLUMNS);
        let row = sqlx::query(&query)
            .bind(job_id.to_string())
            .fetch_optional(self.db.pool())
            .await
            .map_err(DbError::SqlxError)?;

        row.map(|r| record_from_row(&r)).transpose()
    }

    /// Terminal outcome of a job, `None` while it is still pending or if unknown
    pub async fn result(&self, job_id: Uuid) -> Result<Option<JobResult>> {
        Ok(self.get(job_id).await?.and_then(|record| record.result()))
    }

    /// Jobs matching `filter`, newest first
    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>> {
        let mut query = format!("SELECT {} FROM publish_jobs WHERE 1 = 1", RECORD_COLUMNS);
        let mut binds: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            query.push_str(" AND status = ?");
            binds.push(status.as_str().to_string());
        }
        if let Some(platform) = &filter.platform {
            query.push_str(" AND platform = ? COLLATE NOCASE");
            binds.push(platform.clone());
        }
        if let Some(client_id) = &filter.client_id {
            query.push_str(" AND client_id = ?");
            binds.push(client_id.clone());
        }
        query.push_str(" ORDER BY created_at DESC, id");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        let mut sql_query = sqlx::query(&query);
        for value in &binds {
            sql_query = sql_query.bind(value);
        }

        let rows = sql_query
            .fetch_all(self.db.pool())
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(record_from_row).collect()
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM publish_jobs GROUP BY status")
                .fetch_all(self.db.pool())
                .await
                .map_err(DbError::SqlxError)?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = count as u64;
            match parse_status(&status)? {
                JobStatus::Queued => stats.queued = count,
                JobStatus::InProgress => stats.in_progress = count,
                JobStatus::Retrying => stats.retrying = count,
                JobStatus::Succeeded => stats.succeeded = count,
                JobStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }

    /// Wait until a job is enqueued in this process or `timeout` elapses
    pub async fn wait_for_work(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}

fn fenced(rows_affected: u64, job_id: Uuid, worker_id: &str) -> bool {
    if rows_affected == 0 {
        warn!(%job_id, worker_id, "Lease lost before the outcome was recorded; leaving job to its current holder");
        false
    } else {
        true
    }
}

fn parse_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| DbError::CorruptRow(format!("invalid job id '{}': {}", value, e)).into())
}

fn parse_status(value: &str) -> Result<JobStatus> {
    value
        .parse::<JobStatus>()
        .map_err(|e| DbError::CorruptRow(e).into())
}

fn record_from_row(row: &SqliteRow) -> Result<JobRecord> {
    let payload = row
        .get::<Option<String>, _>("payload")
        .map(|p| serde_json::from_str(&p))
        .transpose()
        .map_err(|e| DbError::CorruptRow(format!("invalid payload: {}", e)))?;

    Ok(JobRecord {
        id: parse_id(&row.get::<String, _>("id"))?,
        platform: row.get("platform"),
        content: row.get("content"),
        client_id: row.get("client_id"),
        status: parse_status(&row.get::<String, _>("status"))?,
        attempt: row.get::<i64, _>("attempt") as u32,
        created_at: row.get("created_at"),
        available_at: row.get("available_at"),
        lease_expires_at: row.get("lease_expires_at"),
        worker_id: row.get("worker_id"),
        last_error: row.get("last_error"),
        payload,
        completed_at: row.get("completed_at"),
    })
}
