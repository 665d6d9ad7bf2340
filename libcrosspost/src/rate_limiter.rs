//! Fixed-window rate limiting per client
//!
//! Each client key holds a counter with an expiry. A request is allowed while
//! the counter is below the limit; allowing a request increments the counter
//! and pushes the expiry out to a full window from now. Once the expiry passes
//! the counter starts over.
//!
//! This is a fixed window, not a sliding one or a token bucket, so a client
//! can burst up to twice the limit across a window boundary.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::db::Database;
use crate::error::{DbError, Result};
use crate::types::now_millis;

/// Shared counting store behind the limiter
///
/// Implementations must make `increment_below` a single atomic step: two
/// concurrent callers must never both observe the pre-increment count.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key` unless it already holds `limit` in an
    /// unexpired window. An expired window counts as zero. On increment the
    /// expiry becomes `now + window`.
    ///
    /// Returns the new count, or `None` if the limit was reached (in which
    /// case nothing is mutated).
    async fn increment_below(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: i64,
    ) -> Result<Option<u32>>;

    /// Count in the live window, zero if the key is absent or expired
    async fn current(&self, key: &str, now: i64) -> Result<u32>;

    /// Delete expired windows, returning how many were removed
    async fn purge_expired(&self, now: i64) -> Result<u64>;
}

/// Counter store in the shared SQLite database, usable across processes
#[derive(Clone)]
pub struct SqliteCounterStore {
    db: Database,
}

impl SqliteCounterStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
    async fn increment_below(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: i64,
    ) -> Result<Option<u32>> {
        if limit == 0 {
            return Ok(None);
        }
        let expires_at = now + window.as_millis() as i64;

        // The conditional upsert is one statement, so SQLite applies the
        // comparison and the increment under the same write lock.
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO rate_limits (key, count, expires_at)
            VALUES (?1, 1, ?2)
            ON CONFLICT(key) DO UPDATE SET
                count = CASE WHEN rate_limits.expires_at <= ?3 THEN 1 ELSE rate_limits.count + 1 END,
                expires_at = ?2
            WHERE rate_limits.expires_at <= ?3 OR rate_limits.count < ?4
            RETURNING count
            "#,
        )
        .bind(key)
        .bind(expires_at)
        .bind(now)
        .bind(limit as i64)
        .fetch_optional(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(count.map(|c| c as u32))
    }

    async fn current(&self, key: &str, now: i64) -> Result<u32> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT count FROM rate_limits WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(count.unwrap_or(0) as u32)
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rate_limits WHERE expires_at <= ?")
            .bind(now)
            .execute(self.db.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    expires_at: i64,
}

/// In-process counter store for single-process deployments and tests
#[derive(Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment_below(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: i64,
    ) -> Result<Option<u32>> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let live = windows
            .get(key)
            .filter(|w| w.expires_at > now)
            .map(|w| w.count)
            .unwrap_or(0);

        if live >= limit {
            return Ok(None);
        }

        let count = live + 1;
        windows.insert(
            key.to_string(),
            Window {
                count,
                expires_at: now + window.as_millis() as i64,
            },
        );
        Ok(Some(count))
    }

    async fn current(&self, key: &str, now: i64) -> Result<u32> {
        let windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(windows
            .get(key)
            .filter(|w| w.expires_at > now)
            .map(|w| w.count)
            .unwrap_or(0))
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let before = windows.len();
        windows.retain(|_, w| w.expires_at > now);
        Ok((before - windows.len()) as u64)
    }
}

/// Per-client request limiter
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, max_requests: u32, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window,
        }
    }

    /// Store key for a client
    pub fn key_for(client_id: &str) -> String {
        format!("rate_limit:{}", client_id)
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check and record one request for `client_id`
    pub async fn is_allowed(&self, client_id: &str) -> bool {
        self.is_allowed_at(client_id, now_millis()).await
    }

    /// Same as [`is_allowed`](Self::is_allowed) with an explicit clock.
    ///
    /// Returns false when the store fails; the limiter never fails open.
    pub async fn is_allowed_at(&self, client_id: &str, now: i64) -> bool {
        let key = Self::key_for(client_id);
        match self
            .store
            .increment_below(&key, self.max_requests, self.window, now)
            .await
        {
            Ok(Some(count)) => {
                debug!(client_id, count, limit = self.max_requests, "Request allowed");
                true
            }
            Ok(None) => {
                warn!(client_id, limit = self.max_requests, "Rate limit exceeded");
                false
            }
            Err(e) => {
                error!(client_id, error = %e, "Rate limiter store error, denying request");
                false
            }
        }
    }

    /// Requests left in the client's current window
    pub async fn remaining(&self, client_id: &str) -> Result<u32> {
        let used = self
            .store
            .current(&Self::key_for(client_id), now_millis())
            .await?;
        Ok(self.max_requests.saturating_sub(used))
    }

    /// Drop expired windows from the store
    pub async fn purge_expired(&self) -> Result<u64> {
        self.store.purge_expired(now_millis()).await
    }
}
