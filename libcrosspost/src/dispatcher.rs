//! Accepts a crosspost request and turns it into queued publish jobs
//!
//! Order of checks for one submission:
//!
//! 1. Rate limit for the client. Denied requests have no other effect.
//! 2. Content validation and platform resolution.
//! 3. Optimization for every requested platform, concurrently. A platform
//!    whose optimization fails is reported as skipped.
//! 4. One job per remaining platform, persisted before `submit` returns.
//!
//! Nothing here waits on a platform API.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::content::{ContentOptimizer, ContentValidator};
use crate::error::{CrosspostError, Result};
use crate::events::{EventBus, JobEvent};
use crate::platforms::PlatformRegistry;
use crate::queue::JobQueue;
use crate::rate_limiter::RateLimiter;
use crate::types::PublishJob;

/// Jobs created by one submission
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    /// Job id per platform
    pub tasks: BTreeMap<String, Uuid>,
    /// Reason per platform that got no job
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub skipped: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

pub struct Dispatcher {
    limiter: RateLimiter,
    validator: Arc<dyn ContentValidator>,
    optimizer: Arc<dyn ContentOptimizer>,
    queue: JobQueue,
    registry: PlatformRegistry,
    events: EventBus,
}

impl Dispatcher {
    pub fn new(
        limiter: RateLimiter,
        validator: Arc<dyn ContentValidator>,
        optimizer: Arc<dyn ContentOptimizer>,
        queue: JobQueue,
        registry: PlatformRegistry,
        events: EventBus,
    ) -> Self {
        Self {
            limiter,
            validator,
            optimizer,
            queue,
            registry,
            events,
        }
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    /// Submit `content` for every registered platform
    pub async fn submit_all(&self, client_id: &str, content: &str) -> Result<Submission> {
        let platforms = self.registry.names();
        self.submit(client_id, content, &platforms).await
    }

    /// Submit `content` for `platforms`
    ///
    /// # Errors
    ///
    /// - `RateLimitExceeded` when the client is over its limit
    /// - `Validation` when the content is rejected
    /// - `InvalidInput` for an empty or unknown platform list
    /// - `Optimization` when no platform could be optimized
    /// - `Database` when a job could not be persisted
    pub async fn submit(&self, client_id: &str, content: &str, platforms: &[String]) -> Result<Submission> {
        self.check_rate_limit(client_id).await?;

        self.validator.validate(content)?;
        let targets = self.resolve_platforms(platforms)?;

        let optimized = join_all(targets.iter().map(|platform| async move {
            (platform.clone(), self.optimizer.optimize(content, platform).await)
        }))
        .await;

        let mut skipped = BTreeMap::new();
        let mut ready = Vec::new();
        let mut last_error = None;
        for (platform, result) in optimized {
            match result {
                Ok(text) => ready.push((platform, text)),
                Err(e) => {
                    warn!(platform = %platform, "Skipping platform: {}", e);
                    skipped.insert(platform, e.to_string());
                    last_error = Some(e);
                }
            }
        }

        if ready.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                CrosspostError::InvalidInput("No platforms to publish to".to_string())
            }));
        }

        let mut tasks = BTreeMap::new();
        for (platform, text) in ready {
            let job = PublishJob::new(platform.as_str(), text, client_id);
            let id = self.queue.enqueue(&job).await?;
            self.events.emit(JobEvent::Enqueued {
                job_id: id,
                platform: platform.clone(),
                client_id: client_id.to_string(),
            });
            tasks.insert(platform, id);
        }

        info!(client_id, jobs = tasks.len(), skipped = skipped.len(), "Crosspost accepted");
        Ok(Submission {
            tasks,
            skipped,
            timestamp: Utc::now(),
        })
    }

    /// Count one request against `client_id`'s window
    ///
    /// `submit` does this itself; callers use it directly for requests that
    /// are rejected before reaching `submit` but still count.
    pub async fn check_rate_limit(&self, client_id: &str) -> Result<()> {
        if !self.limiter.is_allowed(client_id).await {
            warn!(client_id, "Rate limit exceeded");
            return Err(CrosspostError::RateLimitExceeded(client_id.to_string()));
        }
        Ok(())
    }

    /// Canonical, de-duplicated platform names
    fn resolve_platforms(&self, requested: &[String]) -> Result<Vec<String>> {
        if requested.is_empty() {
            return Err(CrosspostError::InvalidInput(
                "No platforms are configured".to_string(),
            ));
        }

        let mut resolved = BTreeSet::new();
        let mut unknown = Vec::new();
        for name in requested {
            match self.registry.resolve(name) {
                Some(canonical) => {
                    resolved.insert(canonical.to_string());
                }
                None => unknown.push(name.trim().to_string()),
            }
        }

        if !unknown.is_empty() {
            return Err(CrosspostError::InvalidInput(format!(
                "Unknown platform(s): {}",
                unknown.join(", ")
            )));
        }
        Ok(resolved.into_iter().collect())
    }
}
