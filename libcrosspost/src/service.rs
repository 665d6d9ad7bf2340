//! Service facade wiring the pipeline together
//!
//! `CrosspostService` owns the shared resources (database, limiter, queue,
//! platform registry, event bus) and hands out the pieces each binary needs:
//! the dispatcher and HTTP state for the API, the worker pool for workers,
//! the queue for operator tooling.
//!
//! # Example
//!
//! ```no_run
//! use libcrosspost::service::CrosspostService;
//!
//! # async fn example() -> libcrosspost::Result<()> {
//! let service = CrosspostService::new().await?;
//! let submission = service
//!     .dispatcher()
//!     .submit_all("default", "Hello from every network")
//!     .await?;
//! println!("Queued {} jobs", submission.tasks.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::content::{CachedOptimizer, ContentOptimizer, DefaultValidator, LlmOptimizer, TruncatingOptimizer};
use crate::db::Database;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::events::{EventBus, EventReceiver};
use crate::platforms::PlatformRegistry;
use crate::queue::JobQueue;
use crate::rate_limiter::{RateLimiter, SqliteCounterStore};
use crate::retry::RetryPolicy;
use crate::server::AppState;
use crate::worker::WorkerPool;

pub struct CrosspostService {
    config: Arc<Config>,
    db: Database,
    limiter: RateLimiter,
    queue: JobQueue,
    registry: PlatformRegistry,
    dispatcher: Arc<Dispatcher>,
    event_bus: EventBus,
}

impl CrosspostService {
    /// Load configuration from the default location and build the service
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Build the service with HTTP publish clients for the configured platforms
    pub async fn from_config(config: Config) -> Result<Self> {
        let registry = PlatformRegistry::from_config(&config.platforms, config.publish.timeout())?;
        Self::with_registry(config, registry).await
    }

    /// Build the service around an explicit set of publish clients
    pub async fn with_registry(config: Config, registry: PlatformRegistry) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;
        let event_bus = EventBus::new(100);

        let limiter = RateLimiter::new(
            Arc::new(SqliteCounterStore::new(db.clone())),
            config.rate_limit.requests,
            config.rate_limit.window(),
        );
        let queue = JobQueue::new(db.clone(), config.queue.lease())
            .with_max_attempts(config.retry.max_retries + 1);

        let base: Arc<dyn ContentOptimizer> = if config.optimizer.enabled {
            Arc::new(LlmOptimizer::from_config(&config.optimizer)?)
        } else {
            Arc::new(TruncatingOptimizer)
        };
        let optimizer = Arc::new(CachedOptimizer::new(
            base,
            config.optimizer.cache_capacity,
            std::time::Duration::from_secs(config.optimizer.cache_ttl_secs),
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            limiter.clone(),
            Arc::new(DefaultValidator::from_config(&config.validation)),
            optimizer,
            queue.clone(),
            registry.clone(),
            event_bus.clone(),
        ));

        info!(
            platforms = ?registry.names(),
            llm_optimizer = config.optimizer.enabled,
            "Crosspost service ready"
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            limiter,
            queue,
            registry,
            dispatcher,
            event_bus,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Worker pool draining this service's queue
    pub fn worker_pool(&self) -> WorkerPool {
        WorkerPool::new(
            self.queue.clone(),
            self.registry.clone(),
            RetryPolicy::from_config(&self.config.retry),
            self.config.publish.timeout(),
            self.config.queue.poll_interval(),
            self.event_bus.clone(),
        )
    }

    /// Shared state for the HTTP router
    pub fn app_state(&self) -> AppState {
        AppState::new(self.dispatcher(), self.queue.clone())
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockPublishClient;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.database.path = temp_dir.path().join("service.db").to_string_lossy().to_string();
        config
    }

    #[tokio::test]
    async fn test_from_config_without_platforms() {
        let temp_dir = TempDir::new().unwrap();
        let service = CrosspostService::from_config(test_config(&temp_dir)).await.unwrap();
        assert!(service.registry().is_empty());
        assert_eq!(service.limiter().max_requests(), 100);
    }

    #[tokio::test]
    async fn test_llm_optimizer_without_key_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        config.optimizer.enabled = true;
        config.optimizer.api_key = None;

        let result = CrosspostService::from_config(config).await;
        assert!(matches!(result, Err(crate::error::CrosspostError::Config(_))));
    }

    #[tokio::test]
    async fn test_submit_then_drain_with_mock_clients() {
        let temp_dir = TempDir::new().unwrap();
        let client = MockPublishClient::success("Twitter");
        let mut registry = PlatformRegistry::new();
        registry.register(Arc::new(client.clone()));

        let service = CrosspostService::with_registry(test_config(&temp_dir), registry)
            .await
            .unwrap();
        let mut events = service.subscribe();

        let content = "We are happy to announce that the new version of our application is now available.";
        let submission = service.dispatcher().submit_all("c1", content).await.unwrap();
        let job_id = submission.tasks["Twitter"];
        assert!(matches!(
            events.recv().await.unwrap(),
            crate::events::JobEvent::Enqueued { .. }
        ));

        let processed = service.worker_pool().drain("test").await.unwrap();
        assert_eq!(processed, 1);
        assert!(service.queue().result(job_id).await.unwrap().unwrap().is_success());
        assert_eq!(client.posted_content(), vec![content]);
    }
}
