//! Mock publish client for testing
//!
//! Simulates successes, scripted failure sequences and slow platforms so the
//! worker pool and dispatcher can be exercised without network access. Clones
//! share their counters, so a test can keep one handle and register another.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use crate::error::{PlatformError, Result};
use crate::platforms::PublishClient;
use crate::types::PublishJob;

/// Result of one scripted publish call
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Succeed,
    Fail(PlatformError),
}

/// Configuration for mock client behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name (e.g., "Twitter")
    pub name: String,

    /// Outcomes consumed one per call before falling back to `fallback`
    pub script: Arc<Mutex<VecDeque<MockOutcome>>>,

    /// Outcome once the script is exhausted
    pub fallback: MockOutcome,

    /// Delay before completing a call (simulates network latency)
    pub delay: Duration,

    pub character_limit: Option<usize>,

    /// Treat a second publish of the same job id as a no-op
    pub idempotent: bool,

    /// Number of times publish has been called
    pub call_count: Arc<Mutex<usize>>,

    /// Calls that were absorbed as duplicates
    pub duplicate_count: Arc<Mutex<usize>>,

    /// Content that was actually published
    pub posted_content: Arc<Mutex<Vec<String>>>,

    published: Arc<Mutex<HashMap<Uuid, Value>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: MockOutcome::Succeed,
            delay: Duration::ZERO,
            character_limit: None,
            idempotent: false,
            call_count: Arc::new(Mutex::new(0)),
            duplicate_count: Arc::new(Mutex::new(0)),
            posted_content: Arc::new(Mutex::new(Vec::new())),
            published: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockPublishClient {
    config: MockConfig,
}

impl MockPublishClient {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock client that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock client that always fails with `error`
    pub fn failure(name: &str, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            fallback: MockOutcome::Fail(error),
            ..Default::default()
        })
    }

    /// Create a mock client that fails `failures` times, then succeeds
    pub fn fails_then_succeeds(name: &str, failures: usize, error: PlatformError) -> Self {
        let script = (0..failures).map(|_| MockOutcome::Fail(error.clone())).collect();
        Self::new(MockConfig {
            name: name.to_string(),
            script: Arc::new(Mutex::new(script)),
            ..Default::default()
        })
    }

    /// Create a mock client that takes `delay` to answer
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Create a mock client that deduplicates by job id
    pub fn idempotent(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            idempotent: true,
            ..Default::default()
        })
    }

    pub fn call_count(&self) -> usize {
        *self.config.call_count.lock().unwrap()
    }

    pub fn duplicate_count(&self) -> usize {
        *self.config.duplicate_count.lock().unwrap()
    }

    pub fn posted_content(&self) -> Vec<String> {
        self.config.posted_content.lock().unwrap().clone()
    }

    fn next_outcome(&self) -> MockOutcome {
        self.config
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.config.fallback.clone())
    }
}

#[async_trait]
impl PublishClient for MockPublishClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn character_limit(&self) -> Option<usize> {
        self.config.character_limit
    }

    async fn publish(&self, job: &PublishJob) -> Result<Value> {
        *self.config.call_count.lock().unwrap() += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.idempotent {
            if let Some(payload) = self.config.published.lock().unwrap().get(&job.id) {
                *self.config.duplicate_count.lock().unwrap() += 1;
                return Ok(payload.clone());
            }
        }

        match self.next_outcome() {
            MockOutcome::Succeed => {
                let payload = json!({
                    "id": format!("{}:{}", self.config.name.to_lowercase(), job.id),
                    "platform": self.config.name,
                });
                self.config.posted_content.lock().unwrap().push(job.content.clone());
                self.config
                    .published
                    .lock()
                    .unwrap()
                    .insert(job.id, payload.clone());
                Ok(payload)
            }
            MockOutcome::Fail(error) => Err(error.into()),
        }
    }
}
