//! Crosspost - rate-limited publishing to several social platforms
//!
//! A request is checked against a per-client fixed-window limit, validated,
//! optimized per platform and split into one durable job per platform. A pool
//! of workers drains the jobs, retrying transient failures with backoff.

pub mod config;
pub mod content;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod logging;
pub mod platforms;
pub mod queue;
pub mod rate_limiter;
pub mod retry;
pub mod server;
pub mod service;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use dispatcher::{Dispatcher, Submission};
pub use error::{CrosspostError, Result};
pub use queue::{JobFilter, JobQueue, QueueStats};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use service::CrosspostService;
pub use types::{JobRecord, JobResult, JobStatus, PublishJob};
pub use worker::WorkerPool;
