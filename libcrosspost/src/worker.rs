//! Worker pool that drains the job queue
//!
//! Each worker claims one job at a time, publishes it under a timeout and
//! records the outcome. Failed attempts go back on the queue with a delay
//! chosen by the [`RetryPolicy`]; workers never sleep through a backoff.
//! Cancellation is checked between jobs, so an in-flight publish finishes
//! (bounded by the publish timeout) before a worker exits.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{PlatformError, Result};
use crate::events::{EventBus, JobEvent};
use crate::platforms::PlatformRegistry;
use crate::queue::JobQueue;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::types::{JobStatus, PublishJob};

#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    queue: JobQueue,
    registry: PlatformRegistry,
    policy: RetryPolicy,
    publish_timeout: Duration,
    poll_interval: Duration,
    events: EventBus,
}

/// Running workers
pub struct WorkerPoolHandle {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit after cancellation
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Worker task panicked: {}", e);
            }
        }
    }
}

impl WorkerPool {
    pub fn new(
        queue: JobQueue,
        registry: PlatformRegistry,
        policy: RetryPolicy,
        publish_timeout: Duration,
        poll_interval: Duration,
        events: EventBus,
    ) -> Self {
        let max_attempts = policy.max_retries + 1;
        Self {
            inner: Arc::new(PoolInner {
                queue: queue.with_max_attempts(max_attempts),
                registry,
                policy,
                publish_timeout,
                poll_interval,
                events,
            }),
        }
    }

    /// Start `size` workers that run until `token` is cancelled
    pub fn spawn(&self, size: usize, token: CancellationToken) -> WorkerPoolHandle {
        let pid = std::process::id();
        let handles = (0..size)
            .map(|n| {
                let pool = self.clone();
                let token = token.clone();
                let worker_id = format!("worker-{}-{}", pid, n);
                tokio::spawn(async move { pool.run_worker(worker_id, token).await })
            })
            .collect();

        info!(workers = size, "Worker pool started");
        WorkerPoolHandle { handles }
    }

    async fn run_worker(&self, worker_id: String, token: CancellationToken) {
        debug!(worker_id, "Worker started");
        let poll_interval = self.inner.poll_interval;

        while !token.is_cancelled() {
            match self.process_next(&worker_id).await {
                Ok(Some(_)) => continue,
                Ok(None) => {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = self.inner.queue.wait_for_work(poll_interval) => {}
                    }
                }
                Err(e) => {
                    error!(worker_id, "Failed to claim job: {}", e);
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }

        debug!(worker_id, "Worker stopped");
    }

    /// Claim and process one ready job, returning its new status
    pub async fn process_next(&self, worker_id: &str) -> Result<Option<JobStatus>> {
        match self.inner.queue.claim(worker_id).await? {
            Some(job) => self.process(worker_id, job).await.map(Some),
            None => Ok(None),
        }
    }

    /// Process ready jobs until none are left, returning how many were handled
    pub async fn drain(&self, worker_id: &str) -> Result<usize> {
        let mut processed = 0;
        while self.process_next(worker_id).await?.is_some() {
            processed += 1;
        }
        Ok(processed)
    }

    /// Publish one claimed job and record the outcome
    ///
    /// Returns `InProgress` when the lease was lost before the outcome could
    /// be recorded; the job then belongs to whichever worker holds it now.
    async fn process(&self, worker_id: &str, job: PublishJob) -> Result<JobStatus> {
        let inner = &self.inner;
        let max_attempts = inner.policy.max_retries + 1;

        if job.attempt > max_attempts {
            error!(
                job_id = %job.id,
                platform = %job.platform,
                attempt = job.attempt,
                max_attempts,
                "Attempt limit already reached, not publishing"
            );
            let message = format!("Attempt limit of {} reached", max_attempts);
            return self.record_failure(worker_id, job, message).await;
        }

        inner.events.emit(JobEvent::Started {
            job_id: job.id,
            platform: job.platform.clone(),
            attempt: job.attempt,
        });

        let outcome = match inner.registry.get(&job.platform) {
            Some(client) => match timeout(inner.publish_timeout, client.publish(&job)).await {
                Ok(result) => result,
                Err(_) => Err(PlatformError::Timeout(inner.publish_timeout.as_secs()).into()),
            },
            None => Err(PlatformError::Unsupported(job.platform.clone()).into()),
        };

        match outcome {
            Ok(payload) => {
                if !inner.queue.complete(job.id, worker_id, &payload).await? {
                    debug!(job_id = %job.id, worker_id, "Published, but the job was taken over; outcome not recorded");
                    return Ok(JobStatus::InProgress);
                }
                info!(job_id = %job.id, platform = %job.platform, attempt = job.attempt, "Published");
                inner.events.emit(JobEvent::Succeeded {
                    job_id: job.id,
                    platform: job.platform,
                    attempt: job.attempt,
                });
                Ok(JobStatus::Succeeded)
            }
            Err(e) => match inner.policy.decide(job.attempt, &e) {
                RetryDecision::Retry { delay } => {
                    let message = e.to_string();
                    if !inner.queue.schedule_retry(job.id, worker_id, &message, delay).await? {
                        debug!(job_id = %job.id, worker_id, "Retry not scheduled, the job was taken over");
                        return Ok(JobStatus::InProgress);
                    }
                    warn!(
                        job_id = %job.id,
                        platform = %job.platform,
                        "Transient error publishing (attempt {}/{}): {}. Retrying in {:?}",
                        job.attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    inner.events.emit(JobEvent::Retrying {
                        job_id: job.id,
                        platform: job.platform,
                        attempt: job.attempt,
                        delay_ms: delay.as_millis() as u64,
                        error: message,
                    });
                    Ok(JobStatus::Retrying)
                }
                RetryDecision::GiveUp => {
                    error!(
                        job_id = %job.id,
                        platform = %job.platform,
                        "Publishing failed after {} attempt(s): {}",
                        job.attempt,
                        e
                    );
                    self.record_failure(worker_id, job, e.to_string()).await
                }
            },
        }
    }

    async fn record_failure(&self, worker_id: &str, job: PublishJob, message: String) -> Result<JobStatus> {
        let inner = &self.inner;
        if !inner.queue.fail_permanent(job.id, worker_id, &message).await? {
            debug!(job_id = %job.id, worker_id, "Failure not recorded, the job was taken over");
            return Ok(JobStatus::InProgress);
        }
        inner.events.emit(JobEvent::Failed {
            job_id: job.id,
            platform: job.platform,
            attempt: job.attempt,
            error: message,
        });
        Ok(JobStatus::Failed)
    }
}
