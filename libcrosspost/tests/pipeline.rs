//! End-to-end tests: submit through the dispatcher, drain with workers

use libcrosspost::error::PlatformError;
use libcrosspost::platforms::mock::MockPublishClient;
use libcrosspost::platforms::{PlatformRegistry, PublishClient};
use libcrosspost::{Config, CrosspostError, CrosspostService, JobStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const POST: &str =
    "We are happy to announce that the new version of our application is now available for everyone.";

fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.database.path = temp_dir
        .path()
        .join("pipeline.db")
        .to_string_lossy()
        .to_string();
    config.retry.initial_delay_secs = 0;
    config.queue.poll_interval_ms = 20;
    config
}

async fn service_with(config: Config, clients: &[MockPublishClient]) -> CrosspostService {
    let mut registry = PlatformRegistry::new();
    for client in clients {
        registry.register(Arc::new(client.clone()));
    }
    CrosspostService::with_registry(config, registry).await.unwrap()
}

#[tokio::test]
async fn slow_platform_does_not_delay_submission() {
    let temp_dir = TempDir::new().unwrap();
    let slow = MockPublishClient::with_delay("Twitter", Duration::from_secs(2));
    let service = service_with(test_config(&temp_dir), &[slow.clone()]).await;

    let started = Instant::now();
    let submission = service.dispatcher().submit_all("c1", POST).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(slow.call_count(), 0);

    let job_id = submission.tasks["Twitter"];
    assert_eq!(
        service.queue().get(job_id).await.unwrap().unwrap().status,
        JobStatus::Queued
    );

    service.worker_pool().drain("w1").await.unwrap();
    assert!(service.queue().result(job_id).await.unwrap().unwrap().is_success());
}

#[tokio::test]
async fn one_failing_platform_does_not_affect_another() {
    let temp_dir = TempDir::new().unwrap();
    let twitter = MockPublishClient::success("Twitter");
    let threads = MockPublishClient::failure(
        "Threads",
        PlatformError::Authentication("token revoked".to_string()),
    );
    let service = service_with(test_config(&temp_dir), &[twitter.clone(), threads.clone()]).await;

    let submission = service.dispatcher().submit_all("c1", POST).await.unwrap();
    assert_eq!(submission.tasks.len(), 2);

    assert_eq!(service.worker_pool().drain("w1").await.unwrap(), 2);

    let twitter_job = service.queue().get(submission.tasks["Twitter"]).await.unwrap().unwrap();
    let threads_job = service.queue().get(submission.tasks["Threads"]).await.unwrap().unwrap();
    assert_eq!(twitter_job.status, JobStatus::Succeeded);
    assert_eq!(threads_job.status, JobStatus::Failed);
    assert_eq!(threads_job.attempt, 1);
    assert_eq!(threads.call_count(), 1);
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let temp_dir = TempDir::new().unwrap();
    let flaky = MockPublishClient::fails_then_succeeds(
        "Twitter",
        2,
        PlatformError::Network("connection reset".to_string()),
    );
    let service = service_with(test_config(&temp_dir), &[flaky.clone()]).await;

    let submission = service.dispatcher().submit_all("c1", POST).await.unwrap();
    service.worker_pool().drain("w1").await.unwrap();

    let result = service
        .queue()
        .result(submission.tasks["Twitter"])
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_success());
    assert_eq!(result.attempt, 3);
    assert_eq!(flaky.call_count(), 3);
}

#[tokio::test]
async fn limit_applies_per_client_across_submissions() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    config.rate_limit.requests = 2;
    let service = service_with(config, &[MockPublishClient::success("Twitter")]).await;
    let dispatcher = service.dispatcher();

    dispatcher.submit_all("c1", POST).await.unwrap();
    dispatcher.submit_all("c1", POST).await.unwrap();
    let third = dispatcher.submit_all("c1", POST).await;
    assert!(matches!(third, Err(CrosspostError::RateLimitExceeded(_))));

    dispatcher.submit_all("c2", POST).await.unwrap();
    assert_eq!(service.queue().stats().await.unwrap().queued, 3);
}

#[tokio::test]
async fn crashed_worker_job_is_redelivered_once() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    config.publish.timeout_secs = 1;
    config.queue.lease_secs = 2;
    let client = MockPublishClient::idempotent("Twitter");
    let service = service_with(config, &[client.clone()]).await;

    let submission = service.dispatcher().submit_all("c1", POST).await.unwrap();
    let job_id = submission.tasks["Twitter"];

    // Worker publishes, then dies before recording the outcome
    let claimed = service.queue().claim("doomed").await.unwrap().unwrap();
    client.publish(&claimed).await.unwrap();

    assert_eq!(service.worker_pool().drain("w1").await.unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(2_200)).await;
    assert_eq!(service.worker_pool().drain("w1").await.unwrap(), 1);

    let record = service.queue().get(job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Succeeded);
    assert_eq!(record.attempt, 2);
    assert_eq!(client.posted_content().len(), 1);
    assert_eq!(client.duplicate_count(), 1);

    let late = service
        .queue()
        .complete(job_id, "doomed", &serde_json::json!({}))
        .await
        .unwrap();
    assert!(!late);
}
