//! JSON-over-HTTPS publish client for the built-in platforms
//!
//! Each platform gets one POST with a bearer token. Payload shape and extra
//! headers depend on the platform; response status decides whether a failure
//! is worth retrying.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::PlatformEndpointConfig;
use crate::error::{ConfigError, PlatformError, Result};
use crate::platforms::{PlatformKind, PublishClient};
use crate::types::PublishJob;

/// Longest slice of an error body kept in error messages
const MAX_ERROR_BODY: usize = 200;

pub struct HttpPublishClient {
    kind: PlatformKind,
    client: reqwest::Client,
    api_url: String,
    access_token: SecretString,
    app_id: Option<String>,
    person_urn: Option<String>,
    timeout: Duration,
}

impl HttpPublishClient {
    pub fn new(kind: PlatformKind, endpoint: &PlatformEndpointConfig, timeout: Duration) -> Result<Self> {
        let config_key = kind.name().to_lowercase();
        let access_token = endpoint.access_token.clone().ok_or_else(|| {
            ConfigError::MissingField(format!("platforms.{}.access_token", config_key))
        })?;

        if kind == PlatformKind::LinkedIn && endpoint.person_urn.is_none() {
            return Err(ConfigError::MissingField("platforms.linkedin.person_urn".to_string()).into());
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: format!("platforms.{}", config_key),
                message: e.to_string(),
            })?;

        Ok(Self {
            kind,
            client,
            api_url: endpoint
                .api_url
                .clone()
                .unwrap_or_else(|| kind.default_api_url().to_string()),
            access_token: SecretString::from(access_token),
            app_id: endpoint.app_id.clone(),
            person_urn: endpoint.person_urn.clone(),
            timeout,
        })
    }

    /// Request body in the platform's format
    pub fn build_payload(&self, content: &str) -> Value {
        match self.kind {
            PlatformKind::Twitter => json!({ "text": content }),
            PlatformKind::Threads => match &self.app_id {
                Some(app_id) => json!({ "app_id": app_id, "content": content }),
                None => json!({ "content": content }),
            },
            PlatformKind::LinkedIn => json!({
                "author": format!("urn:li:person:{}", self.person_urn.as_deref().unwrap_or_default()),
                "lifecycleState": "PUBLISHED",
                "specificContent": {
                    "com.linkedin.ugc.ShareContent": {
                        "shareCommentary": { "text": content },
                        "shareMediaCategory": "NONE"
                    }
                },
                "visibility": {
                    "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
                }
            }),
        }
    }

    fn map_send_error(&self, error: reqwest::Error) -> PlatformError {
        if error.is_timeout() {
            PlatformError::Timeout(self.timeout.as_secs())
        } else {
            PlatformError::Network(format!("{} request failed: {}", self.kind, error))
        }
    }
}

/// Classify a non-success response
pub fn classify_status(platform: PlatformKind, status: StatusCode, body: &str) -> PlatformError {
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();
    let message = format!("{} returned HTTP {}: {}", platform, status.as_u16(), body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Authentication(message),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimit(message),
        StatusCode::REQUEST_TIMEOUT => PlatformError::Network(message),
        s if s.is_server_error() => PlatformError::Server {
            status: s.as_u16(),
            message,
        },
        _ => PlatformError::Posting(message),
    }
}

#[async_trait]
impl PublishClient for HttpPublishClient {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn character_limit(&self) -> Option<usize> {
        Some(self.kind.max_length())
    }

    async fn publish(&self, job: &PublishJob) -> Result<Value> {
        debug!(job_id = %job.id, platform = %self.kind, url = %self.api_url, "Sending publish request");

        let mut request = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&self.build_payload(&job.content));

        if self.kind == PlatformKind::LinkedIn {
            request = request.header("X-Restli-Protocol-Version", "2.0.0");
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            return Err(classify_status(self.kind, status, &body).into());
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrosspostError;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(url: &str) -> PlatformEndpointConfig {
        PlatformEndpointConfig {
            enabled: true,
            api_url: Some(url.to_string()),
            access_token: Some("secret-token".to_string()),
            app_id: Some("app-123".to_string()),
            person_urn: Some("abc".to_string()),
        }
    }

    fn client(kind: PlatformKind, server: &MockServer) -> HttpPublishClient {
        let url = format!("{}/publish", server.uri());
        HttpPublishClient::new(kind, &endpoint(&url), Duration::from_secs(2)).unwrap()
    }

    fn platform_error(result: Result<Value>) -> PlatformError {
        match result {
            Err(CrosspostError::Platform(e)) => e,
            other => panic!("Expected platform error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_twitter_publish_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/publish"))
            .and(header("authorization", "Bearer secret-token"))
            .and(body_partial_json(json!({ "text": "hello" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "data": { "id": "1" } })))
            .expect(1)
            .mount(&server)
            .await;

        let job = PublishJob::new("Twitter", "hello", "c1");
        let payload = client(PlatformKind::Twitter, &server).publish(&job).await.unwrap();
        assert_eq!(payload["data"]["id"], "1");
    }

    #[tokio::test]
    async fn test_linkedin_sends_restli_header_and_ugc_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-Restli-Protocol-Version", "2.0.0"))
            .and(body_partial_json(json!({
                "author": "urn:li:person:abc",
                "lifecycleState": "PUBLISHED"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let job = PublishJob::new("LinkedIn", "insight", "c1");
        let payload = client(PlatformKind::LinkedIn, &server).publish(&job).await.unwrap();
        assert_eq!(payload, Value::Null);
    }

    #[tokio::test]
    async fn test_threads_payload_includes_app_id() {
        let server = MockServer::start().await;
        let client = client(PlatformKind::Threads, &server);
        assert_eq!(
            client.build_payload("story"),
            json!({ "app_id": "app-123", "content": "story" })
        );
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let job = PublishJob::new("Twitter", "hello", "c1");
        let error = platform_error(client(PlatformKind::Twitter, &server).publish(&job).await);
        assert!(matches!(error, PlatformError::Server { status: 503, .. }));
        assert!(error.is_transient());
        assert!(error.to_string().contains("maintenance"));
    }

    #[tokio::test]
    async fn test_unauthorized_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let job = PublishJob::new("Twitter", "hello", "c1");
        let error = platform_error(client(PlatformKind::Twitter, &server).publish(&job).await);
        assert!(matches!(error, PlatformError::Authentication(_)));
        assert!(!error.is_transient());
    }

    #[tokio::test]
    async fn test_throttled_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let job = PublishJob::new("Threads", "hello", "c1");
        let error = platform_error(client(PlatformKind::Threads, &server).publish(&job).await);
        assert!(matches!(error, PlatformError::RateLimit(_)));
        assert!(error.is_transient());
    }

    #[tokio::test]
    async fn test_bad_request_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("duplicate content"))
            .mount(&server)
            .await;

        let job = PublishJob::new("Twitter", "hello", "c1");
        let error = platform_error(client(PlatformKind::Twitter, &server).publish(&job).await);
        assert!(matches!(error, PlatformError::Posting(_)));
        assert!(!error.is_transient());
    }

    #[tokio::test]
    async fn test_slow_platform_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let url = format!("{}/publish", server.uri());
        let client =
            HttpPublishClient::new(PlatformKind::Twitter, &endpoint(&url), Duration::from_millis(200))
                .unwrap();

        let job = PublishJob::new("Twitter", "hello", "c1");
        let error = platform_error(client.publish(&job).await);
        assert!(matches!(error, PlatformError::Timeout(_)));
        assert!(error.is_transient());
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let mut config = endpoint("http://localhost");
        config.access_token = None;
        let result = HttpPublishClient::new(PlatformKind::Twitter, &config, Duration::from_secs(1));
        assert!(matches!(result, Err(CrosspostError::Config(_))));
    }

    #[test]
    fn test_linkedin_requires_person_urn() {
        let mut config = endpoint("http://localhost");
        config.person_urn = None;
        let result = HttpPublishClient::new(PlatformKind::LinkedIn, &config, Duration::from_secs(1));
        assert!(matches!(result, Err(CrosspostError::Config(_))));
    }

    #[test]
    fn test_error_body_is_truncated() {
        let body = "x".repeat(1000);
        let error = classify_status(PlatformKind::Twitter, StatusCode::BAD_REQUEST, &body);
        assert!(error.to_string().len() < 300);
    }
}
