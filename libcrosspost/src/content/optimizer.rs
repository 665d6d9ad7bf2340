//! Per-platform content rewriting
//!
//! [`LlmOptimizer`] asks a messages-style LLM endpoint to rewrite a post for a
//! platform; [`TruncatingOptimizer`] only enforces the platform's length
//! limit. Either can be wrapped in a [`CachedOptimizer`], which bounds memory
//! by entry count and age.

use async_trait::async_trait;
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::OptimizerConfig;
use crate::error::{ConfigError, CrosspostError, PlatformError, Result};
use crate::platforms::PlatformKind;
use crate::retry::RetryPolicy;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[async_trait]
pub trait ContentOptimizer: Send + Sync {
    /// Rewrite `content` for `platform`
    ///
    /// # Errors
    ///
    /// Returns [`CrosspostError::Optimization`]; the caller skips the platform.
    async fn optimize(&self, content: &str, platform: &str) -> Result<String>;
}

/// First `max` characters of `content`
pub fn truncate_chars(content: &str, max: usize) -> String {
    match content.char_indices().nth(max) {
        Some((idx, _)) => content[..idx].to_string(),
        None => content.to_string(),
    }
}

fn optimization_error(platform: &str, message: impl Into<String>) -> CrosspostError {
    CrosspostError::Optimization {
        platform: platform.to_string(),
        message: message.into(),
    }
}

/// Trims content to the platform's character limit, leaving unknown
/// platforms untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct TruncatingOptimizer;

#[async_trait]
impl ContentOptimizer for TruncatingOptimizer {
    async fn optimize(&self, content: &str, platform: &str) -> Result<String> {
        Ok(match platform.parse::<PlatformKind>() {
            Ok(kind) => truncate_chars(content, kind.max_length()),
            Err(_) => content.to_string(),
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

pub struct LlmOptimizer {
    client: reqwest::Client,
    api_url: String,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryPolicy,
}

impl LlmOptimizer {
    pub fn from_config(config: &OptimizerConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingField("optimizer.api_key".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "optimizer".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: SecretString::from(api_key),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            retry: RetryPolicy {
                max_retries: 2,
                initial_delay: Duration::from_secs(1),
                multiplier: 2.0,
                max_delay: Duration::from_secs(4),
            },
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request(&self, prompt: &str) -> Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![Message {
                role: "user",
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("optimizer returned HTTP {}", status.as_u16());
            return Err(match status.as_u16() {
                429 => PlatformError::RateLimit(message),
                s if status.is_server_error() => PlatformError::Server { status: s, message },
                _ => PlatformError::Posting(message),
            }
            .into());
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Posting(format!("malformed optimizer response: {}", e)))?;

        let text: String = parsed.content.into_iter().filter_map(|b| b.text).collect();
        Ok(text)
    }
}

#[async_trait]
impl ContentOptimizer for LlmOptimizer {
    async fn optimize(&self, content: &str, platform: &str) -> Result<String> {
        let kind: PlatformKind = platform
            .parse()
            .map_err(|_| optimization_error(platform, "no optimization prompt for this platform"))?;
        let prompt = kind.prompt(content);

        let label = format!("{} optimization", kind);
        let text = self
            .retry
            .execute(&label, |_| self.request(&prompt))
            .await
            .map_err(|e| optimization_error(platform, e.to_string()))?;

        let optimized = text.trim();
        if optimized.is_empty() {
            return Err(optimization_error(platform, "optimizer returned empty content"));
        }
        debug!(platform = %kind, "Optimized content");
        Ok(truncate_chars(optimized, kind.max_length()))
    }
}

/// Memoizes another optimizer by `(content, platform)`
///
/// Concurrent misses for the same key share one call to the inner optimizer.
/// Failures are not cached.
pub struct CachedOptimizer {
    inner: Arc<dyn ContentOptimizer>,
    cache: Cache<(String, String), String>,
}

impl CachedOptimizer {
    pub fn new(inner: Arc<dyn ContentOptimizer>, max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }
}

#[async_trait]
impl ContentOptimizer for CachedOptimizer {
    async fn optimize(&self, content: &str, platform: &str) -> Result<String> {
        let key = (content.to_string(), platform.to_string());
        self.cache
            .try_get_with(key, self.inner.optimize(content, platform))
            .await
            .map_err(|e| match e.as_ref() {
                CrosspostError::Optimization { platform, message } => CrosspostError::Optimization {
                    platform: platform.clone(),
                    message: message.clone(),
                },
                other => optimization_error(platform, other.to_string()),
            })
    }
}
