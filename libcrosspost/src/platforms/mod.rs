//! Publish clients and the platform catalog
//!
//! A [`PublishClient`] performs exactly one outbound publish attempt. Retries,
//! timeouts and bookkeeping belong to the worker pool, not to the client.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libcrosspost::platforms::{PlatformRegistry, mock::MockPublishClient};
//!
//! let mut registry = PlatformRegistry::new();
//! registry.register(Arc::new(MockPublishClient::success("Twitter")));
//! assert_eq!(registry.names(), vec!["Twitter".to_string()]);
//! ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::PlatformsConfig;
use crate::error::Result;
use crate::types::PublishJob;

pub mod http;
pub mod mock;

/// Platforms with a built-in payload format and optimization prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformKind {
    Twitter,
    Threads,
    LinkedIn,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 3] = [
        PlatformKind::Twitter,
        PlatformKind::Threads,
        PlatformKind::LinkedIn,
    ];

    /// Canonical name used in job rows and API responses
    pub fn name(&self) -> &'static str {
        match self {
            PlatformKind::Twitter => "Twitter",
            PlatformKind::Threads => "Threads",
            PlatformKind::LinkedIn => "LinkedIn",
        }
    }

    pub fn max_length(&self) -> usize {
        match self {
            PlatformKind::Twitter => 280,
            PlatformKind::Threads => 500,
            PlatformKind::LinkedIn => 1300,
        }
    }

    pub(crate) fn env_prefix(&self) -> &'static str {
        match self {
            PlatformKind::Twitter => "TWITTER",
            PlatformKind::Threads => "THREADS",
            PlatformKind::LinkedIn => "LINKEDIN",
        }
    }

    pub fn default_api_url(&self) -> &'static str {
        match self {
            PlatformKind::Twitter => "https://api.twitter.com/2/tweets",
            PlatformKind::Threads => "https://graph.threads.net/v1.0/me/threads",
            PlatformKind::LinkedIn => "https://api.linkedin.com/v2/ugcPosts",
        }
    }

    /// Rewrite instructions handed to the content optimizer
    pub fn prompt(&self, content: &str) -> String {
        let guidance = match self {
            PlatformKind::Twitter => {
                "Optimize this content for Twitter (X):\n\
                 - Keep it under 280 characters\n\
                 - Make it engaging and shareable\n\
                 - Include relevant hashtags if appropriate\n\
                 - Maintain the core message"
            }
            PlatformKind::Threads => {
                "Optimize this content for Instagram Threads:\n\
                 - Keep it under 500 characters\n\
                 - Make it conversational and authentic\n\
                 - Focus on storytelling\n\
                 - Maintain the core message"
            }
            PlatformKind::LinkedIn => {
                "Optimize this content for LinkedIn:\n\
                 - Keep it under 1300 characters\n\
                 - Make it professional and insightful\n\
                 - Encourage engagement through questions or calls to action\n\
                 - Maintain the core message"
            }
        };
        format!(
            "You are a social media expert. {}\n\nReply with the rewritten post only.\n\nContent: {}",
            guidance, content
        )
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "twitter" | "x" => Ok(PlatformKind::Twitter),
            "threads" => Ok(PlatformKind::Threads),
            "linkedin" => Ok(PlatformKind::LinkedIn),
            _ => Err(format!("Unknown platform: '{}'", s)),
        }
    }
}

/// One outbound publish attempt to one platform
///
/// Delivery is at-least-once: a worker that crashes after publishing but
/// before recording the result causes the same job to be published again.
/// Implementations should use `job.id` to make duplicates harmless where the
/// platform allows it.
#[async_trait]
pub trait PublishClient: Send + Sync {
    /// Canonical platform name jobs are routed by
    fn name(&self) -> &str;

    /// Maximum post length, if the platform has one
    fn character_limit(&self) -> Option<usize>;

    /// Publish the job's content, returning the platform's response body
    ///
    /// # Errors
    ///
    /// Transient failures (network, throttling, 5xx) and permanent ones
    /// (authentication, rejected payload) are distinguished by the
    /// `PlatformError` variant; see [`crate::error::PlatformError::is_transient`].
    async fn publish(&self, job: &PublishJob) -> Result<serde_json::Value>;
}

/// Publish clients keyed by platform name
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    clients: BTreeMap<String, Arc<dyn PublishClient>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build HTTP clients for every enabled platform in the configuration
    pub fn from_config(platforms: &PlatformsConfig, timeout: Duration) -> Result<Self> {
        let mut registry = Self::new();
        for kind in platforms.enabled() {
            if let Some(endpoint) = platforms.get(kind) {
                let client = http::HttpPublishClient::new(kind, endpoint, timeout)?;
                registry.register(Arc::new(client));
            }
        }
        Ok(registry)
    }

    /// Add a client, replacing any previous client with the same name
    pub fn register(&mut self, client: Arc<dyn PublishClient>) {
        self.clients.insert(client.name().to_string(), client);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PublishClient>> {
        self.clients.get(name).cloned()
    }

    /// Map a user-supplied platform name onto a registered one, ignoring case
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.clients
            .keys()
            .find(|registered| registered.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    /// Registered platform names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockPublishClient;
    use super::*;
    use crate::config::PlatformEndpointConfig;

    #[test]
    fn test_platform_kind_parse() {
        assert_eq!("Twitter".parse::<PlatformKind>().unwrap(), PlatformKind::Twitter);
        assert_eq!("x".parse::<PlatformKind>().unwrap(), PlatformKind::Twitter);
        assert_eq!(" threads ".parse::<PlatformKind>().unwrap(), PlatformKind::Threads);
        assert_eq!("LINKEDIN".parse::<PlatformKind>().unwrap(), PlatformKind::LinkedIn);
        assert!("myspace".parse::<PlatformKind>().is_err());
    }

    #[test]
    fn test_platform_limits() {
        assert_eq!(PlatformKind::Twitter.max_length(), 280);
        assert_eq!(PlatformKind::Threads.max_length(), 500);
        assert_eq!(PlatformKind::LinkedIn.max_length(), 1300);
    }

    #[test]
    fn test_prompt_embeds_content() {
        let prompt = PlatformKind::LinkedIn.prompt("We shipped v2");
        assert!(prompt.contains("LinkedIn"));
        assert!(prompt.ends_with("Content: We shipped v2"));
    }

    #[test]
    fn test_registry_resolve_ignores_case() {
        let mut registry = PlatformRegistry::new();
        registry.register(Arc::new(MockPublishClient::success("Twitter")));
        registry.register(Arc::new(MockPublishClient::success("Threads")));

        assert_eq!(registry.resolve("twitter"), Some("Twitter"));
        assert_eq!(registry.resolve("THREADS"), Some("Threads"));
        assert_eq!(registry.resolve("LinkedIn"), None);
        assert_eq!(registry.names(), vec!["Threads", "Twitter"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registry_from_config_skips_platforms_without_tokens() {
        let platforms = PlatformsConfig {
            twitter: Some(PlatformEndpointConfig {
                enabled: true,
                api_url: Some("http://localhost:1/tweets".to_string()),
                access_token: Some("token".to_string()),
                app_id: None,
                person_urn: None,
            }),
            threads: Some(PlatformEndpointConfig {
                enabled: true,
                api_url: None,
                access_token: None,
                app_id: None,
                person_urn: None,
            }),
            linkedin: None,
        };

        let registry = PlatformRegistry::from_config(&platforms, Duration::from_secs(1)).unwrap();
        assert_eq!(registry.names(), vec!["Twitter"]);
    }
}
