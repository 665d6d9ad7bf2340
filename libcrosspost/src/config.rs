//! Configuration management for Crosspost
//!
//! Configuration is read from a TOML file and then overridden by environment
//! variables, so container deployments can run without a file at all.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::platforms::PlatformKind;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
    pub queue: QueueConfig,
    pub retry: RetryConfig,
    pub publish: PublishConfig,
    pub optimizer: OptimizerConfig,
    pub server: ServerConfig,
    pub validation: ValidationConfig,
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/crosspost/crosspost.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per client per window
    pub requests: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 100,
            window_secs: 3600,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of concurrent workers draining the queue
    pub workers: usize,
    /// How often an idle worker re-checks the queue
    pub poll_interval_ms: u64,
    /// How long a claimed job stays leased before it may be redelivered
    pub lease_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            poll_interval_ms: 1000,
            lease_secs: 300,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_secs: u64,
    pub multiplier: f64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_secs: 60,
            multiplier: 2.0,
            max_delay_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Hard timeout for a single outbound publish call
    pub timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl PublishConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Use the LLM endpoint; when false content is only trimmed to platform limits
    pub enabled: bool,
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub cache_capacity: u64,
    pub cache_ttl_secs: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key: None,
            model: "claude-3-5-sonnet-latest".to_string(),
            max_tokens: 300,
            temperature: 0.7,
            timeout_secs: 30,
            cache_capacity: 1024,
            cache_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub max_length: usize,
    pub prohibited_words: Vec<String>,
    pub allowed_languages: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_length: 1000,
            prohibited_words: Vec::new(),
            allowed_languages: ["en", "es", "fr", "de"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlatformsConfig {
    pub twitter: Option<PlatformEndpointConfig>,
    pub threads: Option<PlatformEndpointConfig>,
    pub linkedin: Option<PlatformEndpointConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformEndpointConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub api_url: Option<String>,
    pub access_token: Option<String>,
    /// Threads application id
    pub app_id: Option<String>,
    /// LinkedIn author URN suffix (`urn:li:person:{person_urn}`)
    pub person_urn: Option<String>,
}

fn default_true() -> bool {
    true
}

impl PlatformEndpointConfig {
    fn empty() -> Self {
        Self {
            enabled: true,
            api_url: None,
            access_token: None,
            app_id: None,
            person_urn: None,
        }
    }
}

impl PlatformsConfig {
    pub fn get(&self, kind: PlatformKind) -> Option<&PlatformEndpointConfig> {
        match kind {
            PlatformKind::Twitter => self.twitter.as_ref(),
            PlatformKind::Threads => self.threads.as_ref(),
            PlatformKind::LinkedIn => self.linkedin.as_ref(),
        }
    }

    fn get_or_insert(&mut self, kind: PlatformKind) -> &mut PlatformEndpointConfig {
        let slot = match kind {
            PlatformKind::Twitter => &mut self.twitter,
            PlatformKind::Threads => &mut self.threads,
            PlatformKind::LinkedIn => &mut self.linkedin,
        };
        slot.get_or_insert_with(PlatformEndpointConfig::empty)
    }

    /// Platforms that are enabled and have an access token
    pub fn enabled(&self) -> Vec<PlatformKind> {
        PlatformKind::ALL
            .into_iter()
            .filter(|kind| {
                self.get(*kind)
                    .is_some_and(|p| p.enabled && p.access_token.is_some())
            })
            .collect()
    }
}

impl Config {
    /// Load configuration from the default location, then apply environment
    /// overrides. A missing config file is not an error.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Apply environment-style overrides. `lookup` returns the value of a
    /// variable, so tests can supply a map instead of the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("CROSSPOST_DB_PATH") {
            self.database.path = path;
        }
        if let Some(v) = lookup("RATE_LIMIT_REQUESTS") {
            self.rate_limit.requests = parse_var("RATE_LIMIT_REQUESTS", &v)?;
        }
        if let Some(v) = lookup("RATE_LIMIT_WINDOW") {
            self.rate_limit.window_secs = parse_var("RATE_LIMIT_WINDOW", &v)?;
        }
        if let Some(v) = lookup("CROSSPOST_WORKERS") {
            self.queue.workers = parse_var("CROSSPOST_WORKERS", &v)?;
        }
        if let Some(v) = lookup("MAX_RETRIES") {
            self.retry.max_retries = parse_var("MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("RETRY_DELAY") {
            self.retry.initial_delay_secs = parse_var("RETRY_DELAY", &v)?;
        }
        if let Some(v) = lookup("PUBLISH_TIMEOUT") {
            self.publish.timeout_secs = parse_var("PUBLISH_TIMEOUT", &v)?;
        }
        if let Some(bind) = lookup("CROSSPOST_BIND") {
            self.server.bind = bind;
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.optimizer.api_key = Some(key);
            self.optimizer.enabled = true;
        }

        for kind in PlatformKind::ALL {
            let prefix = kind.env_prefix();
            let token = lookup(&format!("{}_ACCESS_TOKEN", prefix));
            let url = lookup(&format!("{}_API_URL", prefix));
            if token.is_none() && url.is_none() && self.platforms.get(kind).is_none() {
                continue;
            }

            let platform = self.platforms.get_or_insert(kind);
            if token.is_some() {
                platform.access_token = token;
            }
            if url.is_some() {
                platform.api_url = url;
            }
            if let Some(app_id) = lookup("THREADS_APP_ID").filter(|_| kind == PlatformKind::Threads) {
                platform.app_id = Some(app_id);
            }
            if let Some(urn) =
                lookup("LINKEDIN_PERSON_URN").filter(|_| kind == PlatformKind::LinkedIn)
            {
                platform.person_urn = Some(urn);
            }
        }

        Ok(())
    }

    /// Reject values that would make the limiter or worker pool meaningless
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.requests == 0 {
            return Err(invalid("rate_limit.requests", "must be at least 1"));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(invalid("rate_limit.window_secs", "must be at least 1"));
        }
        if self.queue.workers == 0 {
            return Err(invalid("queue.workers", "must be at least 1"));
        }
        if self.queue.lease_secs <= self.publish.timeout_secs {
            return Err(invalid(
                "queue.lease_secs",
                "must be longer than publish.timeout_secs",
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(invalid("retry.multiplier", "must be >= 1.0"));
        }
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(name, &format!("'{}' is not a valid number", value)))
}

fn invalid(field: &str, message: &str) -> crate::error::CrosspostError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Resolve the configuration file path under the XDG config directory
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosspost").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.rate_limit.requests, 100);
        assert_eq!(config.rate_limit.window_secs, 3600);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay_secs, 60);
        assert_eq!(config.publish.timeout_secs, 10);
        assert_eq!(config.validation.max_length, 1000);
        assert!(config.queue.workers >= 1);
        assert!(config.platforms.enabled().is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
[rate_limit]
requests = 5

[platforms.twitter]
access_token = "tw-token"
"#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.requests, 5);
        assert_eq!(config.rate_limit.window_secs, 3600);
        assert_eq!(config.platforms.enabled(), vec![PlatformKind::Twitter]);
    }

    #[test]
    fn test_disabled_platform_is_not_enabled() {
        let config: Config = toml::from_str(
            r#"
[platforms.linkedin]
enabled = false
access_token = "li-token"
"#,
        )
        .unwrap();

        assert!(config.platforms.enabled().is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup_from(&[
                ("RATE_LIMIT_REQUESTS", "7"),
                ("RATE_LIMIT_WINDOW", "60"),
                ("MAX_RETRIES", "5"),
                ("RETRY_DELAY", "2"),
                ("CROSSPOST_DB_PATH", "/tmp/x.db"),
                ("THREADS_ACCESS_TOKEN", "th-token"),
                ("THREADS_APP_ID", "app-1"),
                ("LINKEDIN_API_URL", "http://localhost/li"),
            ]))
            .unwrap();

        assert_eq!(config.rate_limit.requests, 7);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_secs, 2);
        assert_eq!(config.database.path, "/tmp/x.db");

        let threads = config.platforms.threads.as_ref().unwrap();
        assert_eq!(threads.access_token.as_deref(), Some("th-token"));
        assert_eq!(threads.app_id.as_deref(), Some("app-1"));

        // URL without a token registers the platform but does not enable it
        let linkedin = config.platforms.linkedin.as_ref().unwrap();
        assert_eq!(linkedin.api_url.as_deref(), Some("http://localhost/li"));
        assert_eq!(config.platforms.enabled(), vec![PlatformKind::Threads]);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = Config::default();
        let result = config.apply_overrides(lookup_from(&[("RATE_LIMIT_REQUESTS", "lots")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_quota() {
        let mut config = Config::default();
        config.rate_limit.requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_lease_shorter_than_timeout() {
        let mut config = Config::default();
        config.queue.lease_secs = 5;
        config.publish.timeout_secs = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_reads_file_from_env_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[database]
path = "/tmp/crosspost-test.db"

[queue]
workers = 2
"#,
        )
        .unwrap();

        std::env::set_var("CROSSPOST_CONFIG", &config_path);
        let config = Config::load();
        std::env::remove_var("CROSSPOST_CONFIG");

        let config = config.unwrap();
        assert_eq!(config.database.path, "/tmp/crosspost-test.db");
        assert_eq!(config.queue.workers, 2);
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "invalid toml content [[[").unwrap();

        std::env::set_var("CROSSPOST_CONFIG", &config_path);
        let result = Config::load();
        std::env::remove_var("CROSSPOST_CONFIG");

        assert!(result.is_err());
    }
}
