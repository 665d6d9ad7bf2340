//! Error types for Crosspost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosspostError>;

#[derive(Error, Debug)]
pub enum CrosspostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Rate limit exceeded for client '{0}'")]
    RateLimitExceeded(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Content optimization failed for {platform}: {message}")]
    Optimization { platform: String, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CrosspostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosspostError::InvalidInput(_) | CrosspostError::Validation(_) => 3,
            CrosspostError::Config(_) | CrosspostError::Database(_) => 2,
            CrosspostError::Platform(PlatformError::Authentication(_)) => 2,
            CrosspostError::Platform(_)
            | CrosspostError::RateLimitExceeded(_)
            | CrosspostError::Optimization { .. } => 1,
        }
    }

    /// Whether a publish attempt that failed with this error is worth retrying.
    ///
    /// Only platform errors can be transient; everything else is a problem
    /// with the job itself or with local state.
    pub fn is_transient(&self) -> bool {
        match self {
            CrosspostError::Platform(platform_error) => platform_error.is_transient(),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Unsupported platform: {0}")]
    Unsupported(String),
}

impl PlatformError {
    /// Transient errors include network issues, timeouts, throttling and 5xx
    /// responses. Authentication failures, rejected payloads and unknown
    /// platforms are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::Network(_)
            | PlatformError::RateLimit(_)
            | PlatformError::Timeout(_)
            | PlatformError::Server { .. } => true,
            PlatformError::Authentication(_)
            | PlatformError::Posting(_)
            | PlatformError::Unsupported(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = CrosspostError::InvalidInput("bad job id".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_validation() {
        let error = CrosspostError::Validation("Content cannot be empty".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = CrosspostError::Platform(PlatformError::Authentication("expired token".into()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_config_and_database() {
        let config_error = CrosspostError::Config(ConfigError::MissingField("database.path".into()));
        assert_eq!(config_error.exit_code(), 2);

        let db_error = CrosspostError::Database(DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        )));
        assert_eq!(db_error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_runtime_errors() {
        assert_eq!(CrosspostError::RateLimitExceeded("c".into()).exit_code(), 1);
        assert_eq!(
            CrosspostError::Platform(PlatformError::Network("refused".into())).exit_code(),
            1
        );
    }

    #[test]
    fn test_error_message_formatting() {
        let error = CrosspostError::Platform(PlatformError::Posting("HTTP 400".to_string()));
        assert_eq!(format!("{}", error), "Platform error: Posting failed: HTTP 400");

        let error = CrosspostError::RateLimitExceeded("testkey".to_string());
        assert_eq!(format!("{}", error), "Rate limit exceeded for client 'testkey'");

        let error = CrosspostError::Optimization {
            platform: "Twitter".to_string(),
            message: "upstream 500".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Content optimization failed for Twitter: upstream 500"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(PlatformError::Network("reset".into()).is_transient());
        assert!(PlatformError::RateLimit("429".into()).is_transient());
        assert!(PlatformError::Timeout(10).is_transient());
        assert!(PlatformError::Server { status: 503, message: "unavailable".into() }.is_transient());

        assert!(!PlatformError::Authentication("401".into()).is_transient());
        assert!(!PlatformError::Posting("400".into()).is_transient());
        assert!(!PlatformError::Unsupported("Myspace".into()).is_transient());
    }

    #[test]
    fn test_only_platform_errors_are_transient() {
        let network: CrosspostError = PlatformError::Network("down".into()).into();
        assert!(network.is_transient());

        assert!(!CrosspostError::Validation("empty".into()).is_transient());
        assert!(!CrosspostError::Database(DbError::CorruptRow("x".into())).is_transient());
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(format!("{}", original), format!("{}", cloned));
    }

    #[test]
    fn test_error_conversion_from_db_error() {
        let db_error = DbError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, "test"));
        let error: CrosspostError = db_error.into();

        match error {
            CrosspostError::Database(_) => {}
            _ => panic!("Expected CrosspostError::Database"),
        }
    }
}
