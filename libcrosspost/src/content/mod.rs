//! Content validation and per-platform optimization

pub mod language;
pub mod optimizer;
pub mod validator;

pub use optimizer::{truncate_chars, CachedOptimizer, ContentOptimizer, LlmOptimizer, TruncatingOptimizer};
pub use language::WhatlangDetector;
pub use validator::{ContentValidator, DefaultValidator, LanguageDetector};
