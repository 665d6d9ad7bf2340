//! Content checks applied before any job is created

use std::sync::Arc;

use super::language::WhatlangDetector;
use crate::config::ValidationConfig;
use crate::error::{CrosspostError, Result};

/// Accepts or rejects content with a human-readable reason
pub trait ContentValidator: Send + Sync {
    fn validate(&self, content: &str) -> Result<()>;
}

/// Identifies the language of a piece of text
///
/// Returns an ISO 639-1 code such as `"en"`, or `None` when the text gives
/// too little to go on.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, content: &str) -> Option<String>;
}

/// Rules, in order: non-empty, length, character set, language (when a
/// detector is installed), prohibited words.
#[derive(Clone)]
pub struct DefaultValidator {
    max_length: usize,
    prohibited_words: Vec<String>,
    allowed_languages: Vec<String>,
    detector: Option<Arc<dyn LanguageDetector>>,
}

impl DefaultValidator {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            prohibited_words: Vec::new(),
            allowed_languages: Vec::new(),
            detector: None,
        }
    }

    /// Installs [`WhatlangDetector`] unless `allowed_languages` is empty
    pub fn from_config(config: &ValidationConfig) -> Self {
        let detector: Option<Arc<dyn LanguageDetector>> = if config.allowed_languages.is_empty() {
            None
        } else {
            Some(Arc::new(WhatlangDetector))
        };

        Self {
            max_length: config.max_length,
            prohibited_words: config
                .prohibited_words
                .iter()
                .map(|w| w.to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
            allowed_languages: config.allowed_languages.clone(),
            detector,
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_prohibited_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.prohibited_words = words.into_iter().map(|w| w.as_ref().to_lowercase()).collect();
        self
    }

    fn check_language(&self, content: &str) -> Result<()> {
        let Some(detector) = &self.detector else {
            return Ok(());
        };

        match detector.detect(content) {
            None => Err(CrosspostError::Validation("Unable to detect language".to_string())),
            Some(language) if !self.allowed_languages.is_empty()
                && !self.allowed_languages.iter().any(|l| l.eq_ignore_ascii_case(&language)) =>
            {
                Err(CrosspostError::Validation(format!("Unsupported language: {}", language)))
            }
            Some(_) => Ok(()),
        }
    }
}

/// Letters, digits, underscore, whitespace and common punctuation
pub fn is_allowed_char(c: char) -> bool {
    c.is_alphanumeric()
        || c == '_'
        || c.is_whitespace()
        || (')'..='=').contains(&c)
        || ".!?@#$%^&(;'\"[]{}|\\".contains(c)
}

impl ContentValidator for DefaultValidator {
    fn validate(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(CrosspostError::Validation("Content cannot be empty".to_string()));
        }

        if content.chars().count() > self.max_length {
            return Err(CrosspostError::Validation(format!(
                "Content exceeds maximum length of {} characters",
                self.max_length
            )));
        }

        if !content.chars().all(is_allowed_char) {
            return Err(CrosspostError::Validation(
                "Content contains invalid characters".to_string(),
            ));
        }

        self.check_language(content)?;

        let lowered = content.to_lowercase();
        if self.prohibited_words.iter().any(|w| lowered.contains(w.as_str())) {
            return Err(CrosspostError::Validation(
                "Content contains prohibited language".to_string(),
            ));
        }

        Ok(())
    }
}
