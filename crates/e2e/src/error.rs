//! Error types for E2E testing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timed out after {timeout_ms} ms waiting for {selector} to {predicate}; last observed {observed}")]
    AssertionTimeout {
        selector: String,
        predicate: String,
        timeout_ms: u64,
        observed: String,
    },

    #[error("Ambiguous target: {selector} matched {count} elements, expected exactly 1")]
    AmbiguousTarget { selector: String, count: usize },

    #[error("Element detached from the DOM: {selector}")]
    DetachedElement { selector: String },

    #[error("Element not actionable: {selector} ({reason})")]
    NotActionable { selector: String, reason: String },

    #[error("Invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Selector {selector:?} targets presentation (id/class); use a data-* attribute")]
    SelectorPolicy { selector: String },

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Detached handles are worth one re-resolution before giving up.
    pub fn is_detached(&self) -> bool {
        matches!(self, E2eError::DetachedElement { .. })
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
