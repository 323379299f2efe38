// src/error.rs

//! Unified error handling for the crawler application.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request or body read failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON payload could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file was not valid TOML
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL could not be parsed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSV table read or append failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A configured CSS selector did not parse
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Browser automation failed
    #[error("Browser error: {0}")]
    Browser(String),

    /// The workflow API rejected a request or stream
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// Configuration problem outside of TOML syntax
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration values failed a sanity check
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Selector parsing error with the offending selector attached.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Browser automation error from any displayable cause.
    pub fn browser(message: impl fmt::Display) -> Self {
        Self::Browser(message.to_string())
    }

    /// Workflow API error from any displayable cause.
    pub fn workflow(message: impl fmt::Display) -> Self {
        Self::Workflow(message.to_string())
    }

    /// Configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
