// src/error.rs

//! Unified error handling for the notifier.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for notifier operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Catalog or metadata provider call failed
    #[error("Fetch error for {context}: {message}")]
    Fetch { context: String, message: String },

    /// A webhook batch could not be delivered
    #[error("Dispatch error for batch {batch}: {message}")]
    Dispatch { batch: usize, message: String },

    /// The webhook answered with a non-2xx status
    #[error("Webhook rejected the message with HTTP {status}: {message}")]
    Rejected {
        status: u16,
        /// Wait requested by the platform before the next attempt
        retry_after_ms: Option<u64>,
        message: String,
    },

    /// Persisted state could not be read or written
    #[error("Store error: {0}")]
    Store(String),

    /// A single catalog record carried an unusable field
    #[error("Parse error for {context}: {message}")]
    Parse { context: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a fetch error with context.
    pub fn fetch(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a dispatch error for a batch index.
    pub fn dispatch(batch: usize, message: impl fmt::Display) -> Self {
        Self::Dispatch {
            batch,
            message: message.to_string(),
        }
    }

    /// Create a store error.
    pub fn store(message: impl fmt::Display) -> Self {
        Self::Store(message.to_string())
    }

    /// Create a parse error with context.
    pub fn parse(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the error must abort a run before any network call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Validation(_))
    }

    /// Whether repeating the same request may succeed: transport failures,
    /// 5xx and 429.
    pub fn is_transient(&self) -> bool {
        let retryable = |status: u16| status == 429 || status >= 500;
        match self {
            Self::Http(e) => e.status().is_none_or(|s| retryable(s.as_u16())),
            Self::Rejected { status, .. } => retryable(*status),
            Self::Io(_) | Self::Fetch { .. } => true,
            _ => false,
        }
    }

    /// Wait requested by a rate-limited endpoint.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Rejected {
                retry_after_ms: Some(ms),
                ..
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}
