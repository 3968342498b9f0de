// src/error.rs

//! Unified error handling for the importer.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for importer operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Blob store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Problem repository error
    #[error("Repository error: {0}")]
    Repository(String),

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

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid regular expression
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// Sweep scheduler failed
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network failure while listing or importing
    #[error("Fetch error for {context}: {message}")]
    TransientFetch { context: String, message: String },

    /// Expected markup or field absent
    #[error("Unexpected content for {context}: {message}")]
    ContentFormat { context: String, message: String },

    /// Detected page ranges do not match the known problems of a merged PDF
    #[error("Mismatch with the expected number of problems: expected {expected}, detected {detected}")]
    SegmentationMismatch { expected: usize, detected: usize },

    /// Nothing to import (already handled or still pending elsewhere)
    #[error("No need to import: {0}")]
    AlreadyHandled(String),

    /// Task exceeded its time budget
    #[error("{context} timed out after {after:?}")]
    Timeout { context: String, after: Duration },

    /// External document tool failed
    #[error("Command `{command}` failed: {message}")]
    Tool { command: String, message: String },

    /// A merged-PDF batch failed; the URL is not attempted again
    #[error("Batch import of {url} failed: {source}")]
    Batch {
        url: String,
        #[source]
        source: Box<AppError>,
    },

    /// A merged-PDF batch outlived the wait of its triggering import; the
    /// batch records its own outcome
    #[error("Batch import of {url} still running after {after:?}")]
    BatchPending { url: String, after: Duration },
}

impl AppError {
    /// Create a storage error.
    pub fn storage(message: impl fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    /// Create a repository error.
    pub fn repository(message: impl fmt::Display) -> Self {
        Self::Repository(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a transient fetch error with context.
    pub fn fetch(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::TransientFetch {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a content format error with context.
    pub fn content(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::ContentFormat {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an external tool error.
    pub fn tool(command: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Tool {
            command: command.into(),
            message: message.to_string(),
        }
    }

    /// Whether a fresh attempt of the same task may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientFetch { .. } | Self::Timeout { .. } | Self::Http(_) | Self::Tool { .. }
        )
    }

    /// Whether this is the "nothing to do" outcome rather than a failure.
    pub fn is_already_handled(&self) -> bool {
        matches!(self, Self::AlreadyHandled(_))
    }

    /// Whether a merged-PDF batch owns the failure accounting of this task.
    pub fn is_batch_outcome(&self) -> bool {
        matches!(self, Self::Batch { .. } | Self::BatchPending { .. })
    }
}
