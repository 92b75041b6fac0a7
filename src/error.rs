//! Unified error handling for the publoader crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while maintaining the ability to use
//! domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`PubloaderErrorTrait`] - Common interface implemented by the unified error
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use publoader::error::{Error, PubloaderErrorTrait};
//!
//! fn report(err: &Error) {
//!     eprintln!("[{}] {}", err.category(), err);
//! }
//! ```

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::extension::{ExtensionError, FetchError};
pub use crate::normalize::{ChapterRejected, OverrideError};
pub use crate::runner::RunError;
pub use crate::scheduler::SchedulerError;
pub use crate::storage::StorageError;
pub use crate::upload::UploadError;

/// Common trait for publoader error types
pub trait PubloaderErrorTrait: std::error::Error {
    /// Check if this error is recoverable (a later tick may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Extension loading, fetching and output validation
    Extension,
    /// Override tables and per-chapter checks
    Normalization,
    /// State store and I/O errors
    Storage,
    /// Scheduler and timing errors
    Scheduler,
    /// Upload sink errors
    Dispatch,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extension => "extension",
            Self::Normalization => "normalization",
            Self::Storage => "storage",
            Self::Scheduler => "scheduler",
            Self::Dispatch => "dispatch",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the publoader crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Extension error: {0}")]
    Extension(#[from] ExtensionError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Override error: {0}")]
    Override(#[from] OverrideError),

    #[error("Chapter rejected: {0}")]
    Rejected(#[from] ChapterRejected),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PubloaderErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Extension(e) => matches!(
                e,
                ExtensionError::Spawn { .. }
                    | ExtensionError::ProcessFailed { .. }
                    | ExtensionError::Fetch(_)
            ),
            Self::Fetch(e) => !e.is_validation(),
            Self::Override(_) | Self::Rejected(_) => false,
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Storage(_) => true,
            Self::Upload(e) => !matches!(e, UploadError::InvalidConfig(_)),
            Self::Run(e) => !matches!(e, RunError::Validation(_) | RunError::Panicked(_)),
            Self::Database(_) => false,
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Extension(ExtensionError::Overrides(_)) => ErrorCategory::Normalization,
            Self::Extension(_) | Self::Fetch(_) => ErrorCategory::Extension,
            Self::Override(_) | Self::Rejected(_) => ErrorCategory::Normalization,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Storage(_) | Self::Database(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Upload(UploadError::InvalidConfig(_)) => ErrorCategory::Config,
            Self::Upload(_) => ErrorCategory::Dispatch,
            Self::Run(e) => match e {
                RunError::Validation(_)
                | RunError::FetchFailure(_)
                | RunError::Timeout(_)
                | RunError::AlreadyRunning(_)
                | RunError::Panicked(_) => ErrorCategory::Extension,
                RunError::Storage(_) => ErrorCategory::Storage,
                RunError::Dispatch(_) => ErrorCategory::Dispatch,
            },
            Self::Json(_) => ErrorCategory::Other,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from rusqlite::Error
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
