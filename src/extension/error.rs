//! Extension error types

use thiserror::Error;

use crate::normalize::OverrideError;

/// Result type for extension operations
pub type ExtensionResult<T> = Result<T, ExtensionError>;

/// Errors raised while loading or invoking an extension
#[derive(Error, Debug)]
pub enum ExtensionError {
    /// `extension.toml` missing or malformed
    #[error("Invalid manifest '{path}': {reason}")]
    Manifest { path: String, reason: String },

    /// `manga_id_map.json` malformed
    #[error("Invalid manga id map '{path}': {reason}")]
    MangaIdMap { path: String, reason: String },

    /// `override_options.json` malformed
    #[error(transparent)]
    Overrides(#[from] OverrideError),

    /// Extension process could not be started or talked to
    #[error("Failed to run extension command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Extension process exited unsuccessfully
    #[error("Extension command exited with {status}: {stderr}")]
    ProcessFailed { status: String, stderr: String },

    /// Extension output does not have the declared shape
    #[error("Invalid extension output: {0}")]
    InvalidOutput(String),

    /// Extension-internal failure while fetching
    #[error("Fetch failed: {0}")]
    Fetch(String),
}

impl ExtensionError {
    /// Create a manifest error
    pub fn manifest(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Manifest {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a fetch failure
    pub fn fetch(reason: impl Into<String>) -> Self {
        Self::Fetch(reason.into())
    }

    /// Whether the extension returned data of the wrong shape
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidOutput(_))
    }
}
