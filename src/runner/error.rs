//! Per-extension run failures

use std::time::Duration;
use thiserror::Error;

use crate::extension::{ExtensionError, FetchError};
use crate::storage::StorageError;
use crate::upload::UploadError;

/// Why a run of one extension was skipped or rolled back
///
/// None of these cross into other extensions of the same tick.
#[derive(Error, Debug)]
pub enum RunError {
    /// Extension returned data of the wrong shape
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Network or extension-internal failure
    #[error("Fetch failed: {0}")]
    FetchFailure(String),

    #[error("Fetch timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Sink refused the decisions; nothing was committed
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] UploadError),

    #[error("Extension {0} is already running")]
    AlreadyRunning(String),

    #[error("Run panicked: {0}")]
    Panicked(String),
}

/// Stable log names of [`RunError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunErrorKind {
    Validation,
    FetchFailure,
    Timeout,
    StateReadFailure,
    StateCommitFailure,
    DispatchFailure,
    AlreadyRunning,
    Panicked,
}

impl RunErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::FetchFailure => "fetch_failure",
            Self::Timeout => "timeout",
            Self::StateReadFailure => "state_read_failure",
            Self::StateCommitFailure => "state_commit_failure",
            Self::DispatchFailure => "dispatch_failure",
            Self::AlreadyRunning => "already_running",
            Self::Panicked => "panicked",
        }
    }
}

impl std::fmt::Display for RunErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RunError {
    pub fn kind(&self) -> RunErrorKind {
        match self {
            Self::Validation(_) => RunErrorKind::Validation,
            Self::FetchFailure(_) => RunErrorKind::FetchFailure,
            Self::Timeout(_) => RunErrorKind::Timeout,
            Self::Storage(StorageError::Read { .. }) => RunErrorKind::StateReadFailure,
            Self::Storage(StorageError::Commit { .. }) => RunErrorKind::StateCommitFailure,
            Self::Dispatch(_) => RunErrorKind::DispatchFailure,
            Self::AlreadyRunning(_) => RunErrorKind::AlreadyRunning,
            Self::Panicked(_) => RunErrorKind::Panicked,
        }
    }

    /// Timeouts count as fetch failures
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::FetchFailure(_) | Self::Timeout(_))
    }

    /// Upload decisions may already have been dispatched
    pub fn risks_reupload(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Commit { .. }))
    }
}

impl From<FetchError> for RunError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Validation(e) => Self::Validation(e.to_string()),
            FetchError::Extension(e) if e.is_validation() => Self::Validation(e.to_string()),
            FetchError::Extension(e) => Self::FetchFailure(e.to_string()),
        }
    }
}

impl From<ExtensionError> for RunError {
    fn from(err: ExtensionError) -> Self {
        FetchError::from(err).into()
    }
}
