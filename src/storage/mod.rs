//! Persistence of per-extension reconciliation state
//!
//! SQLite is the production backend; an in-memory store backs tests.

pub mod repository;

use thiserror::Error;

pub use repository::{
    create_memory_store, create_sqlite_store, MemoryStateStore, SharedStateStore,
    SqliteStateStore, StateCommit, StateStore,
};

/// State store failures as seen by a run
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read state of {extension}: {reason}")]
    Read { extension: String, reason: String },

    #[error("Failed to commit state of {extension}: {reason}")]
    Commit { extension: String, reason: String },
}

impl StorageError {
    pub fn read(extension: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Read {
            extension: extension.into(),
            reason: format!("{source:#}"),
        }
    }

    pub fn commit(extension: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Commit {
            extension: extension.into(),
            reason: format!("{source:#}"),
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            Self::Read { extension, .. } | Self::Commit { extension, .. } => extension,
        }
    }
}
