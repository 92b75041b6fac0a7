//! publoader - manga chapter mirroring orchestrator
//!
//! Runs publisher extensions on a schedule, normalises the chapters they
//! return, reconciles them against what was already posted and hands the
//! resulting upload and delete decisions to an upload sink.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`scheduler`] - Per-tick run decisions and the hourly tick loop
//! - [`extension`] - Extension contract, command extensions and the fetch adapter
//! - [`normalize`] - Override tables, title and chapter-number normalisation
//! - [`reconciler`] - Upload / skip / delete partition against persisted state
//! - [`storage`] - Per-extension state store (SQLite, in-memory)
//! - [`upload`] - Upload sinks receiving reconciliation decisions
//! - [`runner`] - Single runs and concurrent tick dispatch
//! - [`metrics`] - Prometheus metrics
//! - [`models`] - Core data structures and types
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use publoader::extension::ExtensionRegistry;
//! use publoader::runner::{ExtensionRunner, Orchestrator};
//! use publoader::storage::create_sqlite_store;
//! use publoader::upload::LoggingSink;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (registry, _errors) = ExtensionRegistry::load_dir("extensions");
//!     let store = create_sqlite_store("data/state.db")?;
//!     let runner = ExtensionRunner::new(store, Arc::new(LoggingSink));
//!     let orchestrator = Orchestrator::new(registry, runner);
//!     let report = orchestrator.run_tick(chrono::Utc::now()).await;
//!     println!("{} runs", report.outcomes.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod extension;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod reconciler;
pub mod runner;
pub mod scheduler;
pub mod storage;
pub mod upload;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, PubloaderErrorTrait, Result};
    pub use crate::extension::{Extension, ExtensionRegistry};
    pub use crate::models::{Chapter, ExtensionState, Manga, RunMode};
    pub use crate::runner::{ExtensionRunner, Orchestrator, RunError, TickReport};
    pub use crate::scheduler::{Scheduler, TickLoop};
    pub use crate::storage::{SharedStateStore, StateStore};
    pub use crate::upload::{SharedUploadSink, UploadSink};
}

// Direct re-exports for convenience
pub use models::{Chapter, ExtensionState, Manga, RunMode};
