//! Extension runs
//!
//! One run of one extension goes through five phases:
//!
//! ```text
//! load state ─► fetch (timeout) ─► reconcile ─► dispatch ─► commit acknowledged
//! ```
//!
//! A failure in any phase ends the run without touching the state store, so
//! the next run starts from the same `previously-posted` set. The
//! [`Orchestrator`] evaluates the scheduler on a tick and drives due runs
//! concurrently, one in-flight run per extension.

pub mod error;
pub mod orchestrator;
pub mod stats;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::extension::{Extension, FetchAdapter};
use crate::models::RunMode;
use crate::reconciler::Reconciler;
use crate::scheduler::TriggerReason;
use crate::storage::{SharedStateStore, StorageError};
use crate::upload::{DispatchReport, SharedUploadSink};

pub use error::{RunError, RunErrorKind};
pub use orchestrator::{Orchestrator, PlannedRun, TickReport};
pub use stats::{RunStats, StatsSnapshot};

/// Default bound on the fetch phase of a run
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(900);

/// Counts of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub extension: String,
    pub mode: RunMode,
    pub uploaded: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub rejected: usize,
    pub suppressed: usize,
    /// Decisions the sink did not acknowledge; retried next run
    pub unacknowledged: usize,
    pub new_tracked_manga: usize,
    pub delete_detection: bool,
}

/// Result of one attempted run within a tick
#[derive(Debug)]
pub struct RunOutcome {
    pub extension: String,
    pub mode: RunMode,
    pub reason: TriggerReason,
    pub duration: Duration,
    pub result: Result<RunSummary, RunError>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// `success` or the error kind
    pub fn label(&self) -> &'static str {
        match &self.result {
            Ok(_) => "success",
            Err(e) => e.kind().as_str(),
        }
    }
}

/// Executes single extension runs against a store and a sink
#[derive(Clone)]
pub struct ExtensionRunner {
    store: SharedStateStore,
    sink: SharedUploadSink,
    fetch_timeout: Duration,
}

impl ExtensionRunner {
    pub fn new(store: SharedStateStore, sink: SharedUploadSink) -> Self {
        Self {
            store,
            sink,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn store(&self) -> &SharedStateStore {
        &self.store
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Run one extension to completion
    ///
    /// The caller must hold the extension's single-flight guard. Dropping the
    /// returned future before it resolves leaves the state store untouched.
    pub async fn run(
        &self,
        extension: &mut dyn Extension,
        mode: RunMode,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, RunError> {
        let name = extension.name().to_string();

        let state = self
            .store
            .load_state(&name)
            .map_err(|e| StorageError::read(&name, e))?;

        let overrides = extension
            .load_override_options()
            .map_err(|e| RunError::Validation(e.to_string()))?;

        let posted = state.posted_ids();
        let batch = tokio::time::timeout(
            self.fetch_timeout,
            FetchAdapter::fetch(&mut *extension, &posted, mode),
        )
        .await
        .map_err(|_| RunError::Timeout(self.fetch_timeout))??;

        let tracked = extension.tracked_mangadex_ids();
        let plan = Reconciler::new(&name, &overrides, mode, now).plan(batch, &state, &tracked);

        let report = if plan.has_decisions() {
            self.sink.dispatch(&plan).await?
        } else {
            DispatchReport::default()
        };

        if !report.failed.is_empty() {
            tracing::warn!(
                extension = %name,
                sink = self.sink.name(),
                unacknowledged = report.failed.len(),
                "Sink did not acknowledge every decision"
            );
        }

        let commit = plan.commit_for(&report);
        self.store.commit(&name, &commit).map_err(|e| {
            let err = StorageError::commit(&name, e);
            tracing::error!(
                extension = %name,
                mode = %mode,
                kind = "state_commit_failure",
                uploaded = commit.added.len(),
                error = %err,
                "State commit failed; dispatched decisions will be re-evaluated next run"
            );
            err
        })?;

        Ok(RunSummary {
            extension: name,
            mode,
            uploaded: report.uploaded.len(),
            skipped: plan.to_skip.len(),
            deleted: report.deleted.len(),
            rejected: plan.rejected.len(),
            suppressed: plan.suppressed,
            unacknowledged: report.failed.len(),
            new_tracked_manga: plan.new_tracked_manga.len(),
            delete_detection: plan.delete_detection,
        })
    }
}

impl std::fmt::Debug for ExtensionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRunner")
            .field("sink", &self.sink.name())
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}
