//! Upload dispatch
//!
//! Reconciliation decisions are handed to an [`UploadSink`] before any state
//! is committed. The sink reports which decisions it accepted; only those are
//! recorded, so anything not acknowledged is retried on the next run.

pub mod webhook;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Chapter, PostedChapter, RunMode};
use crate::reconciler::ReconcilePlan;

pub use webhook::{WebhookConfig, WebhookSink};

/// Upload dispatch errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid sink configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sink rejected dispatch with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid sink response: {0}")]
    InvalidResponse(String),
}

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Which decisions the sink accepted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub uploaded: HashSet<String>,
    pub deleted: HashSet<String>,
    /// Decisions the sink did not accept
    pub failed: Vec<String>,
}

impl DispatchReport {
    /// Every decision of the plan accepted
    pub fn acknowledge_all(plan: &ReconcilePlan) -> Self {
        Self {
            uploaded: plan.to_upload.iter().map(|u| u.id().to_string()).collect(),
            deleted: plan.to_delete.iter().map(|p| p.chapter_id.clone()).collect(),
            failed: Vec::new(),
        }
    }

    /// Restrict to acknowledged ids; everything else is failed
    pub fn from_acknowledged(
        plan: &ReconcilePlan,
        uploaded: impl IntoIterator<Item = String>,
        deleted: impl IntoIterator<Item = String>,
    ) -> Self {
        let uploaded: HashSet<String> = uploaded.into_iter().collect();
        let deleted: HashSet<String> = deleted.into_iter().collect();

        let mut report = Self::default();
        for unit in &plan.to_upload {
            if uploaded.contains(unit.id()) {
                report.uploaded.insert(unit.id().to_string());
            } else {
                report.failed.push(unit.id().to_string());
            }
        }
        for posted in &plan.to_delete {
            if deleted.contains(&posted.chapter_id) {
                report.deleted.insert(posted.chapter_id.clone());
            } else {
                report.failed.push(posted.chapter_id.clone());
            }
        }
        report
    }
}

/// JSON document describing one run's decisions
#[derive(Debug, Clone, Serialize)]
pub struct DispatchPayload<'a> {
    pub extension: &'a str,
    pub mode: RunMode,
    pub run_timestamp: String,
    pub uploads: Vec<UploadEntry<'a>>,
    pub deletions: &'a [PostedChapter],
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadEntry<'a> {
    #[serde(flatten)]
    pub chapter: &'a Chapter,
    pub chapter_numbers: &'a [String],
}

impl<'a> DispatchPayload<'a> {
    pub fn from_plan(plan: &'a ReconcilePlan) -> Self {
        Self {
            extension: &plan.extension,
            mode: plan.mode,
            run_timestamp: plan.run_timestamp.to_rfc3339(),
            uploads: plan
                .to_upload
                .iter()
                .map(|unit| UploadEntry {
                    chapter: &unit.chapter,
                    chapter_numbers: &unit.chapter_numbers,
                })
                .collect(),
            deletions: &plan.to_delete,
        }
    }
}

/// Downstream consumer of reconciliation decisions
#[async_trait]
pub trait UploadSink: Send + Sync {
    fn name(&self) -> &str;

    /// Hand over a plan; an error means nothing was accepted
    async fn dispatch(&self, plan: &ReconcilePlan) -> UploadResult<DispatchReport>;
}

/// Thread-safe shared sink
pub type SharedUploadSink = Arc<dyn UploadSink>;

/// Sink that only logs decisions and accepts all of them
#[derive(Debug, Clone, Default)]
pub struct LoggingSink;

#[async_trait]
impl UploadSink for LoggingSink {
    fn name(&self) -> &str {
        "logging"
    }

    async fn dispatch(&self, plan: &ReconcilePlan) -> UploadResult<DispatchReport> {
        for unit in &plan.to_upload {
            tracing::info!(
                extension = %plan.extension,
                chapter_id = unit.id(),
                md_manga_id = unit.md_manga_id(),
                chapter_number = unit.chapter.chapter_number.as_deref().unwrap_or("-"),
                language = %unit.chapter.chapter_language,
                "Upload chapter"
            );
        }
        for posted in &plan.to_delete {
            tracing::info!(
                extension = %plan.extension,
                chapter_id = %posted.chapter_id,
                md_manga_id = %posted.md_manga_id,
                "Delete chapter"
            );
        }
        Ok(DispatchReport::acknowledge_all(plan))
    }
}
