//! Reconciler
//!
//! Diffs one extension's normalised batch against its persisted state and
//! produces the upload / skip / delete partition.
//!
//! ```text
//!   FetchedBatch ──► Normalizer ──► accepted units ──┬─► to_upload (not posted)
//!                                                    └─► to_skip   (already posted)
//!   all_chapters ──► canonical ids ──► presence ─────────► to_delete (posted, tracked, absent)
//!   updated_manga ─────────────────────────────────────► new_tracked_manga
//! ```
//!
//! The plan is pure; state changes are only derived from it after the upload
//! sink acknowledged the decisions (see [`ReconcilePlan::commit_for`]).

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::extension::FetchedBatch;
use crate::models::{Chapter, ExtensionState, PostedChapter, RunMode};
use crate::normalize::{ChapterRejected, Normalizer, OverrideTable, UploadUnit};
use crate::storage::StateCommit;
use crate::upload::DispatchReport;

/// Decision sets for one extension run
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    pub extension: String,
    pub mode: RunMode,
    pub run_timestamp: DateTime<Utc>,
    pub to_upload: Vec<UploadUnit>,
    /// Ids already posted; never re-uploaded
    pub to_skip: Vec<String>,
    pub to_delete: Vec<PostedChapter>,
    pub new_tracked_manga: Vec<String>,
    pub rejected: Vec<ChapterRejected>,
    pub suppressed: usize,
    /// Whether a full listing was available for delete detection
    pub delete_detection: bool,
}

impl ReconcilePlan {
    /// Nothing to dispatch
    pub fn has_decisions(&self) -> bool {
        !self.to_upload.is_empty() || !self.to_delete.is_empty()
    }

    /// State changes for the decisions the sink acknowledged
    pub fn commit_for(&self, report: &DispatchReport) -> StateCommit {
        let added = self
            .to_upload
            .iter()
            .filter(|unit| report.uploaded.contains(unit.id()))
            .map(|unit| PostedChapter {
                chapter_id: unit.id().to_string(),
                md_manga_id: unit.md_manga_id().to_string(),
            })
            .collect();

        let removed = self
            .to_delete
            .iter()
            .filter(|posted| report.deleted.contains(&posted.chapter_id))
            .map(|posted| posted.chapter_id.clone())
            .collect();

        StateCommit {
            added,
            removed,
            new_tracked_manga: self.new_tracked_manga.clone(),
            run_timestamp: self.run_timestamp,
            clean_run_date: (self.mode == RunMode::Full).then(|| self.run_timestamp.date_naive()),
        }
    }
}

/// Computes reconciliation plans for one extension run
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    extension: &'a str,
    overrides: &'a OverrideTable,
    mode: RunMode,
    now: DateTime<Utc>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        extension: &'a str,
        overrides: &'a OverrideTable,
        mode: RunMode,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            extension,
            overrides,
            mode,
            now,
        }
    }

    /// Partition a fetched batch against the persisted state
    ///
    /// `tracked_mangadex_ids` are the ids the extension declares; they are
    /// tracked in addition to the persisted set.
    pub fn plan(
        &self,
        batch: FetchedBatch,
        state: &ExtensionState,
        tracked_mangadex_ids: &[String],
    ) -> ReconcilePlan {
        let FetchedBatch {
            updated_chapters,
            all_chapters,
            updated_manga,
        } = batch;

        let mut tracked: HashSet<&str> = state.tracked_manga.iter().map(String::as_str).collect();
        tracked.extend(tracked_mangadex_ids.iter().map(String::as_str));

        let mut new_tracked_manga: Vec<String> = Vec::new();
        for manga in &updated_manga {
            match manga.md_manga_id.as_deref() {
                Some(md_id) if !tracked.contains(md_id) => {
                    if !new_tracked_manga.iter().any(|m| m == md_id) {
                        tracing::info!(
                            extension = self.extension,
                            md_manga_id = md_id,
                            manga = %manga.manga_name,
                            "Tracking new manga"
                        );
                        new_tracked_manga.push(md_id.to_string());
                    }
                }
                Some(_) => {}
                None => {
                    tracing::debug!(
                        extension = self.extension,
                        manga_id = %manga.manga_id,
                        "Manga has no destination id, not tracked"
                    );
                }
            }
        }

        // Presence is taken from the raw listing so that chapters rejected
        // below never count as removed.
        let present: Option<HashSet<String>> = all_chapters.as_ref().map(|all| {
            all.iter()
                .chain(updated_chapters.iter())
                .map(|c| self.overrides.canonical_id(&c.chapter_id).to_string())
                .collect()
        });

        let candidates: Vec<Chapter> = match all_chapters {
            Some(all) if self.mode == RunMode::Full => {
                updated_chapters.into_iter().chain(all).collect()
            }
            _ => updated_chapters,
        };

        let normalized = Normalizer::new(self.overrides, self.now).normalize_batch(candidates);

        let posted_ids = state.posted_ids();
        let (to_skip, to_upload): (Vec<UploadUnit>, Vec<UploadUnit>) = normalized
            .accepted
            .into_iter()
            .partition(|unit| posted_ids.contains(unit.id()));

        let to_delete = match &present {
            Some(present) => {
                tracked.extend(new_tracked_manga.iter().map(String::as_str));
                state
                    .posted
                    .iter()
                    .filter(|p| tracked.contains(p.md_manga_id.as_str()))
                    .filter(|p| !present.contains(&p.chapter_id))
                    .cloned()
                    .collect()
            }
            None => Vec::new(),
        };

        let plan = ReconcilePlan {
            extension: self.extension.to_string(),
            mode: self.mode,
            run_timestamp: self.now,
            to_upload,
            to_skip: to_skip.iter().map(|u| u.id().to_string()).collect(),
            to_delete,
            new_tracked_manga,
            rejected: normalized.rejected,
            suppressed: normalized.suppressed.len(),
            delete_detection: present.is_some(),
        };

        tracing::info!(
            extension = self.extension,
            mode = %self.mode,
            upload = plan.to_upload.len(),
            skip = plan.to_skip.len(),
            delete = plan.to_delete.len(),
            rejected = plan.rejected.len(),
            suppressed = plan.suppressed,
            delete_detection = plan.delete_detection,
            "Reconciliation planned"
        );

        plan
    }
}
