//! Override engine
//!
//! Turns validated chapters into upload units by applying the per-extension
//! [`OverrideTable`]. The transforms run in a fixed order:
//!
//! 1. language remap (`custom_language`)
//! 2. chapter-number resolution (`override_chapter_numbers`, `multi_chapters`,
//!    then raw-number cleanup)
//! 3. title handling (`empty`, `noformat`, `custom`, sanitiser cascade)
//! 4. chapter-number format validation
//! 5. same-collapsing (`same`)
//! 6. expiry
//!
//! A chapter failing step 3, 4 or 6 is rejected on its own; the rest of the
//! batch continues.

pub mod number;
pub mod overrides;
pub mod title;

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

use crate::models::Chapter;
pub use number::{clean_chapter_numbers, is_canonical_chapter_number, strip_chapter_number};
pub use overrides::{OverrideError, OverrideOptions, OverrideTable};
pub use title::{TitleRule, TitleSanitizer};

static LANGUAGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2,3}(?:-[a-z]{2})?$").unwrap());

/// Check a language code (`en`, `spa`, `pt-br`)
pub fn is_valid_language(code: &str) -> bool {
    LANGUAGE_REGEX.is_match(code)
}

// ============================================================================
// Outcomes
// ============================================================================

/// Reason an individual chapter was dropped from the run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChapterRejected {
    #[error("Chapter {chapter_id} has no title and manga {manga_id} does not allow empty titles")]
    MissingTitle {
        chapter_id: String,
        manga_id: String,
    },

    #[error("Chapter {chapter_id} has non-canonical chapter number '{number}'")]
    InvalidNumber { chapter_id: String, number: String },

    #[error("Chapter {chapter_id} expired at {expired_at}")]
    Expired {
        chapter_id: String,
        expired_at: DateTime<Utc>,
    },
}

impl ChapterRejected {
    /// Short label for logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingTitle { .. } => "missing_title",
            Self::InvalidNumber { .. } => "invalid_number",
            Self::Expired { .. } => "expired",
        }
    }

    pub fn chapter_id(&self) -> &str {
        match self {
            Self::MissingTitle { chapter_id, .. }
            | Self::InvalidNumber { chapter_id, .. }
            | Self::Expired { chapter_id, .. } => chapter_id,
        }
    }
}

/// One chapter ready for reconciliation, possibly spanning several numbers
#[derive(Debug, Clone, PartialEq)]
pub struct UploadUnit {
    pub chapter: Chapter,
    /// Ordered chapter numbers; empty for chapters without a number
    pub chapter_numbers: Vec<String>,
}

impl UploadUnit {
    /// Reconciliation key
    pub fn id(&self) -> &str {
        &self.chapter.chapter_id
    }

    pub fn md_manga_id(&self) -> &str {
        &self.chapter.md_manga_id
    }

    pub fn is_multi_chapter(&self) -> bool {
        self.chapter_numbers.len() > 1
    }
}

/// Result of normalising one chapter
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeOutcome {
    Accepted(UploadUnit),
    /// Declared a duplicate of `keep_id` and discarded
    Suppressed { chapter_id: String, keep_id: String },
    Rejected(ChapterRejected),
}

/// Result of normalising a whole batch
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub accepted: Vec<UploadUnit>,
    pub suppressed: Vec<(String, String)>,
    pub rejected: Vec<ChapterRejected>,
}

impl NormalizedBatch {
    pub fn accepted_ids(&self) -> impl Iterator<Item = &str> {
        self.accepted.iter().map(UploadUnit::id)
    }
}

// ============================================================================
// Normalizer
// ============================================================================

/// Applies one extension's override table at a fixed instant
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    overrides: &'a OverrideTable,
    now: DateTime<Utc>,
}

impl<'a> Normalizer<'a> {
    pub fn new(overrides: &'a OverrideTable, now: DateTime<Utc>) -> Self {
        Self { overrides, now }
    }

    /// Normalise a single chapter
    pub fn normalize(&self, mut chapter: Chapter) -> NormalizeOutcome {
        let overrides = self.overrides;

        if let Some(language) = overrides.custom_language(&chapter.manga_id) {
            chapter.chapter_language = language.to_string();
        }

        let chapter_numbers = self.resolve_numbers(&chapter);

        chapter.chapter_title = match self.resolve_title(&chapter) {
            Ok(title) => title,
            Err(rejected) => return NormalizeOutcome::Rejected(rejected),
        };

        if let Some(bad) = chapter_numbers
            .iter()
            .find(|n| !is_canonical_chapter_number(n))
        {
            return NormalizeOutcome::Rejected(ChapterRejected::InvalidNumber {
                chapter_id: chapter.chapter_id,
                number: bad.clone(),
            });
        }
        chapter.chapter_number = chapter_numbers.first().cloned();

        if let Some(keep_id) = overrides.kept_id_for(&chapter.chapter_id) {
            return NormalizeOutcome::Suppressed {
                keep_id: keep_id.to_string(),
                chapter_id: chapter.chapter_id,
            };
        }

        if let Some(expired_at) = chapter
            .chapter_expire
            .filter(|_| chapter.is_expired_at(self.now))
        {
            return NormalizeOutcome::Rejected(ChapterRejected::Expired {
                chapter_id: chapter.chapter_id,
                expired_at,
            });
        }

        NormalizeOutcome::Accepted(UploadUnit {
            chapter,
            chapter_numbers,
        })
    }

    /// Normalise a batch; accepted units are deduplicated by id, first wins
    pub fn normalize_batch(&self, chapters: impl IntoIterator<Item = Chapter>) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        let mut seen = HashSet::new();

        for chapter in chapters {
            match self.normalize(chapter) {
                NormalizeOutcome::Accepted(unit) => {
                    if seen.insert(unit.id().to_string()) {
                        batch.accepted.push(unit);
                    }
                }
                NormalizeOutcome::Suppressed {
                    chapter_id,
                    keep_id,
                } => {
                    tracing::debug!(
                        chapter_id = %chapter_id,
                        keep_id = %keep_id,
                        "Suppressed duplicate chapter"
                    );
                    batch.suppressed.push((chapter_id, keep_id));
                }
                NormalizeOutcome::Rejected(rejected) => {
                    tracing::warn!(
                        chapter_id = rejected.chapter_id(),
                        reason = rejected.reason(),
                        "Chapter rejected: {}",
                        rejected
                    );
                    batch.rejected.push(rejected);
                }
            }
        }

        batch
    }

    fn resolve_numbers(&self, chapter: &Chapter) -> Vec<String> {
        if let Some(number) = self.overrides.override_number(&chapter.chapter_id) {
            return vec![number.to_string()];
        }
        if let Some(numbers) = self.overrides.multi_chapter_numbers(&chapter.chapter_id) {
            return numbers.to_vec();
        }
        clean_chapter_numbers(chapter.chapter_number.as_deref())
    }

    fn resolve_title(&self, chapter: &Chapter) -> Result<Option<String>, ChapterRejected> {
        let manga_id = &chapter.manga_id;

        if self.overrides.allows_empty_title(manga_id) {
            return Ok(None);
        }

        let Some(raw) = chapter
            .chapter_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            return Err(ChapterRejected::MissingTitle {
                chapter_id: chapter.chapter_id.clone(),
                manga_id: manga_id.clone(),
            });
        };

        if self.overrides.skips_title_format(manga_id) {
            return Ok(Some(raw.to_string()));
        }

        Ok(self
            .overrides
            .titles()
            .sanitize(raw, self.overrides.custom_title_regex(manga_id)))
    }
}
