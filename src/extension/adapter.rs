//! Fetch adapter
//!
//! Drives one extension through its fetch contract and converts the raw
//! records into validated [`Chapter`]/[`Manga`] values. A single malformed
//! record rejects the whole batch.

use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use super::error::ExtensionError;
use super::manga_id_map::MangaIdMap;
use super::Extension;
use crate::models::{Chapter, Manga, RawChapter, RawManga, RunMode};
use crate::normalize::is_valid_language;

pub const UPDATED_CHAPTERS: &str = "get_updated_chapters";
pub const ALL_CHAPTERS: &str = "get_all_chapters";
pub const UPDATED_MANGA: &str = "get_updated_manga";

/// Extension output does not have the declared shape
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub accessor: &'static str,
    pub index: Option<usize>,
    pub field: Option<&'static str>,
    pub reason: String,
}

impl ValidationError {
    fn missing_list(accessor: &'static str) -> Self {
        Self {
            accessor,
            index: None,
            field: None,
            reason: "returned None instead of a list".to_string(),
        }
    }

    fn field(
        accessor: &'static str,
        index: usize,
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            accessor,
            index: Some(index),
            field: Some(field),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.accessor)?;
        if let Some(index) = self.index {
            write!(f, "[{}]", index)?;
        }
        if let Some(field) = self.field {
            write!(f, ".{}", field)?;
        }
        write!(f, ": {}", self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// Failure of the fetch phase
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

impl FetchError {
    /// Whether the failure is a shape problem rather than a fetch problem
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Extension(e) => e.is_validation(),
        }
    }
}

/// Validated output of one fetch
#[derive(Debug, Clone, Default)]
pub struct FetchedBatch {
    pub updated_chapters: Vec<Chapter>,
    /// `None` disables delete detection for this run
    pub all_chapters: Option<Vec<Chapter>>,
    pub updated_manga: Vec<Manga>,
}

/// Converts raw extension records into validated values
#[derive(Debug, Clone, Copy)]
pub struct FetchAdapter<'a> {
    extension_name: &'a str,
    manga_id_map: Option<&'a MangaIdMap>,
}

impl<'a> FetchAdapter<'a> {
    pub fn new(extension_name: &'a str, manga_id_map: Option<&'a MangaIdMap>) -> Self {
        Self {
            extension_name,
            manga_id_map,
        }
    }

    /// Run the fetch contract against an extension
    ///
    /// The full listing is only requested in full mode.
    pub async fn fetch(
        extension: &mut dyn Extension,
        posted_chapter_ids: &HashSet<String>,
        mode: RunMode,
    ) -> Result<FetchedBatch, FetchError> {
        let fetch_all = mode.fetch_all_chapters();
        extension
            .update_external_data(posted_chapter_ids, fetch_all)
            .await?;

        let updated_chapters = extension.get_updated_chapters().await?;
        let all_chapters = if fetch_all {
            extension.get_all_chapters().await?
        } else {
            None
        };
        let updated_manga = extension.get_updated_manga().await?;

        let adapter = FetchAdapter::new(extension.name(), extension.manga_id_map());
        let batch = FetchedBatch {
            updated_chapters: adapter.chapters(UPDATED_CHAPTERS, updated_chapters)?,
            all_chapters: all_chapters
                .map(|raw| adapter.chapter_list(ALL_CHAPTERS, raw))
                .transpose()?,
            updated_manga: adapter.manga(updated_manga)?,
        };

        tracing::debug!(
            extension = extension.name(),
            updated = batch.updated_chapters.len(),
            all = batch.all_chapters.as_ref().map(Vec::len),
            manga = batch.updated_manga.len(),
            "Fetched extension data"
        );
        Ok(batch)
    }

    /// Validate a required chapter list
    pub fn chapters(
        &self,
        accessor: &'static str,
        raw: Option<Vec<RawChapter>>,
    ) -> Result<Vec<Chapter>, ValidationError> {
        let raw = raw.ok_or_else(|| ValidationError::missing_list(accessor))?;
        self.chapter_list(accessor, raw)
    }

    pub fn chapter_list(
        &self,
        accessor: &'static str,
        raw: Vec<RawChapter>,
    ) -> Result<Vec<Chapter>, ValidationError> {
        raw.into_iter()
            .enumerate()
            .map(|(index, chapter)| self.chapter(accessor, index, chapter))
            .collect()
    }

    /// Validate the required manga list
    pub fn manga(&self, raw: Option<Vec<RawManga>>) -> Result<Vec<Manga>, ValidationError> {
        let raw = raw.ok_or_else(|| ValidationError::missing_list(UPDATED_MANGA))?;
        raw.into_iter()
            .enumerate()
            .map(|(index, manga)| self.single_manga(index, manga))
            .collect()
    }

    fn chapter(
        &self,
        accessor: &'static str,
        index: usize,
        raw: RawChapter,
    ) -> Result<Chapter, ValidationError> {
        let invalid = |field: &'static str, reason: &str| {
            ValidationError::field(accessor, index, field, reason)
        };

        let chapter_id = raw
            .chapter_id
            .map(|id| id.into_key())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| invalid("chapter_id", "missing"))?;
        let chapter_url =
            non_empty(raw.chapter_url).ok_or_else(|| invalid("chapter_url", "missing"))?;
        let chapter_timestamp = raw
            .chapter_timestamp
            .ok_or_else(|| invalid("chapter_timestamp", "missing"))?
            .to_datetime()
            .ok_or_else(|| invalid("chapter_timestamp", "not a valid instant"))?;

        let chapter_expire = match raw.chapter_expire {
            Some(expire) => {
                let expire = expire
                    .to_datetime()
                    .ok_or_else(|| invalid("chapter_expire", "not a valid instant"))?;
                if expire < chapter_timestamp {
                    return Err(invalid("chapter_expire", "earlier than chapter_timestamp"));
                }
                Some(expire)
            }
            None => None,
        };

        let chapter_language =
            non_empty(raw.chapter_language).ok_or_else(|| invalid("chapter_language", "missing"))?;
        if !is_valid_language(&chapter_language) {
            return Err(invalid("chapter_language", "not a language code"));
        }

        let manga_id = raw
            .manga_id
            .map(|id| id.into_key())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| invalid("manga_id", "missing"))?;
        let md_manga_id = non_empty(raw.md_manga_id)
            .or_else(|| self.resolve_md_id(&manga_id))
            .ok_or_else(|| invalid("md_manga_id", "missing and not in manga id map"))?;

        Ok(Chapter {
            chapter_id,
            chapter_url,
            chapter_timestamp,
            chapter_expire,
            chapter_title: raw.chapter_title,
            chapter_number: raw.chapter_number,
            chapter_language,
            chapter_volume: non_empty(raw.chapter_volume),
            manga_id,
            md_manga_id,
            manga_name: raw.manga_name,
            manga_url: raw.manga_url,
            extension_name: self.extension_name.to_string(),
        })
    }

    fn single_manga(&self, index: usize, raw: RawManga) -> Result<Manga, ValidationError> {
        let invalid = |field: &'static str, reason: &str| {
            ValidationError::field(UPDATED_MANGA, index, field, reason)
        };

        let manga_id = raw
            .manga_id
            .map(|id| id.into_key())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| invalid("manga_id", "missing"))?;
        let manga_name = non_empty(raw.manga_name).ok_or_else(|| invalid("manga_name", "missing"))?;
        if raw.manga_languages.iter().any(|l| !is_valid_language(l)) {
            return Err(invalid("manga_languages", "not a language code"));
        }

        Ok(Manga {
            md_manga_id: non_empty(raw.md_manga_id).or_else(|| self.resolve_md_id(&manga_id)),
            manga_id,
            manga_name,
            manga_url: raw.manga_url,
            manga_languages: raw.manga_languages,
        })
    }

    fn resolve_md_id(&self, manga_id: &str) -> Option<String> {
        self.manga_id_map
            .and_then(|map| map.md_id_for(manga_id))
            .map(String::from)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
