// Core data structures for the publoader orchestrator

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Run mode of a single extension invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Only newly updated chapters are fetched
    Incremental,
    /// The complete chapter listing is fetched as well, enabling delete detection
    Full,
}

impl RunMode {
    /// Whether the extension should be asked for every chapter
    pub fn fetch_all_chapters(&self) -> bool {
        matches!(self, Self::Full)
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::Full => "full",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated chapter as published by a source extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub chapter_id: String,
    pub chapter_url: String,
    pub chapter_timestamp: DateTime<Utc>,
    pub chapter_expire: Option<DateTime<Utc>>,
    pub chapter_title: Option<String>,
    pub chapter_number: Option<String>,
    pub chapter_language: String,
    pub chapter_volume: Option<String>,
    pub manga_id: String,  // Source-side series id
    pub md_manga_id: String, // Destination-side series id
    pub manga_name: Option<String>,
    pub manga_url: Option<String>,
    pub extension_name: String,
}

impl Chapter {
    /// Whether the chapter has expired at the given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.chapter_expire.is_some_and(|expire| expire < now)
    }
}

/// A tracked or newly discovered series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manga {
    pub manga_id: String,
    pub md_manga_id: Option<String>,
    pub manga_name: String,
    pub manga_url: Option<String>,
    pub manga_languages: Vec<String>,
}

// ============================================================================
// Raw extension output
// ============================================================================

/// Identifier as emitted by an extension (some sources use numeric ids)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    /// Canonical string form used as reconciliation key
    pub fn into_key(self) -> String {
        match self {
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for RawId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Timestamp as emitted by an extension: unix seconds or RFC 3339 text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Seconds(i64),
    Text(String),
}

impl RawTimestamp {
    /// Parse into a timezone-aware instant
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Seconds(secs) => Utc.timestamp_opt(*secs, 0).single(),
            Self::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Text(value.to_rfc3339())
    }
}

/// Chapter record exactly as produced by an extension, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawChapter {
    pub chapter_id: Option<RawId>,
    pub chapter_url: Option<String>,
    pub chapter_timestamp: Option<RawTimestamp>,
    pub chapter_expire: Option<RawTimestamp>,
    pub chapter_title: Option<String>,
    pub chapter_number: Option<String>,
    pub chapter_language: Option<String>,
    pub chapter_volume: Option<String>,
    pub manga_id: Option<RawId>,
    pub md_manga_id: Option<String>,
    pub manga_name: Option<String>,
    pub manga_url: Option<String>,
}

/// Manga record exactly as produced by an extension, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawManga {
    pub manga_id: Option<RawId>,
    pub md_manga_id: Option<String>,
    pub manga_name: Option<String>,
    pub manga_url: Option<String>,
    #[serde(default)]
    pub manga_languages: Vec<String>,
}

// ============================================================================
// Persisted state
// ============================================================================

/// A chapter id recorded as posted, with the series it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostedChapter {
    pub chapter_id: String,
    pub md_manga_id: String,
}

/// Persisted reconciliation state of one extension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionState {
    pub posted: Vec<PostedChapter>,
    pub tracked_manga: HashSet<String>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_clean_run: Option<NaiveDate>,
}

impl ExtensionState {
    /// Set of previously posted chapter ids
    pub fn posted_ids(&self) -> HashSet<String> {
        self.posted.iter().map(|p| p.chapter_id.clone()).collect()
    }

    /// Whether this extension has never completed a run
    pub fn is_fresh(&self) -> bool {
        self.last_run.is_none()
    }
}
