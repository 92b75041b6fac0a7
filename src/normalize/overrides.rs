//! Per-extension override options
//!
//! `override_options.json` is parsed into [`OverrideOptions`] (the file
//! schema) and compiled once per run into an [`OverrideTable`]. Compilation
//! validates every entry, so the normaliser never probes loosely typed data.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

use super::number::is_canonical_chapter_number;
use super::title::TitleSanitizer;
use super::is_valid_language;

/// Errors raised while loading or compiling override options
#[derive(Error, Debug)]
pub enum OverrideError {
    /// Override file could not be read
    #[error("Failed to read override options '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Override file is not valid JSON for the schema
    #[error("Invalid override options: {0}")]
    Json(#[from] serde_json::Error),

    /// A `custom` title regex does not compile
    #[error("Invalid custom title regex for manga {manga_id}: {source}")]
    InvalidRegex {
        manga_id: String,
        #[source]
        source: regex::Error,
    },

    /// The `num2words` list does not compile into a pattern
    #[error("Invalid num2words list: {0}")]
    InvalidNumberWords(#[source] regex::Error),

    /// A replacement chapter number is not canonical
    #[error("Invalid chapter number '{value}' for chapter {chapter_id} in {field}")]
    InvalidChapterNumber {
        field: &'static str,
        chapter_id: String,
        value: String,
    },

    /// A `custom_language` entry is not a language code
    #[error("Invalid language '{language}' for manga {manga_id}")]
    InvalidLanguage { manga_id: String, language: String },

    /// A chapter id is declared a duplicate of more than one kept id
    #[error("Chapter {duplicate} is listed under several kept ids: {keeps:?}")]
    ConflictingSame {
        duplicate: String,
        keeps: Vec<String>,
    },

    /// A duplicate chapter id is itself a kept id with duplicates
    #[error("Chapter {duplicate} is a duplicate of {keep} and also keeps {duplicates:?}")]
    ChainedSame {
        duplicate: String,
        keep: String,
        duplicates: Vec<String>,
    },
}

/// Schema of `override_options.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverrideOptions {
    /// Manga ids whose chapters carry no title
    pub empty: Vec<String>,
    /// Manga ids whose titles bypass sanitisation
    pub noformat: Vec<String>,
    /// Manga id to title regex
    pub custom: HashMap<String, String>,
    /// Kept chapter id to duplicate chapter ids
    pub same: HashMap<String, Vec<String>>,
    /// Manga id to language code
    pub custom_language: HashMap<String, String>,
    /// Chapter id to the chapter numbers it spans
    pub multi_chapters: HashMap<String, Vec<String>>,
    /// Chapter id to replacement chapter number
    pub override_chapter_numbers: HashMap<String, String>,
    /// Spelled-out numbers recognised in title prefixes
    pub num2words: Vec<String>,
}

impl OverrideOptions {
    /// Load from file; a missing file yields empty options
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OverrideError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path).map_err(|source| OverrideError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Compiled, validated override table used by the normaliser
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    empty: HashSet<String>,
    noformat: HashSet<String>,
    custom: HashMap<String, Regex>,
    same: HashMap<String, Vec<String>>,
    duplicate_of: HashMap<String, String>,
    custom_language: HashMap<String, String>,
    multi_chapters: HashMap<String, Vec<String>>,
    override_chapter_numbers: HashMap<String, String>,
    titles: TitleSanitizer,
}

impl OverrideTable {
    /// Validate and compile override options
    pub fn compile(options: OverrideOptions) -> Result<Self, OverrideError> {
        let mut custom = HashMap::with_capacity(options.custom.len());
        for (manga_id, pattern) in options.custom {
            let regex = regex::RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| OverrideError::InvalidRegex {
                    manga_id: manga_id.clone(),
                    source,
                })?;
            custom.insert(manga_id, regex);
        }

        for (manga_id, language) in &options.custom_language {
            if !is_valid_language(language) {
                return Err(OverrideError::InvalidLanguage {
                    manga_id: manga_id.clone(),
                    language: language.clone(),
                });
            }
        }

        for (chapter_id, number) in &options.override_chapter_numbers {
            check_number("override_chapter_numbers", chapter_id, number)?;
        }
        for (chapter_id, numbers) in &options.multi_chapters {
            for number in numbers {
                check_number("multi_chapters", chapter_id, number)?;
            }
        }

        let mut owners: HashMap<String, Vec<String>> = HashMap::new();
        for (keep, duplicates) in &options.same {
            for duplicate in duplicates {
                if duplicate != keep {
                    owners.entry(duplicate.clone()).or_default().push(keep.clone());
                }
            }
        }
        let mut duplicate_of = HashMap::with_capacity(owners.len());
        for (duplicate, mut keeps) in owners {
            if keeps.len() > 1 {
                keeps.sort();
                return Err(OverrideError::ConflictingSame { duplicate, keeps });
            }
            duplicate_of.insert(duplicate, keeps.remove(0));
        }
        // Chains and cycles would make canonical ids depend on lookup depth
        for (duplicate, keep) in &duplicate_of {
            let mut duplicates: Vec<String> = options
                .same
                .get(duplicate)
                .into_iter()
                .flatten()
                .filter(|id| *id != duplicate)
                .cloned()
                .collect();
            if !duplicates.is_empty() {
                duplicates.sort();
                return Err(OverrideError::ChainedSame {
                    duplicate: duplicate.clone(),
                    keep: keep.clone(),
                    duplicates,
                });
            }
        }

        let titles = TitleSanitizer::with_number_words(&options.num2words)
            .map_err(OverrideError::InvalidNumberWords)?;

        Ok(Self {
            empty: options.empty.into_iter().collect(),
            noformat: options.noformat.into_iter().collect(),
            custom,
            same: options.same,
            duplicate_of,
            custom_language: options.custom_language,
            multi_chapters: options.multi_chapters,
            override_chapter_numbers: options.override_chapter_numbers,
            titles,
        })
    }

    /// Load and compile from an `override_options.json` path
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OverrideError> {
        Self::compile(OverrideOptions::load(path)?)
    }

    pub fn allows_empty_title(&self, manga_id: &str) -> bool {
        self.empty.contains(manga_id)
    }

    pub fn skips_title_format(&self, manga_id: &str) -> bool {
        self.noformat.contains(manga_id)
    }

    pub fn custom_title_regex(&self, manga_id: &str) -> Option<&Regex> {
        self.custom.get(manga_id)
    }

    pub fn custom_language(&self, manga_id: &str) -> Option<&str> {
        self.custom_language.get(manga_id).map(String::as_str)
    }

    pub fn override_number(&self, chapter_id: &str) -> Option<&str> {
        self.override_chapter_numbers.get(chapter_id).map(String::as_str)
    }

    pub fn multi_chapter_numbers(&self, chapter_id: &str) -> Option<&[String]> {
        self.multi_chapters.get(chapter_id).map(Vec::as_slice)
    }

    /// Kept chapter id if `chapter_id` is a declared duplicate
    pub fn kept_id_for(&self, chapter_id: &str) -> Option<&str> {
        self.duplicate_of.get(chapter_id).map(String::as_str)
    }

    /// Duplicates declared for a kept chapter id
    pub fn duplicates_of(&self, keep_id: &str) -> &[String] {
        self.same.get(keep_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Map a chapter id to the id it is reconciled under
    pub fn canonical_id<'a>(&'a self, chapter_id: &'a str) -> &'a str {
        self.kept_id_for(chapter_id).unwrap_or(chapter_id)
    }

    pub fn titles(&self) -> &TitleSanitizer {
        &self.titles
    }
}

fn check_number(field: &'static str, chapter_id: &str, number: &str) -> Result<(), OverrideError> {
    if is_canonical_chapter_number(number) {
        Ok(())
    } else {
        Err(OverrideError::InvalidChapterNumber {
            field,
            chapter_id: chapter_id.to_string(),
            value: number.to_string(),
        })
    }
}
