//! Chapter title sanitisation
//!
//! Publisher titles usually carry a chapter prefix (`Chapter 12: The Duel`,
//! `#12 The Duel`, `Ep. 12 - The Duel`). The first matching rule of the
//! cascade removes that prefix once.

use regex::Regex;
use std::sync::LazyLock;

// Pre-compiled regex patterns, in cascade order
static FINAL_CHAPTER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:final|last)\s?(?:chapter|ep|episode)\s?[:.]\s?").unwrap()
});

static COLON_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:\S+\s?)?\d+(?:[,\-.]\d{0,2})?\s?:\s?").unwrap());

static NO_TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\S+\s?\d+(?:[,\-.]\d{0,2})?$").unwrap());

static PERIOD_DASH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:\S+\s?)?\d+(?:[,\-.]\d{0,2})?\s?[./\-]\s?").unwrap());

static HASHTAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:\S+\s?)?#\d+(?:[,\-.]\d{0,2})?\s?").unwrap());

static SPACES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:\S+\s?)?\d+(?:[,\-.]\d{0,2})?\s?").unwrap());

/// Which rule of the cascade produced a sanitised title
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleRule {
    Custom,
    FinalChapter,
    WordNumbers,
    Colon,
    NoTitle,
    PeriodDash,
    Hashtag,
    Spaces,
    Unchanged,
}

/// Title sanitiser for one extension's override table
#[derive(Debug, Clone, Default)]
pub struct TitleSanitizer {
    word_numbers: Option<Regex>,
}

impl TitleSanitizer {
    /// Build a sanitiser that also recognises spelled-out numbers
    ///
    /// `words` come from the `num2words` override option, e.g. `["one", "two"]`.
    pub fn with_number_words(words: &[String]) -> Result<Self, regex::Error> {
        if words.is_empty() {
            return Ok(Self::default());
        }

        let alternatives = words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        let pattern =
            format!(r"(?i)^(?:\S+\s?)\s?({alternatives})\s?(?:({alternatives})\s?)?:\s?");

        Ok(Self {
            word_numbers: Some(Regex::new(&pattern)?),
        })
    }

    /// Pick the cascade rule for a title
    pub fn select_rule<'a>(
        &'a self,
        title: &str,
        custom: Option<&'a Regex>,
    ) -> (TitleRule, Option<&'a Regex>) {
        if let Some(custom) = custom {
            return (TitleRule::Custom, Some(custom));
        }

        let cascade: [(TitleRule, Option<&Regex>); 7] = [
            (TitleRule::FinalChapter, Some(&*FINAL_CHAPTER_REGEX)),
            (TitleRule::WordNumbers, self.word_numbers.as_ref()),
            (TitleRule::Colon, Some(&*COLON_REGEX)),
            (TitleRule::NoTitle, Some(&*NO_TITLE_REGEX)),
            (TitleRule::PeriodDash, Some(&*PERIOD_DASH_REGEX)),
            (TitleRule::Hashtag, Some(&*HASHTAG_REGEX)),
            (TitleRule::Spaces, Some(&*SPACES_REGEX)),
        ];

        cascade
            .into_iter()
            .find_map(|(rule, regex)| regex.filter(|r| r.is_match(title)).map(|r| (rule, Some(r))))
            .unwrap_or((TitleRule::Unchanged, None))
    }

    /// Sanitise a non-empty raw title
    ///
    /// Returns `None` when nothing meaningful remains after removing the prefix.
    pub fn sanitize(&self, title: &str, custom: Option<&Regex>) -> Option<String> {
        let original = title.trim();
        if original.eq_ignore_ascii_case("final chapter") {
            return None;
        }

        let (rule, regex) = self.select_rule(original, custom);
        let sanitized = match regex {
            Some(regex) => regex.replacen(original, 1, "").trim().to_string(),
            None => original.to_string(),
        };

        tracing::trace!(?rule, original, sanitized = %sanitized, "Sanitised chapter title");

        match sanitized.to_lowercase().as_str() {
            "" | "none" | "null" => None,
            _ => Some(sanitized),
        }
    }
}
