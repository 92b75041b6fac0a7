//! Chapter-number cleanup and canonical format validation
//!
//! Extensions report chapter numbers in many shapes (`"#007"`, `"12-5"`,
//! `"One-Shot"`, `"12,13"`). These helpers reduce them to the canonical
//! `digits[.digits]` form before the number-format check.

use regex::Regex;
use std::sync::LazyLock;

static CHAPTER_NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)?$").unwrap());

static NUMBER_PART_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.\-]").unwrap());

static SPIN_OFF_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:spin-off|spin\.off)\s?").unwrap());

/// Check a chapter number against the canonical pattern (`12`, `12.5`)
///
/// # Examples
///
/// ```
/// use publoader::normalize::number::is_canonical_chapter_number;
///
/// assert!(is_canonical_chapter_number("12.5"));
/// assert!(!is_canonical_chapter_number("12.5a"));
/// ```
pub fn is_canonical_chapter_number(number: &str) -> bool {
    CHAPTER_NUMBER_REGEX.is_match(number)
}

/// Strip `#`, surrounding whitespace and leading zeros; `-` becomes `.`
///
/// # Examples
///
/// ```
/// use publoader::normalize::number::strip_chapter_number;
///
/// assert_eq!(strip_chapter_number("#007"), "7");
/// assert_eq!(strip_chapter_number("12-5"), "12.5");
/// assert_eq!(strip_chapter_number("000"), "0");
/// ```
pub fn strip_chapter_number(number: &str) -> String {
    let stripped = number.trim().trim_matches('#').trim();

    let mut parts: Vec<&str> = NUMBER_PART_SEPARATOR.split(stripped).collect();
    let integer = parts[0].trim_start_matches('0');
    parts[0] = if integer.is_empty() { "0" } else { integer };

    parts.join(".")
}

/// Turn a raw chapter number into its ordered list of numbers
///
/// An empty list means the chapter has no number (one-shots, missing).
pub fn clean_chapter_numbers(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };

    let lowered = raw.to_lowercase();
    if matches!(lowered.as_str(), "one-shot" | "one.shot" | "oneshot") {
        return Vec::new();
    }

    let without_prefix = SPIN_OFF_PREFIX.replace(raw, "");

    without_prefix
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(strip_chapter_number)
        .collect()
}
