//! Normalisation and reconciliation scenarios

use std::collections::HashMap;

use publoader::extension::FetchedBatch;
use publoader::models::{ExtensionState, RunMode};
use publoader::normalize::{ChapterRejected, OverrideOptions, OverrideTable};
use publoader::reconciler::Reconciler;

use super::fixtures::{chapter, compile, posted_state, tuesday_nine, MD_MANGA};

fn incremental(batch: Vec<publoader::Chapter>) -> FetchedBatch {
    FetchedBatch {
        updated_chapters: batch,
        ..Default::default()
    }
}

fn upload_ids(plan: &publoader::reconciler::ReconcilePlan) -> Vec<&str> {
    let mut ids: Vec<&str> = plan.to_upload.iter().map(|u| u.id()).collect();
    ids.sort_unstable();
    ids
}

// ============================================================================
// Chapter rejection
// ============================================================================

#[test]
fn test_non_canonical_number_is_rejected() {
    let overrides = OverrideTable::default();
    let reconciler = Reconciler::new("fixture", &overrides, RunMode::Incremental, tuesday_nine());

    let batch = incremental(vec![
        chapter("1", Some("12.5a"), Some("Chapter 12.5a: Extra")),
        chapter("2", Some("13"), Some("Chapter 13: Next")),
    ]);
    let plan = reconciler.plan(batch, &ExtensionState::default(), &[]);

    assert_eq!(upload_ids(&plan), vec!["2"]);
    assert_eq!(plan.rejected.len(), 1);
    assert!(matches!(
        &plan.rejected[0],
        ChapterRejected::InvalidNumber { chapter_id, number }
            if chapter_id == "1" && number == "12.5a"
    ));
}

#[test]
fn test_non_canonical_number_rejected_even_when_posted() {
    let overrides = OverrideTable::default();
    let reconciler = Reconciler::new("fixture", &overrides, RunMode::Incremental, tuesday_nine());

    let batch = incremental(vec![chapter("1", Some("12.5a"), Some("Extra"))]);
    let plan = reconciler.plan(batch, &posted_state(&["1"]), &[]);

    assert!(plan.to_upload.is_empty());
    assert!(plan.to_skip.is_empty());
    assert_eq!(plan.rejected[0].reason(), "invalid_number");
}

#[test]
fn test_null_title_requires_empty_override() {
    let without = OverrideTable::default();
    let reconciler = Reconciler::new("fixture", &without, RunMode::Incremental, tuesday_nine());
    let plan = reconciler.plan(
        incremental(vec![chapter("1", Some("3"), None)]),
        &ExtensionState::default(),
        &[],
    );
    assert!(plan.to_upload.is_empty());
    assert_eq!(plan.rejected[0].reason(), "missing_title");

    let with = compile(OverrideOptions {
        empty: vec!["100".to_string()],
        ..Default::default()
    });
    let reconciler = Reconciler::new("fixture", &with, RunMode::Incremental, tuesday_nine());
    let plan = reconciler.plan(
        incremental(vec![chapter("1", Some("3"), None)]),
        &ExtensionState::default(),
        &[],
    );
    assert_eq!(upload_ids(&plan), vec!["1"]);
    assert_eq!(plan.to_upload[0].chapter.chapter_title, None);
}

#[test]
fn test_expired_chapter_is_rejected() {
    let overrides = OverrideTable::default();
    let now = tuesday_nine();
    let reconciler = Reconciler::new("fixture", &overrides, RunMode::Incremental, now);

    let mut expired = chapter("1", Some("1"), Some("Chapter 1: Gone"));
    expired.chapter_expire = Some(now - chrono::Duration::minutes(1));

    let plan = reconciler.plan(incremental(vec![expired]), &ExtensionState::default(), &[]);
    assert!(plan.to_upload.is_empty());
    assert_eq!(plan.rejected[0].reason(), "expired");
}

#[test]
fn test_titles_and_numbers_are_normalised() {
    let overrides = OverrideTable::default();
    let reconciler = Reconciler::new("fixture", &overrides, RunMode::Incremental, tuesday_nine());

    let plan = reconciler.plan(
        incremental(vec![chapter("1", Some("#007"), Some("Chapter 7: The Duel"))]),
        &ExtensionState::default(),
        &[],
    );

    let unit = &plan.to_upload[0];
    assert_eq!(unit.chapter.chapter_number.as_deref(), Some("7"));
    assert_eq!(unit.chapter.chapter_title.as_deref(), Some("The Duel"));
}

#[test]
fn test_multi_chapter_override() {
    let overrides = compile(OverrideOptions {
        multi_chapters: HashMap::from([(
            "1".to_string(),
            vec!["4".to_string(), "5".to_string()],
        )]),
        ..Default::default()
    });
    let reconciler = Reconciler::new("fixture", &overrides, RunMode::Incremental, tuesday_nine());

    let plan = reconciler.plan(
        incremental(vec![chapter("1", Some("4-5"), Some("Double Issue"))]),
        &ExtensionState::default(),
        &[],
    );

    let unit = &plan.to_upload[0];
    assert!(unit.is_multi_chapter());
    assert_eq!(unit.chapter_numbers, vec!["4", "5"]);
    assert_eq!(unit.chapter.chapter_number.as_deref(), Some("4"));
}

#[test]
fn test_custom_language_override() {
    let overrides = compile(OverrideOptions {
        custom_language: HashMap::from([("100".to_string(), "es-la".to_string())]),
        ..Default::default()
    });
    let reconciler = Reconciler::new("fixture", &overrides, RunMode::Incremental, tuesday_nine());

    let plan = reconciler.plan(
        incremental(vec![chapter("1", Some("1"), Some("Uno"))]),
        &ExtensionState::default(),
        &[],
    );
    assert_eq!(plan.to_upload[0].chapter.chapter_language, "es-la");
}

// ============================================================================
// Partition
// ============================================================================

#[test]
fn test_full_mode_deletes_missing_chapter() {
    let overrides = OverrideTable::default();
    let reconciler = Reconciler::new("fixture", &overrides, RunMode::Full, tuesday_nine());

    let batch = FetchedBatch {
        updated_chapters: Vec::new(),
        all_chapters: Some(vec![
            chapter("A", Some("1"), Some("One")),
            chapter("B", Some("2"), Some("Two")),
        ]),
        updated_manga: Vec::new(),
    };
    let plan = reconciler.plan(batch, &posted_state(&["A", "B", "C"]), &[]);

    let deleted: Vec<&str> = plan.to_delete.iter().map(|p| p.chapter_id.as_str()).collect();
    assert_eq!(deleted, vec!["C"]);
    assert_eq!(plan.to_delete[0].md_manga_id, MD_MANGA);
    assert!(plan.to_upload.is_empty());
    assert!(plan.delete_detection);
}

#[test]
fn test_rejected_chapter_in_listing_is_not_deleted() {
    let overrides = OverrideTable::default();
    let reconciler = Reconciler::new("fixture", &overrides, RunMode::Full, tuesday_nine());

    // B fails title validation but is still listed by the source
    let batch = FetchedBatch {
        all_chapters: Some(vec![
            chapter("A", Some("1"), Some("One")),
            chapter("B", Some("2"), None),
        ]),
        ..Default::default()
    };
    let plan = reconciler.plan(batch, &posted_state(&["A", "B"]), &[]);

    assert!(plan.to_delete.is_empty());
    assert_eq!(plan.rejected.len(), 1);
}

#[test]
fn test_suppressed_duplicate_keeps_kept_chapter_alive() {
    let overrides = compile(OverrideOptions {
        same: HashMap::from([("K".to_string(), vec!["D1".to_string()])]),
        ..Default::default()
    });
    let reconciler = Reconciler::new("fixture", &overrides, RunMode::Full, tuesday_nine());

    // Only the duplicate is listed; its canonical id counts as present
    let batch = FetchedBatch {
        all_chapters: Some(vec![chapter("D1", Some("1"), Some("One"))]),
        ..Default::default()
    };
    let plan = reconciler.plan(batch, &posted_state(&["K"]), &[]);

    assert!(plan.to_delete.is_empty());
    assert!(plan.to_upload.is_empty());
    assert_eq!(plan.suppressed, 1);
}

#[test]
fn test_new_manga_is_tracked() {
    let overrides = OverrideTable::default();
    let reconciler = Reconciler::new("fixture", &overrides, RunMode::Incremental, tuesday_nine());

    let batch = FetchedBatch {
        updated_manga: vec![publoader::Manga {
            manga_id: "200".to_string(),
            md_manga_id: Some("md-200".to_string()),
            manga_name: "New Series".to_string(),
            manga_url: None,
            manga_languages: vec!["en".to_string()],
        }],
        ..Default::default()
    };
    let plan = reconciler.plan(batch, &posted_state(&[]), &[]);

    assert_eq!(plan.new_tracked_manga, vec!["md-200"]);
    assert!(!plan.has_decisions());
}
