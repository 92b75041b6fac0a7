//! Property tests for reconciliation invariants

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

use publoader::extension::FetchedBatch;
use publoader::models::{ExtensionState, RunMode};
use publoader::normalize::{OverrideOptions, OverrideTable};
use publoader::reconciler::Reconciler;

use super::fixtures::{chapter, compile, posted_state, tuesday_nine};

fn chapter_ids() -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set("[a-z0-9]{1,6}", 1..12).prop_map(|ids| ids.into_iter().collect())
}

fn batch_of(ids: &[String]) -> FetchedBatch {
    FetchedBatch {
        updated_chapters: ids
            .iter()
            .map(|id| chapter(id, Some("1"), Some("Chapter 1: Title")))
            .collect(),
        ..Default::default()
    }
}

proptest! {
    #[test]
    fn prop_posted_chapters_are_never_reuploaded(
        ids in chapter_ids(),
        posted_mask in prop::collection::vec(any::<bool>(), 12),
    ) {
        let posted: Vec<&str> = ids
            .iter()
            .zip(&posted_mask)
            .filter(|(_, posted)| **posted)
            .map(|(id, _)| id.as_str())
            .collect();
        let state = posted_state(&posted);
        let overrides = OverrideTable::default();

        for mode in [RunMode::Incremental, RunMode::Full] {
            let plan = Reconciler::new("fixture", &overrides, mode, tuesday_nine())
                .plan(batch_of(&ids), &state, &[]);

            for unit in &plan.to_upload {
                prop_assert!(!posted.contains(&unit.id()));
            }
            let skipped: HashSet<&str> = plan.to_skip.iter().map(String::as_str).collect();
            prop_assert_eq!(skipped, posted.iter().copied().collect::<HashSet<_>>());
        }
    }

    #[test]
    fn prop_rerun_after_commit_uploads_nothing(ids in chapter_ids()) {
        let overrides = OverrideTable::default();
        let reconciler =
            Reconciler::new("fixture", &overrides, RunMode::Incremental, tuesday_nine());

        let first = reconciler.plan(batch_of(&ids), &ExtensionState::default(), &[]);
        let mut state = ExtensionState::default();
        first
            .commit_for(&publoader::upload::DispatchReport::acknowledge_all(&first))
            .apply_to(&mut state);

        let second = reconciler.plan(batch_of(&ids), &state, &[]);
        prop_assert!(second.to_upload.is_empty());
        prop_assert_eq!(second.to_skip.len(), ids.len());
    }

    #[test]
    fn prop_same_group_collapses_to_kept_chapter(
        duplicates in 1usize..5,
        include_keep in any::<bool>(),
    ) {
        let dup_ids: Vec<String> = (0..duplicates).map(|i| format!("D{i}")).collect();
        let overrides = compile(OverrideOptions {
            same: HashMap::from([("K".to_string(), dup_ids.clone())]),
            ..Default::default()
        });

        let mut ids = dup_ids.clone();
        if include_keep {
            ids.push("K".to_string());
        }

        let plan = Reconciler::new("fixture", &overrides, RunMode::Incremental, tuesday_nine())
            .plan(batch_of(&ids), &ExtensionState::default(), &[]);

        let uploaded: Vec<&str> = plan.to_upload.iter().map(|u| u.id()).collect();
        if include_keep {
            prop_assert_eq!(uploaded, vec!["K"]);
        } else {
            prop_assert!(uploaded.is_empty());
        }
        prop_assert_eq!(plan.suppressed, duplicates);
    }

    #[test]
    fn prop_suffixed_numbers_always_rejected(
        number in "[0-9]{1,3}(\\.[0-9])?[a-z]",
        title in prop::option::of("[A-Za-z ]{1,20}"),
    ) {
        let overrides = compile(OverrideOptions {
            empty: vec!["100".to_string()],
            ..Default::default()
        });
        let batch = FetchedBatch {
            updated_chapters: vec![chapter("1", Some(&number), title.as_deref())],
            ..Default::default()
        };

        let plan = Reconciler::new("fixture", &overrides, RunMode::Incremental, tuesday_nine())
            .plan(batch, &ExtensionState::default(), &[]);

        prop_assert!(plan.to_upload.is_empty());
        prop_assert_eq!(plan.rejected.len(), 1);
        prop_assert_eq!(plan.rejected[0].reason(), "invalid_number");
    }
}
