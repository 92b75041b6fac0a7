//! Failure isolation tests
//!
//! Every failure stays inside the run that caused it: other extensions in
//! the same tick still complete and commit, and the failed run leaves its
//! persisted state untouched.

use std::sync::Arc;
use std::time::Duration;

use publoader::models::RawChapter;
use publoader::runner::RunErrorKind;
use publoader::storage::{MemoryStateStore, StateStore};
use publoader::upload::LoggingSink;

use super::fixtures::{orchestrator, posted_state, titled, tuesday_nine, ScriptedExtension};

#[tokio::test]
async fn test_fetch_failure_is_isolated() {
    let store = Arc::new(MemoryStateStore::new());
    let (broken, broken_script) = ScriptedExtension::new("broken");
    broken_script.lock().unwrap().fail = true;
    let (healthy, healthy_script) = ScriptedExtension::new("healthy");
    healthy_script.lock().unwrap().updated = vec![titled("1")];

    let orch = orchestrator(vec![broken, healthy], store.clone(), Arc::new(LoggingSink));
    let report = orch.run_tick(tuesday_nine()).await;

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.failed().count(), 1);

    let failed = report.outcome("broken").unwrap();
    let err = failed.result.as_ref().unwrap_err();
    assert_eq!(err.kind(), RunErrorKind::FetchFailure);
    assert!(err.is_fetch_failure());

    let ok = report.outcome("healthy").unwrap();
    assert_eq!(ok.result.as_ref().unwrap().uploaded, 1);

    assert!(store.load_state("broken").unwrap().is_fresh());
    assert!(store.get_posted_ids("healthy").unwrap().contains("1"));
    assert_eq!(store.commit_count(), 1);
}

#[tokio::test]
async fn test_malformed_output_is_validation_error() {
    let store = Arc::new(MemoryStateStore::new());
    let (extension, script) = ScriptedExtension::new("mangaplus");
    let mut missing_url = titled("2");
    missing_url.chapter_url = None;
    script.lock().unwrap().updated = vec![titled("1"), missing_url];

    let orch = orchestrator(vec![extension], store.clone(), Arc::new(LoggingSink));
    let report = orch.run_tick(tuesday_nine()).await;

    let outcome = report.outcome("mangaplus").unwrap();
    assert_eq!(outcome.label(), "validation");
    assert_eq!(store.commit_count(), 0);
}

#[tokio::test]
async fn test_invalid_override_file_fails_run() {
    let store = Arc::new(MemoryStateStore::new());
    let (extension, script) = ScriptedExtension::new("mangaplus");
    {
        let mut script = script.lock().unwrap();
        script.updated = vec![titled("1")];
        script
            .overrides
            .custom
            .insert("100".to_string(), "(unclosed".to_string());
    }

    let orch = orchestrator(vec![extension], store.clone(), Arc::new(LoggingSink));
    let report = orch.run_tick(tuesday_nine()).await;

    assert_eq!(report.outcome("mangaplus").unwrap().label(), "validation");
    assert_eq!(store.commit_count(), 0);
}

#[tokio::test]
async fn test_chained_same_override_fails_before_delete() {
    let store = Arc::new(MemoryStateStore::new().with_state("mangaplus", posted_state(&["K"])));
    let (extension, script) = ScriptedExtension::new("mangaplus");
    {
        let mut script = script.lock().unwrap();
        script.all = Some(vec![titled("E")]);
        script.overrides.same.insert("K".to_string(), vec!["D".to_string()]);
        script.overrides.same.insert("D".to_string(), vec!["E".to_string()]);
    }

    let orch = orchestrator(vec![extension], store.clone(), Arc::new(LoggingSink));
    let report = orch
        .run_forced("mangaplus", publoader::RunMode::Full, tuesday_nine())
        .await
        .unwrap();

    assert_eq!(report.outcome("mangaplus").unwrap().label(), "validation");
    assert_eq!(store.commit_count(), 0);
    assert_eq!(store.load_state("mangaplus").unwrap(), posted_state(&["K"]));
}

#[tokio::test]
async fn test_timeout_leaves_state_untouched() {
    let store = Arc::new(MemoryStateStore::new().with_state("slow", posted_state(&["A"])));
    let (slow, script) = ScriptedExtension::new("slow");
    {
        let mut script = script.lock().unwrap();
        script.updated = vec![titled("1")];
        script.delay = Duration::from_secs(5);
    }

    let orch = orchestrator(vec![slow], store.clone(), Arc::new(LoggingSink));
    let report = orch.run_tick(tuesday_nine()).await;

    let err = report.outcome("slow").unwrap().result.as_ref().unwrap_err();
    assert_eq!(err.kind(), RunErrorKind::Timeout);
    assert!(err.is_fetch_failure());
    assert_eq!(store.load_state("slow").unwrap(), posted_state(&["A"]));
}

#[tokio::test]
async fn test_commit_failure_rolls_back_whole_run() {
    let store = Arc::new(MemoryStateStore::new().with_state("mangaplus", posted_state(&["A"])));
    store.set_fail_commits(true);
    let (extension, script) = ScriptedExtension::new("mangaplus");
    script.lock().unwrap().updated = vec![titled("1"), titled("2")];

    let orch = orchestrator(vec![extension], store.clone(), Arc::new(LoggingSink));
    let report = orch.run_tick(tuesday_nine()).await;

    let err = report.outcome("mangaplus").unwrap().result.as_ref().unwrap_err();
    assert_eq!(err.kind(), RunErrorKind::StateCommitFailure);
    assert!(err.risks_reupload());
    assert_eq!(store.load_state("mangaplus").unwrap(), posted_state(&["A"]));

    // Next run offers the same chapters again and commits them
    store.set_fail_commits(false);
    let report = orch
        .run_forced("mangaplus", publoader::RunMode::Incremental, tuesday_nine())
        .await
        .unwrap();
    let summary = report.outcome("mangaplus").unwrap().result.as_ref().unwrap();
    assert_eq!(summary.uploaded, 2);
    assert_eq!(store.get_posted_ids("mangaplus").unwrap().len(), 3);
}

#[tokio::test]
async fn test_busy_extension_reports_already_running() {
    let store = Arc::new(MemoryStateStore::new());
    let (extension, script) = ScriptedExtension::new("mangaplus");
    script.lock().unwrap().updated = vec![titled("1")];

    let orch = orchestrator(vec![extension], store.clone(), Arc::new(LoggingSink));

    let handle = orch.registry().get("mangaplus").unwrap().clone();
    let guard = handle.try_acquire().unwrap();
    assert!(handle.is_busy());

    let report = orch.run_tick(tuesday_nine()).await;
    assert_eq!(
        report.outcome("mangaplus").unwrap().result.as_ref().unwrap_err().kind(),
        RunErrorKind::AlreadyRunning
    );
    assert_eq!(store.commit_count(), 0);

    drop(guard);
    let report = orch.run_tick(tuesday_nine()).await;
    assert!(report.outcome("mangaplus").unwrap().is_success());
    assert_eq!(orch.stats().runs_overlapped, 1);
}

#[tokio::test]
async fn test_unknown_forced_extension() {
    let orch = orchestrator(
        Vec::new(),
        Arc::new(MemoryStateStore::new()),
        Arc::new(LoggingSink),
    );
    assert!(orch
        .run_forced("missing", publoader::RunMode::Full, tuesday_nine())
        .await
        .is_none());
}

#[tokio::test]
async fn test_unknown_raw_field_is_rejected_at_parse() {
    let json = r#"{"chapter_id": "1", "chapter_pages": 12}"#;
    assert!(serde_json::from_str::<RawChapter>(json).is_err());
}
