//! End-to-end tick tests
//!
//! Tests the complete workflow:
//! 1. Scheduler decision
//! 2. Extension fetch (scripted)
//! 3. Normalisation and reconciliation
//! 4. Upload dispatch
//! 5. State commit

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use publoader::models::{RawManga, RunMode};
use publoader::reconciler::ReconcilePlan;
use publoader::storage::{create_sqlite_store, MemoryStateStore, StateStore};
use publoader::upload::{
    DispatchReport, LoggingSink, UploadResult, UploadSink, WebhookConfig, WebhookSink,
};

use super::fixtures::{
    orchestrator, posted_state, titled, tuesday_nine, wednesday_nine, ScriptedExtension, MD_MANGA,
};

/// Sink that accepts everything and remembers each plan it saw
#[derive(Default)]
struct RecordingSink {
    plans: Mutex<Vec<(String, RunMode, Vec<String>, Vec<String>)>>,
}

impl RecordingSink {
    fn uploads(&self) -> Vec<String> {
        let plans = self.plans.lock().unwrap();
        plans.iter().flat_map(|p| p.2.clone()).collect()
    }

    fn deletes(&self) -> Vec<String> {
        let plans = self.plans.lock().unwrap();
        plans.iter().flat_map(|p| p.3.clone()).collect()
    }

    fn calls(&self) -> usize {
        self.plans.lock().unwrap().len()
    }
}

#[async_trait]
impl UploadSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn dispatch(&self, plan: &ReconcilePlan) -> UploadResult<DispatchReport> {
        self.plans.lock().unwrap().push((
            plan.extension.clone(),
            plan.mode,
            plan.to_upload.iter().map(|u| u.id().to_string()).collect(),
            plan.to_delete.iter().map(|p| p.chapter_id.clone()).collect(),
        ));
        Ok(DispatchReport::acknowledge_all(plan))
    }
}

// ============================================================================
// Complete Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_tick_uploads_and_commits() {
    let store = Arc::new(MemoryStateStore::new());
    let sink = Arc::new(RecordingSink::default());
    let (extension, script) = ScriptedExtension::new("mangaplus");
    script.lock().unwrap().updated = vec![titled("1"), titled("2")];

    let orch = orchestrator(vec![extension], store.clone(), sink.clone());
    let report = orch.run_tick(tuesday_nine()).await;

    let outcome = report.outcome("mangaplus").unwrap();
    let summary = outcome.result.as_ref().unwrap();
    assert_eq!(outcome.mode, RunMode::Incremental);
    assert_eq!(summary.uploaded, 2);
    assert_eq!(summary.skipped, 0);

    let state = store.load_state("mangaplus").unwrap();
    assert_eq!(state.posted_ids().len(), 2);
    assert_eq!(state.last_run, Some(tuesday_nine()));
    assert!(state.last_clean_run.is_none());
    assert!(state.posted.iter().all(|p| p.md_manga_id == MD_MANGA));

    let mut uploads = sink.uploads();
    uploads.sort();
    assert_eq!(uploads, vec!["1", "2"]);
}

#[tokio::test]
async fn test_second_run_skips_posted_chapters() {
    let store = Arc::new(MemoryStateStore::new());
    let sink = Arc::new(RecordingSink::default());
    let (extension, script) = ScriptedExtension::new("mangaplus");
    script.lock().unwrap().updated = vec![titled("1")];

    let orch = orchestrator(vec![extension], store.clone(), sink.clone());
    orch.run_tick(tuesday_nine()).await;

    script.lock().unwrap().updated = vec![titled("1"), titled("2")];
    let next_day = tuesday_nine() + chrono::Duration::days(1);
    let report = orch
        .run_forced("mangaplus", RunMode::Incremental, next_day)
        .await
        .unwrap();

    let summary = report.outcome("mangaplus").unwrap().result.as_ref().unwrap();
    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(sink.uploads(), vec!["1", "2"]);
}

#[tokio::test]
async fn test_nothing_to_dispatch_skips_sink_but_commits() {
    let store = Arc::new(MemoryStateStore::new().with_state("mangaplus", posted_state(&["1"])));
    let sink = Arc::new(RecordingSink::default());
    let (extension, script) = ScriptedExtension::new("mangaplus");
    script.lock().unwrap().updated = vec![titled("1")];

    let orch = orchestrator(vec![extension], store.clone(), sink.clone());
    let report = orch.run_tick(tuesday_nine()).await;

    assert!(report.outcome("mangaplus").unwrap().is_success());
    assert_eq!(sink.calls(), 0);
    assert_eq!(store.commit_count(), 1);
    assert_eq!(store.load_state("mangaplus").unwrap().last_run, Some(tuesday_nine()));
}

#[tokio::test]
async fn test_clean_day_full_run_deletes_missing() {
    let store = Arc::new(
        MemoryStateStore::new().with_state("mangaplus", posted_state(&["A", "B", "C"])),
    );
    let sink = Arc::new(RecordingSink::default());
    let (extension, script) = ScriptedExtension::new("mangaplus");
    script.lock().unwrap().all = Some(vec![titled("A"), titled("B")]);

    let orch = orchestrator(vec![extension], store.clone(), sink.clone());
    let report = orch.run_tick(wednesday_nine()).await;

    let outcome = report.outcome("mangaplus").unwrap();
    assert_eq!(outcome.mode, RunMode::Full);
    let summary = outcome.result.as_ref().unwrap();
    assert!(summary.delete_detection);
    assert_eq!(summary.deleted, 1);
    assert_eq!(sink.deletes(), vec!["C"]);

    let state = store.load_state("mangaplus").unwrap();
    let posted: HashSet<String> = state.posted_ids();
    assert_eq!(posted, ["A", "B"].iter().map(|s| s.to_string()).collect());
    assert_eq!(state.last_clean_run, Some(wednesday_nine().date_naive()));
    assert_eq!(script.lock().unwrap().all_calls, 1);
}

#[tokio::test]
async fn test_full_run_without_listing_skips_deletes() {
    let store = Arc::new(
        MemoryStateStore::new().with_state("mangaplus", posted_state(&["A", "B", "C"])),
    );
    let sink = Arc::new(RecordingSink::default());
    let (extension, script) = ScriptedExtension::new("mangaplus");
    script.lock().unwrap().updated = vec![titled("D")];

    let orch = orchestrator(vec![extension], store.clone(), sink.clone());
    let report = orch.run_tick(wednesday_nine()).await;

    let outcome = report.outcome("mangaplus").unwrap();
    assert_eq!(outcome.mode, RunMode::Full);
    let summary = outcome.result.as_ref().unwrap();
    assert!(!summary.delete_detection);
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.uploaded, 1);
    assert_eq!(store.load_state("mangaplus").unwrap().posted.len(), 4);
}

#[tokio::test]
async fn test_incremental_run_never_requests_listing() {
    let store = Arc::new(MemoryStateStore::new());
    let (extension, script) = ScriptedExtension::new("mangaplus");
    script.lock().unwrap().all = Some(Vec::new());

    let orch = orchestrator(vec![extension], store, Arc::new(LoggingSink));
    orch.run_tick(tuesday_nine()).await;

    assert_eq!(script.lock().unwrap().all_calls, 0);
}

#[tokio::test]
async fn test_new_manga_tracked_after_run() {
    let store = Arc::new(MemoryStateStore::new());
    let (extension, script) = ScriptedExtension::new("mangaplus");
    script.lock().unwrap().manga = vec![RawManga {
        manga_id: Some("200".into()),
        md_manga_id: Some("md-200".to_string()),
        manga_name: Some("New Series".to_string()),
        manga_url: None,
        manga_languages: vec!["en".to_string()],
    }];

    let orch = orchestrator(vec![extension], store.clone(), Arc::new(LoggingSink));
    let report = orch.run_tick(tuesday_nine()).await;

    let summary = report.outcome("mangaplus").unwrap().result.as_ref().unwrap();
    assert_eq!(summary.new_tracked_manga, 1);
    assert!(store.get_tracked_manga("mangaplus").unwrap().contains("md-200"));
}

#[tokio::test]
async fn test_same_override_collapses_duplicates_end_to_end() {
    let store = Arc::new(MemoryStateStore::new());
    let sink = Arc::new(RecordingSink::default());
    let (extension, script) = ScriptedExtension::new("mangaplus");
    {
        let mut script = script.lock().unwrap();
        script.updated = vec![titled("D1"), titled("K"), titled("D2")];
        script.overrides.same.insert(
            "K".to_string(),
            vec!["D1".to_string(), "D2".to_string()],
        );
    }

    let orch = orchestrator(vec![extension], store, sink.clone());
    let report = orch.run_tick(tuesday_nine()).await;

    let summary = report.outcome("mangaplus").unwrap().result.as_ref().unwrap();
    assert_eq!(summary.suppressed, 2);
    assert_eq!(sink.uploads(), vec!["K"]);
}

// ============================================================================
// SQLite-backed runs
// ============================================================================

#[tokio::test]
async fn test_sqlite_state_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("state.db");

    {
        let store = create_sqlite_store(&db_path).unwrap();
        let (extension, script) = ScriptedExtension::new("mangaplus");
        script.lock().unwrap().updated = vec![titled("1"), titled("2")];

        let orch = orchestrator(vec![extension], store, Arc::new(LoggingSink));
        let report = orch.run_tick(tuesday_nine()).await;
        assert_eq!(report.succeeded().count(), 1);
    }

    let store = create_sqlite_store(&db_path).unwrap();
    let state = store.load_state("mangaplus").unwrap();
    assert_eq!(state.posted_ids().len(), 2);
    assert_eq!(state.last_run, Some(tuesday_nine()));
    assert_eq!(store.extensions().unwrap(), vec!["mangaplus"]);

    let sink = Arc::new(RecordingSink::default());
    let (extension, script) = ScriptedExtension::new("mangaplus");
    script.lock().unwrap().updated = vec![titled("1"), titled("2")];
    let orch = orchestrator(vec![extension], store, sink.clone());
    let report = orch
        .run_forced("mangaplus", RunMode::Incremental, tuesday_nine())
        .await
        .unwrap();

    let summary = report.outcome("mangaplus").unwrap().result.as_ref().unwrap();
    assert_eq!(summary.skipped, 2);
    assert_eq!(sink.calls(), 0);
}

// ============================================================================
// Webhook sink
// ============================================================================

#[tokio::test]
async fn test_webhook_partial_acknowledgement_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dispatch"))
        .and(header("authorization", "Bearer token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"uploaded": ["1"], "deleted": []})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let sink = WebhookSink::new(
        WebhookConfig::new(format!("{}/dispatch", server.uri()))
            .with_auth_token("token")
            .with_max_retries(0),
    )
    .unwrap();

    let store = Arc::new(MemoryStateStore::new());
    let (extension, script) = ScriptedExtension::new("mangaplus");
    script.lock().unwrap().updated = vec![titled("1"), titled("2")];
    let orch = orchestrator(vec![extension], store.clone(), Arc::new(sink));

    let report = orch.run_tick(tuesday_nine()).await;
    let summary = report.outcome("mangaplus").unwrap().result.as_ref().unwrap();
    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.unacknowledged, 1);

    let posted = store.get_posted_ids("mangaplus").unwrap();
    assert!(posted.contains("1"));
    assert!(!posted.contains("2"));

    // Chapter 2 is offered again on the next run
    let report = orch
        .run_forced("mangaplus", RunMode::Incremental, tuesday_nine())
        .await
        .unwrap();
    let summary = report.outcome("mangaplus").unwrap().result.as_ref().unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.unacknowledged, 1);
}

#[tokio::test]
async fn test_webhook_rejection_fails_run_without_commit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
        .mount(&server)
        .await;

    let sink = WebhookSink::new(WebhookConfig::new(server.uri()).with_max_retries(0)).unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let (extension, script) = ScriptedExtension::new("mangaplus");
    script.lock().unwrap().updated = vec![titled("1")];
    let orch = orchestrator(vec![extension], store.clone(), Arc::new(sink));

    let report = orch.run_tick(tuesday_nine()).await;
    assert_eq!(report.outcome("mangaplus").unwrap().label(), "dispatch_failure");
    assert_eq!(store.commit_count(), 0);
}
