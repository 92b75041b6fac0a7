//! Extensions loaded from disk and driven through a full tick

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use publoader::extension::manifest::MANIFEST_FILE;
use publoader::extension::ExtensionRegistry;
use publoader::runner::{ExtensionRunner, Orchestrator};
use publoader::storage::create_sqlite_store;
use publoader::upload::LoggingSink;

use super::fixtures::{tuesday_nine, wednesday_nine};

const RESPONSE: &str = r##"{"updated_chapters": [{"chapter_id": 1000123, "chapter_url": "https://publisher.example.com/viewer/1000123", "chapter_timestamp": 1705300000, "chapter_language": "en", "manga_id": 100, "chapter_title": "Chapter 12: The Duel", "chapter_number": "#012"}], "all_chapters": null, "updated_manga": []}"##;

fn write_extension(root: &Path, name: &str, run_at: &str) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(MANIFEST_FILE),
        format!(
            r#"
            name = "{name}"
            mangadex_group_id = "group"
            languages = ["en"]
            disabled = false
            command = "sh"
            args = ["fetch.sh"]

            [run_at]
            {run_at}
            "#
        ),
    )
    .unwrap();
    std::fs::write(dir.join("fetch.sh"), format!("echo '{RESPONSE}'\n")).unwrap();
    std::fs::write(dir.join("manga_id_map.json"), r#"{"md-100": ["100"]}"#).unwrap();
}

#[tokio::test]
async fn test_load_dir_and_run_tick() {
    let temp_dir = TempDir::new().unwrap();
    let extensions = temp_dir.path().join("extensions");
    write_extension(&extensions, "mangaplus", "hour = 9\nminute = 0");

    // Broken manifest is reported but does not block the others
    let broken = extensions.join("broken");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(broken.join(MANIFEST_FILE), "name = ").unwrap();

    let (registry, errors) = ExtensionRegistry::load_dir(&extensions);
    assert_eq!(registry.len(), 1);
    assert_eq!(errors.len(), 1);

    let store = create_sqlite_store(temp_dir.path().join("state.db")).unwrap();
    let orch = Orchestrator::new(
        registry,
        ExtensionRunner::new(store.clone(), Arc::new(LoggingSink)),
    );

    let report = orch.run_tick(tuesday_nine()).await;
    let summary = report.outcome("mangaplus").unwrap().result.as_ref().unwrap();
    assert_eq!(summary.uploaded, 1);

    let state = store.load_state("mangaplus").unwrap();
    assert_eq!(state.posted[0].chapter_id, "1000123");
    assert_eq!(state.posted[0].md_manga_id, "md-100");
}

#[tokio::test]
async fn test_schedule_file_moves_run() {
    let temp_dir = TempDir::new().unwrap();
    let extensions = temp_dir.path().join("extensions");
    write_extension(&extensions, "mangaplus", "hour = 9\nminute = 0");

    let schedule_path = temp_dir.path().join("schedule.json");
    std::fs::write(&schedule_path, r#"{"mangaplus": {"hour": 14, "minute": 0}}"#).unwrap();

    let (registry, errors) = ExtensionRegistry::load_dir(&extensions);
    assert!(errors.is_empty());
    let store = create_sqlite_store(temp_dir.path().join("state.db")).unwrap();
    let orch = Orchestrator::new(registry, ExtensionRunner::new(store, Arc::new(LoggingSink)))
        .with_schedule_path(&schedule_path);

    assert!(orch.run_tick(wednesday_nine()).await.is_empty());

    let two_pm = wednesday_nine() + chrono::Duration::hours(5);
    let planned = orch.plan_tick(two_pm);
    assert!(planned[0].decision.should_run);

    // A broken schedule file falls back to the manifest
    std::fs::write(&schedule_path, "{not json").unwrap();
    let planned = orch.plan_tick(wednesday_nine());
    assert!(planned[0].decision.should_run);
}
