//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use publoader::extension::{Extension, ExtensionError, ExtensionRegistry, ExtensionResult};
use publoader::models::{
    Chapter, ExtensionState, PostedChapter, RawChapter, RawId, RawManga, RawTimestamp,
};
use publoader::normalize::{OverrideOptions, OverrideTable};
use publoader::runner::{ExtensionRunner, Orchestrator};
use publoader::scheduler::{CleanSchedule, RunAt};
use publoader::storage::SharedStateStore;
use publoader::upload::SharedUploadSink;

/// Destination manga id used by most fixtures
pub const MD_MANGA: &str = "md-100";

/// Tuesday 2024-01-16, 09:00 UTC
pub fn tuesday_nine() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 16, 9, 0, 0).unwrap()
}

/// Wednesday 2024-01-17, 09:00 UTC
pub fn wednesday_nine() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 17, 9, 0, 0).unwrap()
}

/// Raw chapter as an extension would emit it
pub fn raw_chapter(id: &str, number: Option<&str>, title: Option<&str>) -> RawChapter {
    RawChapter {
        chapter_id: Some(RawId::from(id)),
        chapter_url: Some(format!("https://publisher.example.com/viewer/{id}")),
        chapter_timestamp: Some(RawTimestamp::Seconds(1_705_300_000)),
        chapter_title: title.map(str::to_string),
        chapter_number: number.map(str::to_string),
        chapter_language: Some("en".to_string()),
        manga_id: Some(RawId::from("100")),
        md_manga_id: Some(MD_MANGA.to_string()),
        ..Default::default()
    }
}

/// Simple titled chapter
pub fn titled(id: &str) -> RawChapter {
    raw_chapter(id, Some("1"), Some(&format!("Chapter 1: Part {id}")))
}

/// Validated chapter, as produced by the fetch adapter
pub fn chapter(id: &str, number: Option<&str>, title: Option<&str>) -> Chapter {
    Chapter {
        chapter_id: id.to_string(),
        chapter_url: format!("https://publisher.example.com/viewer/{id}"),
        chapter_timestamp: tuesday_nine() - chrono::Duration::hours(2),
        chapter_expire: None,
        chapter_title: title.map(str::to_string),
        chapter_number: number.map(str::to_string),
        chapter_language: "en".to_string(),
        chapter_volume: None,
        manga_id: "100".to_string(),
        md_manga_id: MD_MANGA.to_string(),
        manga_name: Some("Test Manga".to_string()),
        manga_url: None,
        extension_name: "fixture".to_string(),
    }
}

/// State with the given chapters posted under [`MD_MANGA`]
pub fn posted_state(ids: &[&str]) -> ExtensionState {
    ExtensionState {
        posted: ids
            .iter()
            .map(|id| PostedChapter {
                chapter_id: id.to_string(),
                md_manga_id: MD_MANGA.to_string(),
            })
            .collect(),
        tracked_manga: [MD_MANGA.to_string()].into_iter().collect(),
        ..Default::default()
    }
}

pub fn compile(options: OverrideOptions) -> OverrideTable {
    OverrideTable::compile(options).unwrap()
}

/// Mutable behaviour of a [`ScriptedExtension`], shared with the test
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub updated: Vec<RawChapter>,
    /// `None` means the extension offers no full listing
    pub all: Option<Vec<RawChapter>>,
    pub manga: Vec<RawManga>,
    pub overrides: OverrideOptions,
    pub fail: bool,
    pub delay: Duration,
    /// Calls to `get_all_chapters`
    pub all_calls: usize,
}

/// Extension whose output is controlled by the test through a shared [`Script`]
pub struct ScriptedExtension {
    name: String,
    languages: Vec<String>,
    pub run_at: Option<RunAt>,
    pub clean_at: CleanSchedule,
    pub daily_check_run: bool,
    pub disabled: bool,
    script: Arc<Mutex<Script>>,
}

impl ScriptedExtension {
    /// Enabled extension running daily at 09:00
    pub fn new(name: &str) -> (Self, Arc<Mutex<Script>>) {
        let script = Arc::new(Mutex::new(Script::default()));
        let extension = Self {
            name: name.to_string(),
            languages: vec!["en".to_string()],
            run_at: Some(RunAt::daily(9, 0).unwrap()),
            clean_at: CleanSchedule::Default,
            daily_check_run: false,
            disabled: false,
            script: Arc::clone(&script),
        };
        (extension, script)
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }
}

#[async_trait]
impl Extension for ScriptedExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn mangadex_group_id(&self) -> &str {
        "group-1"
    }

    fn extension_languages(&self) -> &[String] {
        &self.languages
    }

    fn tracked_mangadex_ids(&self) -> Vec<String> {
        vec![MD_MANGA.to_string()]
    }

    fn disabled(&self) -> bool {
        self.disabled
    }

    fn run_at(&self) -> Option<RunAt> {
        self.run_at
    }

    fn clean_at(&self) -> CleanSchedule {
        self.clean_at.clone()
    }

    fn daily_check_run(&self) -> bool {
        self.daily_check_run
    }

    fn load_override_options(&self) -> ExtensionResult<OverrideTable> {
        Ok(OverrideTable::compile(self.script().overrides.clone())?)
    }

    async fn update_external_data(
        &mut self,
        _posted_chapter_ids: &HashSet<String>,
        _fetch_all_chapters: bool,
    ) -> ExtensionResult<()> {
        let (delay, fail) = {
            let script = self.script();
            (script.delay, script.fail)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(ExtensionError::fetch("publisher returned 503"));
        }
        Ok(())
    }

    async fn get_updated_chapters(&mut self) -> ExtensionResult<Option<Vec<RawChapter>>> {
        Ok(Some(self.script().updated.clone()))
    }

    async fn get_all_chapters(&mut self) -> ExtensionResult<Option<Vec<RawChapter>>> {
        let mut script = self.script();
        script.all_calls += 1;
        Ok(script.all.clone())
    }

    async fn get_updated_manga(&mut self) -> ExtensionResult<Option<Vec<RawManga>>> {
        Ok(Some(self.script().manga.clone()))
    }
}

/// Orchestrator over the given extensions with a short fetch timeout
pub fn orchestrator(
    extensions: Vec<ScriptedExtension>,
    store: SharedStateStore,
    sink: SharedUploadSink,
) -> Orchestrator {
    let mut registry = ExtensionRegistry::new();
    for extension in extensions {
        registry.register(Box::new(extension));
    }
    let runner = ExtensionRunner::new(store, sink).with_fetch_timeout(Duration::from_millis(300));
    Orchestrator::new(registry, runner)
}
