//! Extensions implemented as external commands
//!
//! The command runs once per fetch. It receives a JSON request on stdin:
//!
//! ```json
//! {"posted_chapter_ids": ["1000123"], "fetch_all_chapters": false,
//!  "manga_id_map": {"md-uuid": ["100020"]}}
//! ```
//!
//! and must print a JSON document on stdout:
//!
//! ```json
//! {"updated_chapters": [...], "all_chapters": [...] | null, "updated_manga": [...]}
//! ```
//!
//! A missing key is reported through the accessor as `None`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::error::{ExtensionError, ExtensionResult};
use super::manga_id_map::MangaIdMap;
use super::manifest::{ExtensionManifest, MANGA_ID_MAP_FILE, OVERRIDE_OPTIONS_FILE};
use super::Extension;
use crate::models::{RawChapter, RawManga};
use crate::normalize::OverrideTable;
use crate::scheduler::{CleanSchedule, RunAt};

/// Stdin document sent to the command
#[derive(Debug, Serialize)]
struct CommandRequest<'a> {
    posted_chapter_ids: Vec<&'a str>,
    fetch_all_chapters: bool,
    manga_id_map: &'a MangaIdMap,
}

/// Stdout document expected from the command
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommandResponse {
    #[serde(default)]
    updated_chapters: Option<Vec<RawChapter>>,
    #[serde(default)]
    all_chapters: Option<Vec<RawChapter>>,
    #[serde(default)]
    updated_manga: Option<Vec<RawManga>>,
}

/// Extension backed by an executable declared in `extension.toml`
#[derive(Debug)]
pub struct CommandExtension {
    dir: PathBuf,
    manifest: ExtensionManifest,
    run_at: Option<RunAt>,
    clean_at: CleanSchedule,
    manga_id_map: MangaIdMap,
    response: Option<CommandResponse>,
}

impl CommandExtension {
    /// Load an extension directory
    pub fn load(dir: impl AsRef<Path>) -> ExtensionResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let manifest = ExtensionManifest::load(&dir)?;
        let (run_at, clean_at) = manifest
            .schedule()
            .map_err(|e| ExtensionError::manifest(dir.display().to_string(), e))?;
        let manga_id_map = MangaIdMap::load(dir.join(MANGA_ID_MAP_FILE))?;

        // Surface broken override files at load time rather than first run
        OverrideTable::load(dir.join(OVERRIDE_OPTIONS_FILE))?;

        Ok(Self {
            dir,
            manifest,
            run_at,
            clean_at,
            manga_id_map,
            response: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &ExtensionManifest {
        &self.manifest
    }

    /// Commands given as a relative path are resolved against the extension directory
    fn program(&self) -> PathBuf {
        let command = Path::new(&self.manifest.command);
        if command.is_relative() && command.components().count() > 1 {
            self.dir.join(command)
        } else {
            command.to_path_buf()
        }
    }

    fn response_mut(&mut self) -> ExtensionResult<&mut CommandResponse> {
        self.response
            .as_mut()
            .ok_or_else(|| ExtensionError::fetch("accessor called before update_external_data"))
    }
}

#[async_trait]
impl Extension for CommandExtension {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn mangadex_group_id(&self) -> &str {
        &self.manifest.mangadex_group_id
    }

    fn extension_languages(&self) -> &[String] {
        &self.manifest.languages
    }

    fn tracked_mangadex_ids(&self) -> Vec<String> {
        self.manga_id_map.tracked_ids()
    }

    fn disabled(&self) -> bool {
        self.manifest.disabled
    }

    fn run_at(&self) -> Option<RunAt> {
        self.run_at
    }

    fn clean_at(&self) -> CleanSchedule {
        self.clean_at.clone()
    }

    fn daily_check_run(&self) -> bool {
        self.manifest.daily_check_run
    }

    fn manga_id_map(&self) -> Option<&MangaIdMap> {
        Some(&self.manga_id_map)
    }

    fn load_override_options(&self) -> ExtensionResult<OverrideTable> {
        Ok(OverrideTable::load(self.dir.join(OVERRIDE_OPTIONS_FILE))?)
    }

    async fn update_external_data(
        &mut self,
        posted_chapter_ids: &HashSet<String>,
        fetch_all_chapters: bool,
    ) -> ExtensionResult<()> {
        self.response = None;

        let mut posted: Vec<&str> = posted_chapter_ids.iter().map(String::as_str).collect();
        posted.sort_unstable();
        let request = serde_json::to_vec(&CommandRequest {
            posted_chapter_ids: posted,
            fetch_all_chapters,
            manga_id_map: &self.manga_id_map,
        })
        .map_err(|e| ExtensionError::fetch(format!("Failed to encode request: {e}")))?;

        let program = self.program();
        let spawn_error = |source| ExtensionError::Spawn {
            command: program.display().to_string(),
            source,
        };

        let mut child = Command::new(&program)
            .args(&self.manifest.args)
            .envs(&self.manifest.env)
            .current_dir(&self.dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that ignores stdin may close it early
            if let Err(e) = stdin.write_all(&request).await {
                tracing::debug!(extension = self.name(), error = %e, "Extension closed stdin");
            }
        }

        let output = child.wait_with_output().await.map_err(spawn_error)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtensionError::ProcessFailed {
                status: output.status.to_string(),
                stderr: stderr.trim().chars().take(2000).collect(),
            });
        }

        let response: CommandResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| ExtensionError::InvalidOutput(e.to_string()))?;

        tracing::debug!(
            extension = self.name(),
            fetch_all_chapters,
            bytes = output.stdout.len(),
            "Extension command finished"
        );
        self.response = Some(response);
        Ok(())
    }

    async fn get_updated_chapters(&mut self) -> ExtensionResult<Option<Vec<RawChapter>>> {
        Ok(self.response_mut()?.updated_chapters.take())
    }

    async fn get_all_chapters(&mut self) -> ExtensionResult<Option<Vec<RawChapter>>> {
        Ok(self.response_mut()?.all_chapters.take())
    }

    async fn get_updated_manga(&mut self) -> ExtensionResult<Option<Vec<RawManga>>> {
        Ok(self.response_mut()?.updated_manga.take())
    }
}
