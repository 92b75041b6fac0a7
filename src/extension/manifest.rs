//! `extension.toml` manifest

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::error::{ExtensionError, ExtensionResult};
use crate::scheduler::{CleanAtSpec, CleanSchedule, RunAt, RunAtSpec};

/// Manifest file name inside an extension directory
pub const MANIFEST_FILE: &str = "extension.toml";
pub const MANGA_ID_MAP_FILE: &str = "manga_id_map.json";
pub const OVERRIDE_OPTIONS_FILE: &str = "override_options.json";

fn default_disabled() -> bool {
    true
}

/// Static description of an extension as written by its author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionManifest {
    pub name: String,
    pub mangadex_group_id: String,
    #[serde(default)]
    pub languages: Vec<String>,
    /// Extensions are off unless explicitly enabled
    #[serde(default = "default_disabled")]
    pub disabled: bool,
    #[serde(default)]
    pub run_at: Option<RunAtSpec>,
    #[serde(default)]
    pub clean_at: Option<CleanAtSpec>,
    #[serde(default)]
    pub daily_check_run: bool,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ExtensionManifest {
    /// Parse from TOML text
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load and validate `extension.toml` from an extension directory
    pub fn load(dir: impl AsRef<Path>) -> ExtensionResult<Self> {
        let path = dir.as_ref().join(MANIFEST_FILE);
        let display = path.display().to_string();

        let content =
            std::fs::read_to_string(&path).map_err(|e| ExtensionError::manifest(&display, e))?;
        let manifest =
            Self::from_toml(&content).map_err(|e| ExtensionError::manifest(&display, e))?;
        manifest.validate().map_err(|e| ExtensionError::manifest(&display, e))?;

        Ok(manifest)
    }

    /// Check field values
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.command.trim().is_empty() {
            return Err("command must not be empty".to_string());
        }
        if let Some(bad) = self
            .languages
            .iter()
            .find(|l| !crate::normalize::is_valid_language(l))
        {
            return Err(format!("invalid language '{bad}'"));
        }
        self.schedule().map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Validated run-at and clean-day specifications
    pub fn schedule(&self) -> crate::scheduler::SchedulerResult<(Option<RunAt>, CleanSchedule)> {
        let run_at = self.run_at.map(RunAt::try_from).transpose()?;
        let clean_at = CleanSchedule::from_spec(self.clean_at.as_ref())?;
        Ok((run_at, clean_at))
    }
}
