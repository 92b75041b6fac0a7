//! Extension contract and registry
//!
//! An extension supplies chapters and manga from one publisher source. The
//! orchestrator only sees the [`Extension`] trait; optional capabilities have
//! defaults (disabled, no schedule, no daily check, no full listing).
//!
//! # Example
//!
//! ```rust,ignore
//! use publoader::extension::ExtensionRegistry;
//!
//! let (registry, errors) = ExtensionRegistry::load_dir("extensions");
//! for handle in registry.iter() {
//!     println!("{}", handle.name());
//! }
//! ```

pub mod adapter;
pub mod command;
pub mod error;
pub mod manga_id_map;
pub mod manifest;

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{RawChapter, RawManga};
use crate::normalize::OverrideTable;
use crate::scheduler::{CleanSchedule, RunAt, ScheduleEntry, ScheduleFile};

pub use adapter::{FetchError, FetchedBatch, FetchAdapter, ValidationError};
pub use command::CommandExtension;
pub use error::{ExtensionError, ExtensionResult};
pub use manga_id_map::MangaIdMap;
pub use manifest::ExtensionManifest;

// ============================================================================
// Extension trait
// ============================================================================

/// Capability set of a source extension
///
/// `update_external_data` is always called before the accessors. Accessors
/// return `Ok(None)` when the extension has no list to offer; for
/// `get_all_chapters` that means "skip delete detection".
#[async_trait]
pub trait Extension: Send {
    fn name(&self) -> &str;

    /// Destination group identity
    fn mangadex_group_id(&self) -> &str;

    fn extension_languages(&self) -> &[String];

    /// Destination manga ids this extension mirrors
    fn tracked_mangadex_ids(&self) -> Vec<String>;

    fn disabled(&self) -> bool {
        true
    }

    fn run_at(&self) -> Option<RunAt> {
        None
    }

    fn clean_at(&self) -> CleanSchedule {
        CleanSchedule::Default
    }

    fn daily_check_run(&self) -> bool {
        false
    }

    /// Source-to-destination manga mapping used to resolve `md_manga_id`
    fn manga_id_map(&self) -> Option<&MangaIdMap> {
        None
    }

    /// Override table, reloaded at the start of every run
    fn load_override_options(&self) -> ExtensionResult<OverrideTable> {
        Ok(OverrideTable::default())
    }

    async fn update_external_data(
        &mut self,
        _posted_chapter_ids: &HashSet<String>,
        _fetch_all_chapters: bool,
    ) -> ExtensionResult<()> {
        Ok(())
    }

    async fn get_updated_chapters(&mut self) -> ExtensionResult<Option<Vec<RawChapter>>>;

    async fn get_all_chapters(&mut self) -> ExtensionResult<Option<Vec<RawChapter>>> {
        Ok(None)
    }

    async fn get_updated_manga(&mut self) -> ExtensionResult<Option<Vec<RawManga>>>;
}

// ============================================================================
// Descriptor and handle
// ============================================================================

/// Static metadata captured when an extension is registered
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionDescriptor {
    pub name: String,
    pub mangadex_group_id: String,
    pub languages: Vec<String>,
    pub disabled: bool,
    pub run_at: Option<RunAt>,
    pub clean_at: CleanSchedule,
    pub daily_check_run: bool,
}

impl ExtensionDescriptor {
    pub fn from_extension(extension: &dyn Extension) -> Self {
        Self {
            name: extension.name().to_string(),
            mangadex_group_id: extension.mangadex_group_id().to_string(),
            languages: extension.extension_languages().to_vec(),
            disabled: extension.disabled(),
            run_at: extension.run_at(),
            clean_at: extension.clean_at(),
            daily_check_run: extension.daily_check_run(),
        }
    }

    /// Scheduling inputs, with an optional `schedule.json` override
    pub fn schedule_entry(&self, run_at_override: Option<RunAt>) -> ScheduleEntry {
        ScheduleEntry {
            name: self.name.clone(),
            run_at: run_at_override.or(self.run_at),
            clean_at: self.clean_at.clone(),
            daily_check_run: self.daily_check_run,
            disabled: self.disabled,
        }
    }
}

/// Shared handle to a registered extension
///
/// The inner mutex is the single-flight guard: at most one run of an
/// extension is in progress at any time.
#[derive(Clone)]
pub struct ExtensionHandle {
    descriptor: Arc<ExtensionDescriptor>,
    inner: Arc<Mutex<Box<dyn Extension>>>,
}

impl ExtensionHandle {
    pub fn new(extension: Box<dyn Extension>) -> Self {
        let descriptor = ExtensionDescriptor::from_extension(extension.as_ref());
        Self {
            descriptor: Arc::new(descriptor),
            inner: Arc::new(Mutex::new(extension)),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ExtensionDescriptor {
        &self.descriptor
    }

    /// Acquire the extension unless a run is already in flight
    pub fn try_acquire(&self) -> Option<OwnedMutexGuard<Box<dyn Extension>>> {
        self.inner.clone().try_lock_owned().ok()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

impl std::fmt::Debug for ExtensionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionHandle")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// All extensions known to the orchestrator, ordered by name
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    handles: Vec<ExtensionHandle>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension; a duplicate name replaces the earlier one
    pub fn register(&mut self, extension: Box<dyn Extension>) {
        let handle = ExtensionHandle::new(extension);
        if let Some(existing) = self.handles.iter_mut().find(|h| h.name() == handle.name()) {
            tracing::warn!(extension = handle.name(), "Replacing duplicate extension");
            *existing = handle;
        } else {
            self.handles.push(handle);
            self.handles.sort_by(|a, b| a.name().cmp(b.name()));
        }
    }

    /// Load every extension directory under `dir`
    ///
    /// Directories without a manifest are ignored. Broken extensions are
    /// returned as errors and left out of the registry, so one bad directory
    /// does not stop the others from loading.
    pub fn load_dir(dir: impl AsRef<Path>) -> (Self, Vec<ExtensionError>) {
        let dir = dir.as_ref();
        let mut registry = Self::new();
        let mut errors = Vec::new();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                errors.push(ExtensionError::manifest(dir.display().to_string(), e));
                return (registry, errors);
            }
        };

        let mut dirs: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.join(manifest::MANIFEST_FILE).is_file())
            .collect();
        dirs.sort();

        for path in dirs {
            match CommandExtension::load(&path) {
                Ok(extension) => {
                    tracing::debug!(
                        extension = extension.name(),
                        path = %path.display(),
                        "Loaded extension"
                    );
                    registry.register(Box::new(extension));
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to load extension");
                    errors.push(e);
                }
            }
        }

        tracing::info!(count = registry.len(), "Extensions loaded");
        (registry, errors)
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionHandle> {
        self.handles.iter().find(|h| h.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtensionHandle> {
        self.handles.iter()
    }

    /// Scheduling inputs of every extension, `schedule.json` applied
    pub fn schedule_entries(&self, schedule: &ScheduleFile) -> Vec<ScheduleEntry> {
        self.handles
            .iter()
            .map(|h| h.descriptor().schedule_entry(schedule.get(h.name())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
