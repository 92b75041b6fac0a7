//! State store for reconciliation state
//!
//! The reconciler only talks to the [`StateStore`] trait. Two implementations
//! are provided:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Reconciler                           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StateStore trait                        │
//! │   load_state, get_posted_ids, get_tracked_manga, commit     │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                              │
//!                 ▼                              ▼
//!       ┌──────────────────┐           ┌──────────────────┐
//!       │ SqliteStateStore │           │ MemoryStateStore │
//!       └──────────────────┘           └──────────────────┘
//! ```
//!
//! `commit` is all-or-nothing: either every change of a run is persisted or
//! none is.
//!
//! # Usage
//!
//! ```rust,ignore
//! use publoader::storage::{SqliteStateStore, StateStore};
//!
//! let store = SqliteStateStore::new("data/state.db")?;
//! let posted = store.get_posted_ids("mangaplus")?;
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{ExtensionState, PostedChapter};

const CLEAN_DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Core Types
// ============================================================================

/// Changes produced by one successful run of an extension
#[derive(Debug, Clone, PartialEq)]
pub struct StateCommit {
    /// Chapters acknowledged as uploaded
    pub added: Vec<PostedChapter>,
    /// Chapter ids acknowledged as deleted
    pub removed: Vec<String>,
    /// Newly tracked destination manga ids
    pub new_tracked_manga: Vec<String>,
    pub run_timestamp: DateTime<Utc>,
    /// Set only for full runs
    pub clean_run_date: Option<NaiveDate>,
}

impl StateCommit {
    /// Commit that only records the run
    pub fn empty(run_timestamp: DateTime<Utc>) -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            new_tracked_manga: Vec::new(),
            run_timestamp,
            clean_run_date: None,
        }
    }

    /// Apply to an in-memory state
    pub fn apply_to(&self, state: &mut ExtensionState) {
        let removed: HashSet<&str> = self.removed.iter().map(String::as_str).collect();
        state
            .posted
            .retain(|p| !removed.contains(p.chapter_id.as_str()));

        let mut known = state.posted_ids();
        for chapter in &self.added {
            if known.insert(chapter.chapter_id.clone()) {
                state.posted.push(chapter.clone());
            }
        }

        state
            .tracked_manga
            .extend(self.new_tracked_manga.iter().cloned());
        state.last_run = Some(self.run_timestamp);
        if let Some(date) = self.clean_run_date {
            state.last_clean_run = Some(date);
        }
    }
}

// ============================================================================
// Repository Trait
// ============================================================================

/// Durable per-extension reconciliation state
pub trait StateStore: Send + Sync {
    /// Load the full state of an extension (empty if never run)
    fn load_state(&self, extension: &str) -> Result<ExtensionState>;

    /// Previously posted chapters with their destination manga
    fn get_posted_chapters(&self, extension: &str) -> Result<Vec<PostedChapter>> {
        Ok(self.load_state(extension)?.posted)
    }

    /// Previously posted chapter ids
    fn get_posted_ids(&self, extension: &str) -> Result<HashSet<String>> {
        Ok(self
            .get_posted_chapters(extension)?
            .into_iter()
            .map(|p| p.chapter_id)
            .collect())
    }

    /// Currently tracked destination manga ids
    fn get_tracked_manga(&self, extension: &str) -> Result<HashSet<String>> {
        Ok(self.load_state(extension)?.tracked_manga)
    }

    /// Atomically persist the changes of one run
    fn commit(&self, extension: &str, commit: &StateCommit) -> Result<()>;

    /// Names of extensions with persisted state
    fn extensions(&self) -> Result<Vec<String>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of StateStore
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Create a new SQLite store
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite state store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory SQLite")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection mutex poisoned"))
    }

    /// Create database schema
    fn create_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS posted_chapters (
                    extension TEXT NOT NULL,
                    chapter_id TEXT NOT NULL CHECK (length(chapter_id) > 0),
                    md_manga_id TEXT NOT NULL,
                    posted_at TEXT NOT NULL,
                    PRIMARY KEY (extension, chapter_id)
                );

                CREATE INDEX IF NOT EXISTS idx_posted_chapters_manga
                    ON posted_chapters(extension, md_manga_id);

                CREATE TABLE IF NOT EXISTS tracked_manga (
                    extension TEXT NOT NULL,
                    md_manga_id TEXT NOT NULL CHECK (length(md_manga_id) > 0),
                    PRIMARY KEY (extension, md_manga_id)
                );

                CREATE TABLE IF NOT EXISTS extension_runs (
                    extension TEXT PRIMARY KEY,
                    last_run TEXT NOT NULL,
                    last_clean_run TEXT
                );
                "#,
        )
        .context("Failed to create SQLite schema")?;

        Ok(())
    }
}

impl StateStore for SqliteStateStore {
    fn load_state(&self, extension: &str) -> Result<ExtensionState> {
        let conn = self.conn()?;

        let posted = {
            let mut stmt = conn.prepare(
                "SELECT chapter_id, md_manga_id FROM posted_chapters
                 WHERE extension = ?1 ORDER BY posted_at, chapter_id",
            )?;
            let rows = stmt.query_map(params![extension], |row| {
                Ok(PostedChapter {
                    chapter_id: row.get(0)?,
                    md_manga_id: row.get(1)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to load posted chapters")?
        };

        let tracked_manga = {
            let mut stmt =
                conn.prepare("SELECT md_manga_id FROM tracked_manga WHERE extension = ?1")?;
            let rows = stmt.query_map(params![extension], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<HashSet<_>>>()
                .context("Failed to load tracked manga")?
        };

        let run: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT last_run, last_clean_run FROM extension_runs WHERE extension = ?1",
                params![extension],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to load extension run")?;

        let (last_run, last_clean_run) = match run {
            Some((last_run, last_clean_run)) => {
                let last_run = DateTime::parse_from_rfc3339(&last_run)
                    .with_context(|| format!("Invalid last_run '{last_run}'"))?
                    .with_timezone(&Utc);
                let last_clean_run = last_clean_run
                    .map(|d| NaiveDate::parse_from_str(&d, CLEAN_DATE_FORMAT))
                    .transpose()
                    .context("Invalid last_clean_run")?;
                (Some(last_run), last_clean_run)
            }
            None => (None, None),
        };

        Ok(ExtensionState {
            posted,
            tracked_manga,
            last_run,
            last_clean_run,
        })
    }

    fn get_posted_ids(&self, extension: &str) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT chapter_id FROM posted_chapters WHERE extension = ?1")?;
        let rows = stmt.query_map(params![extension], |row| row.get::<_, String>(0))?;
        let ids = rows
            .collect::<rusqlite::Result<HashSet<_>>>()
            .context("Failed to load posted ids")?;
        Ok(ids)
    }

    fn commit(&self, extension: &str, commit: &StateCommit) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        let posted_at = commit.run_timestamp.to_rfc3339();

        {
            let mut insert = tx.prepare(
                "INSERT INTO posted_chapters (extension, chapter_id, md_manga_id, posted_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(extension, chapter_id) DO NOTHING",
            )?;
            for chapter in &commit.added {
                insert
                    .execute(params![extension, chapter.chapter_id, chapter.md_manga_id, posted_at])
                    .with_context(|| format!("Failed to record chapter {}", chapter.chapter_id))?;
            }

            let mut delete = tx.prepare(
                "DELETE FROM posted_chapters WHERE extension = ?1 AND chapter_id = ?2",
            )?;
            for chapter_id in &commit.removed {
                delete
                    .execute(params![extension, chapter_id])
                    .with_context(|| format!("Failed to remove chapter {chapter_id}"))?;
            }

            let mut track = tx.prepare(
                "INSERT INTO tracked_manga (extension, md_manga_id) VALUES (?1, ?2)
                 ON CONFLICT(extension, md_manga_id) DO NOTHING",
            )?;
            for md_manga_id in &commit.new_tracked_manga {
                track
                    .execute(params![extension, md_manga_id])
                    .with_context(|| format!("Failed to track manga {md_manga_id}"))?;
            }

            tx.execute(
                "INSERT INTO extension_runs (extension, last_run, last_clean_run)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(extension) DO UPDATE SET
                    last_run = excluded.last_run,
                    last_clean_run = COALESCE(excluded.last_clean_run, extension_runs.last_clean_run)",
                params![
                    extension,
                    posted_at,
                    commit
                        .clean_run_date
                        .map(|d| d.format(CLEAN_DATE_FORMAT).to_string())
                ],
            )
            .context("Failed to record extension run")?;
        }

        tx.commit().context("Failed to commit state transaction")?;

        tracing::debug!(
            extension,
            added = commit.added.len(),
            removed = commit.removed.len(),
            tracked = commit.new_tracked_manga.len(),
            "State committed"
        );
        Ok(())
    }

    fn extensions(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT extension FROM extension_runs ORDER BY extension")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

// ============================================================================
// In-memory Implementation
// ============================================================================

/// In-memory implementation of StateStore
///
/// Supports failure injection so callers can exercise rollback paths.
#[derive(Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<String, ExtensionState>>,
    fail_commits: AtomicBool,
    commits: AtomicUsize,
}

impl MemoryStateStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an extension's state
    pub fn with_state(self, extension: impl Into<String>, state: ExtensionState) -> Self {
        if let Ok(mut states) = self.states.write() {
            states.insert(extension.into(), state);
        }
        self
    }

    /// Make every following commit fail until reset
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

impl StateStore for MemoryStateStore {
    fn load_state(&self, extension: &str) -> Result<ExtensionState> {
        let states = self
            .states
            .read()
            .map_err(|_| anyhow!("State lock poisoned"))?;
        Ok(states.get(extension).cloned().unwrap_or_default())
    }

    fn commit(&self, extension: &str, commit: &StateCommit) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            anyhow::bail!("Injected commit failure for {extension}");
        }

        let mut states = self
            .states
            .write()
            .map_err(|_| anyhow!("State lock poisoned"))?;
        let mut next = states.get(extension).cloned().unwrap_or_default();
        commit.apply_to(&mut next);
        states.insert(extension.to_string(), next);

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn extensions(&self) -> Result<Vec<String>> {
        let states = self
            .states
            .read()
            .map_err(|_| anyhow!("State lock poisoned"))?;
        let mut names: Vec<String> = states.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

// ============================================================================
// Shared Store Types
// ============================================================================

/// Thread-safe shared store
pub type SharedStateStore = Arc<dyn StateStore>;

/// Create a shared SQLite store
pub fn create_sqlite_store(path: impl AsRef<Path>) -> Result<SharedStateStore> {
    let store = SqliteStateStore::new(path)?;
    Ok(Arc::new(store))
}

/// Create a shared in-memory store
pub fn create_memory_store() -> SharedStateStore {
    Arc::new(MemoryStateStore::new())
}

// ============================================================================
// Tests
// ============================================================================
