//! Run-time specifications and per-tick run decisions
//!
//! An extension is due on a tick when its `run_at` matches the tick instant.
//! A clean day elevates such a run to full reconciliation. Independently, the
//! daily sweep hour runs every opted-in extension incrementally, unless a
//! scheduled run already fired on the same tick.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::error::{SchedulerError, SchedulerResult};
use crate::models::RunMode;

/// Default clean day (0 = Monday, so 2 = Wednesday)
pub const DEFAULT_CLEAN_DAY: u8 = 2;

/// Default hour of the daily catch-up sweep (UTC)
pub const DEFAULT_SWEEP_HOUR: u32 = 1;

// ============================================================================
// Run-at specification
// ============================================================================

/// Schedule entry as written in `schedule.json` or an extension manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAtSpec {
    /// ISO weekday (1 = Monday .. 7 = Sunday)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
    pub hour: u32,
    pub minute: u32,
}

/// Validated run-time specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunAt {
    /// Every day at `hour:minute`; a nonzero minute never fires
    Daily { hour: u32, minute: u32 },
    /// Only on `weekday` at `hour:minute`
    Weekly {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
}

impl RunAt {
    /// Daily run at the given hour
    pub fn daily(hour: u32, minute: u32) -> SchedulerResult<Self> {
        Self::try_from(RunAtSpec {
            day: None,
            hour,
            minute,
        })
    }

    /// Weekly run on an ISO weekday (1 = Monday)
    pub fn weekly(day: u32, hour: u32, minute: u32) -> SchedulerResult<Self> {
        Self::try_from(RunAtSpec {
            day: Some(day),
            hour,
            minute,
        })
    }

    /// Whether a tick at `now` matches this specification
    pub fn matches(&self, now: DateTime<Utc>) -> bool {
        match *self {
            Self::Daily { hour, minute } => {
                // Only top-of-hour specs are honored for daily runs
                minute == 0 && now.minute() == 0 && now.hour() == hour
            }
            Self::Weekly {
                weekday,
                hour,
                minute,
            } => now.weekday() == weekday && now.hour() == hour && now.minute() == minute,
        }
    }

    /// Whether this spec can ever fire
    pub fn is_reachable(&self) -> bool {
        !matches!(self, Self::Daily { minute, .. } if *minute != 0)
    }
}

impl TryFrom<RunAtSpec> for RunAt {
    type Error = SchedulerError;

    fn try_from(spec: RunAtSpec) -> SchedulerResult<Self> {
        if spec.hour > 23 {
            return Err(SchedulerError::invalid_hour(spec.hour));
        }
        if spec.minute > 59 {
            return Err(SchedulerError::invalid_minute(spec.minute));
        }

        match spec.day {
            None => Ok(Self::Daily {
                hour: spec.hour,
                minute: spec.minute,
            }),
            Some(day) => {
                let weekday =
                    iso_weekday(day).ok_or_else(|| SchedulerError::invalid_iso_weekday(day))?;
                Ok(Self::Weekly {
                    weekday,
                    hour: spec.hour,
                    minute: spec.minute,
                })
            }
        }
    }
}

fn iso_weekday(day: u32) -> Option<Weekday> {
    match day {
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        7 => Some(Weekday::Sun),
        _ => None,
    }
}

// ============================================================================
// Clean-day specification
// ============================================================================

/// Manifest form of `clean_at`: a weekday list or a boolean switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CleanAtSpec {
    Days(Vec<u32>),
    Enabled(bool),
}

/// Days on which a scheduled run becomes a full reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CleanSchedule {
    /// Wednesday
    #[default]
    Default,
    /// Zero-based weekdays (0 = Monday .. 6 = Sunday)
    Days(Vec<u8>),
    Disabled,
}

impl CleanSchedule {
    /// Build from the manifest form
    pub fn from_spec(spec: Option<&CleanAtSpec>) -> SchedulerResult<Self> {
        match spec {
            None | Some(CleanAtSpec::Enabled(true)) => Ok(Self::Default),
            Some(CleanAtSpec::Enabled(false)) => Ok(Self::Disabled),
            Some(CleanAtSpec::Days(days)) => {
                let mut validated = Vec::with_capacity(days.len());
                for &day in days {
                    if day > 6 {
                        return Err(SchedulerError::invalid_clean_day(day));
                    }
                    validated.push(day as u8);
                }
                Ok(Self::Days(validated))
            }
        }
    }

    /// Whether `now` falls on a clean day
    pub fn is_clean_day(&self, now: DateTime<Utc>) -> bool {
        let today = now.weekday().num_days_from_monday() as u8;
        match self {
            Self::Default => today == DEFAULT_CLEAN_DAY,
            Self::Days(days) => days.contains(&today),
            Self::Disabled => false,
        }
    }
}

// ============================================================================
// Decisions
// ============================================================================

/// Scheduling inputs for one extension
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub name: String,
    pub run_at: Option<RunAt>,
    pub clean_at: CleanSchedule,
    pub daily_check_run: bool,
    pub disabled: bool,
}

/// Why an extension runs on this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Scheduled,
    DailySweep,
    Forced,
}

impl TriggerReason {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::DailySweep => "daily_sweep",
            Self::Forced => "forced",
        }
    }
}

/// Outcome of evaluating one extension on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunDecision {
    pub should_run: bool,
    pub mode: RunMode,
    pub reason: Option<TriggerReason>,
}

impl RunDecision {
    /// Extension is not due on this tick
    pub fn idle() -> Self {
        Self {
            should_run: false,
            mode: RunMode::Incremental,
            reason: None,
        }
    }

    /// Extension runs in the given mode
    pub fn run(mode: RunMode, reason: TriggerReason) -> Self {
        Self {
            should_run: true,
            mode,
            reason: Some(reason),
        }
    }
}

/// Decides per tick which extensions are due and in which mode
#[derive(Debug, Clone)]
pub struct Scheduler {
    sweep_hour: u32,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            sweep_hour: DEFAULT_SWEEP_HOUR,
        }
    }
}

impl Scheduler {
    /// Create a scheduler with a custom sweep hour
    pub fn new(sweep_hour: u32) -> SchedulerResult<Self> {
        if sweep_hour > 23 {
            return Err(SchedulerError::invalid_hour(sweep_hour));
        }
        Ok(Self { sweep_hour })
    }

    /// Hour of the daily catch-up sweep
    pub fn sweep_hour(&self) -> u32 {
        self.sweep_hour
    }

    /// Whether `now` is the daily sweep tick
    pub fn is_sweep_tick(&self, now: DateTime<Utc>) -> bool {
        now.hour() == self.sweep_hour && now.minute() == 0
    }

    /// Decide whether and how an extension runs at `now`
    pub fn decide(&self, entry: &ScheduleEntry, now: DateTime<Utc>) -> RunDecision {
        if entry.disabled {
            return RunDecision::idle();
        }

        if let Some(run_at) = entry.run_at {
            if run_at.matches(now) {
                let mode = if entry.clean_at.is_clean_day(now) {
                    RunMode::Full
                } else {
                    RunMode::Incremental
                };
                // A scheduled run supersedes the sweep on the same tick
                return RunDecision::run(mode, TriggerReason::Scheduled);
            }
        }

        if entry.daily_check_run && self.is_sweep_tick(now) {
            return RunDecision::run(RunMode::Incremental, TriggerReason::DailySweep);
        }

        RunDecision::idle()
    }
}

// ============================================================================
// Schedule file
// ============================================================================

/// Per-extension schedule overrides loaded from `schedule.json`
#[derive(Debug, Clone, Default)]
pub struct ScheduleFile {
    entries: HashMap<String, RunAt>,
}

impl ScheduleFile {
    /// Parse from JSON text
    pub fn from_json(json: &str) -> SchedulerResult<Self> {
        let raw: HashMap<String, RunAtSpec> = serde_json::from_str(json)?;
        let mut entries = HashMap::with_capacity(raw.len());
        for (name, spec) in raw {
            entries.insert(name, RunAt::try_from(spec)?);
        }
        Ok(Self { entries })
    }

    /// Load from file; a missing file yields an empty schedule
    pub fn load(path: impl AsRef<Path>) -> SchedulerResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)
            .map_err(|e| SchedulerError::io_error("load_schedule", e.to_string()))?;
        Self::from_json(&json)
            .map_err(|e| SchedulerError::schedule_file(path.display().to_string(), e.to_string()))
    }

    /// Override for a named extension
    pub fn get(&self, name: &str) -> Option<RunAt> {
        self.entries.get(name).copied()
    }

    /// Extension names with an override, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of configured overrides
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
