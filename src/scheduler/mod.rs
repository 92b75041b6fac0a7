//! Tick-driven extension scheduling
//!
//! The scheduler answers one question per tick and extension: does it run,
//! and in which mode?
//!
//! # Overview
//!
//! - **run_at**: a daily `hour:00`, or a weekday at `hour:minute`. An
//!   extension without one is never scheduled by this mechanism.
//! - **clean_at**: weekdays (0 = Monday) on which a scheduled run becomes a
//!   full reconciliation. Defaults to Wednesday; `false` disables it.
//! - **daily sweep**: at 01:00 UTC every extension with `daily_check_run`
//!   runs incrementally, unless its scheduled run fires on the same tick.
//!
//! Ticks happen at the top of every hour. Missed ticks are not replayed.
//!
//! ```text
//!   TickLoop ── every hour ──► Orchestrator::run_tick(now)
//!                                   │
//!                   schedule.json ──┤ (re-read each tick)
//!                                   ▼
//!                         Scheduler::decide(entry, now)
//!                                   │
//!                    { should_run, mode, reason } per extension
//! ```
//!
//! # Modules
//!
//! - [`schedule`] - Run-time specs, clean days and per-tick decisions
//! - [`trigger`] - The hourly tick loop
//! - [`error`] - Scheduler errors
//!
//! # Example
//!
//! ```ignore
//! use publoader::scheduler::{CleanSchedule, RunAt, ScheduleEntry, Scheduler};
//!
//! let entry = ScheduleEntry {
//!     name: "mangaplus".to_string(),
//!     run_at: Some(RunAt::weekly(3, 9, 0)?),
//!     clean_at: CleanSchedule::Default,
//!     daily_check_run: true,
//!     disabled: false,
//! };
//!
//! let decision = Scheduler::default().decide(&entry, now);
//! if decision.should_run {
//!     println!("run in {} mode", decision.mode);
//! }
//! ```

pub mod error;
pub mod schedule;
pub mod trigger;

// Re-export main types
pub use error::{SchedulerError, SchedulerResult};
pub use schedule::{
    CleanAtSpec, CleanSchedule, RunAt, RunAtSpec, RunDecision, ScheduleEntry, ScheduleFile,
    Scheduler, TriggerReason, DEFAULT_CLEAN_DAY, DEFAULT_SWEEP_HOUR,
};
pub use trigger::{duration_until_next_hour, tick_instant, TickEvent, TickLoop, TickLoopStatus};
