//! Integration test suite
//!
//! Drives the orchestrator end to end with scripted extensions, in-memory
//! and SQLite state stores, and a mocked upload webhook.

pub mod error_scenarios;
pub mod extension_dir_test;
pub mod fixtures;
pub mod pipeline_test;
pub mod properties_test;
pub mod reconcile_test;
