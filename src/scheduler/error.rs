//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// Invalid hour value (must be 0-23)
    InvalidHour {
        hour: u32,
    },

    /// Invalid minute value (must be 0-59)
    InvalidMinute {
        minute: u32,
    },

    /// Weekday outside the accepted numbering
    InvalidWeekday {
        day: u32,
        expected: &'static str,
    },

    /// Schedule file could not be parsed
    ScheduleFileError {
        path: String,
        reason: String,
    },

    /// Serialization/deserialization error
    SerializationError {
        reason: String,
    },

    /// IO error
    IoError {
        operation: String,
        reason: String,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHour { hour } => {
                write!(f, "Invalid hour '{}'. Must be 0-23", hour)
            }
            Self::InvalidMinute { minute } => {
                write!(f, "Invalid minute '{}'. Must be 0-59", minute)
            }
            Self::InvalidWeekday { day, expected } => {
                write!(f, "Invalid weekday '{}'. Expected {}", day, expected)
            }
            Self::ScheduleFileError { path, reason } => {
                write!(f, "Invalid schedule file '{}': {}", path, reason)
            }
            Self::SerializationError { reason } => {
                write!(f, "Serialization error: {}", reason)
            }
            Self::IoError { operation, reason } => {
                write!(f, "IO error during '{}': {}", operation, reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            operation: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl SchedulerError {
    /// Create an invalid hour error
    pub fn invalid_hour(hour: u32) -> Self {
        Self::InvalidHour { hour }
    }

    /// Create an invalid minute error
    pub fn invalid_minute(minute: u32) -> Self {
        Self::InvalidMinute { minute }
    }

    /// Create an invalid weekday error for ISO numbering (1 = Monday)
    pub fn invalid_iso_weekday(day: u32) -> Self {
        Self::InvalidWeekday {
            day,
            expected: "1-7 (1 = Monday)",
        }
    }

    /// Create an invalid weekday error for zero-based numbering (0 = Monday)
    pub fn invalid_clean_day(day: u32) -> Self {
        Self::InvalidWeekday {
            day,
            expected: "0-6 (0 = Monday)",
        }
    }

    /// Create a schedule file error
    pub fn schedule_file(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ScheduleFileError {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an IO error with context
    pub fn io_error(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IoError {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::IoError { .. })
    }
}
