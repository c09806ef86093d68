//! Stage errors and how they are reported.

use std::fmt;
use std::sync::Mutex;

/// An error raised inside a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageError {
    /// Affects a single utterance; the stage turns it into a record flag and continues.
    Recoverable(String),
    /// Aborts the run.
    Fatal(String),
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            StageError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for StageError {}

/// Trait for reporting stage errors.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, stage: &str, error: &StageError);
}

/// Reports through `tracing`: recoverable errors as warnings, fatal ones as errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, stage: &str, error: &StageError) {
        match error {
            StageError::Recoverable(msg) => tracing::warn!(stage, "{}", msg),
            StageError::Fatal(msg) => tracing::error!(stage, "{}", msg),
        }
    }
}

/// Keeps every report; used by tests and the run summary.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<(String, StageError)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, StageError)> {
        self.reports
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, stage: &str, error: &StageError) {
        let mut reports = self.reports.lock().unwrap_or_else(|e| e.into_inner());
        reports.push((stage.to_string(), error.clone()));
    }
}
