//! Error reporting seam for pipeline threads.
//!
//! Background threads cannot return errors to a caller; they report through
//! this trait instead. The default reporter writes to stderr.

use crate::error::TalkbackError;
use std::sync::{Arc, Mutex};

pub trait ErrorReporter: Send + Sync {
    /// Report an error from a pipeline stage ("capture", "transcribe",
    /// "watchdog", sink names).
    fn report(&self, stage: &str, error: &TalkbackError);
}

/// Reporter that logs to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrReporter;

impl ErrorReporter for StderrReporter {
    fn report(&self, stage: &str, error: &TalkbackError) {
        eprintln!("talkback: [{stage}] {error}");
    }
}

/// Reporter that records reports for assertions in tests.
#[derive(Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<(String, String)>>,
}

impl CollectingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reports(&self) -> Vec<(String, String)> {
        match self.reports.lock() {
            Ok(reports) => reports.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, stage: &str, error: &TalkbackError) {
        let entry = (stage.to_string(), error.to_string());
        match self.reports.lock() {
            Ok(mut reports) => reports.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_reporter_does_not_panic() {
        StderrReporter.report("capture", &TalkbackError::SourceClosed);
    }

    #[test]
    fn collecting_reporter_records_stage_and_message() {
        let reporter = CollectingReporter::new();
        reporter.report("transcribe", &TalkbackError::SourceClosed);

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "transcribe");
        assert_eq!(reports[0].1, "Audio source closed");
    }
}
