//! Per-file reports and run summaries.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::orientation::Decision;

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    /// The decision called for a rotation (written unless dry run).
    Rotated,
    /// The page was judged upright.
    Unchanged,
    /// The evidence was inconclusive; the file was left alone.
    Skipped,
    /// The file could not be read, decoded or written.
    Failed,
}

impl FileOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            FileOutcome::Rotated => "rotated",
            FileOutcome::Unchanged => "unchanged",
            FileOutcome::Skipped => "skipped",
            FileOutcome::Failed => "failed",
        }
    }

    /// Outcome implied by a decision.
    pub fn from_decision(decision: &Decision) -> Self {
        if decision.is_inconclusive() {
            FileOutcome::Skipped
        } else if decision.applied() {
            FileOutcome::Rotated
        } else {
            FileOutcome::Unchanged
        }
    }
}

/// Result of processing a single file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
    /// Absent when the file failed before a decision was reached.
    pub decision: Option<Decision>,
    pub error: Option<String>,
    /// Whether new bytes replaced the original file.
    pub written: bool,
    pub elapsed_ms: u64,
}

impl FileReport {
    pub fn decided(path: PathBuf, decision: Decision, written: bool, elapsed: Duration) -> Self {
        Self {
            path,
            outcome: FileOutcome::from_decision(&decision),
            decision: Some(decision),
            error: None,
            written,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// A failure. `decision` is kept when the page was evaluated but the write failed.
    pub fn failed(path: PathBuf, decision: Option<Decision>, error: String, elapsed: Duration) -> Self {
        Self {
            path,
            outcome: FileOutcome::Failed,
            decision,
            error: Some(error),
            written: false,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Outcome of one invocation over a set of files.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub dry_run: bool,
    pub rotated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Files never reached because the run was cancelled.
    pub not_processed: usize,
    pub cancelled: bool,
    pub reports: Vec<FileReport>,
}

impl RunSummary {
    pub fn new(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            elapsed_ms: 0,
            dry_run,
            rotated: 0,
            unchanged: 0,
            skipped: 0,
            failed: 0,
            not_processed: 0,
            cancelled: false,
            reports: Vec::new(),
        }
    }

    /// Count a report and keep it.
    pub fn record(&mut self, report: FileReport) {
        match report.outcome {
            FileOutcome::Rotated => self.rotated += 1,
            FileOutcome::Unchanged => self.unchanged += 1,
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Failed => self.failed += 1,
        }
        self.reports.push(report);
    }

    /// Number of files that were processed.
    pub fn processed(&self) -> usize {
        self.reports.len()
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed_ms = elapsed.as_millis() as u64;
    }
}
