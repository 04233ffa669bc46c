//! Shared types, errors, and outcomes for the lessbatch orchestrator.
//!
//! This crate provides the foundational types used across all other lessbatch crates:
//! - `LesscError`: infrastructure error taxonomy (always fatal to a pass)
//! - `FailureKind` / `FileStatus` / `FileResult`: per-file results
//! - `PassOutcome`: aggregate result of one pass
//! - `PassLogger`: injected logging capability

pub mod duration_serde;
pub mod logger;

pub use logger::{LogLevel, NullLogger, PassLogger, RecordingLogger, TracingLogger};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Infrastructure errors. Any of these aborts the whole pass, regardless of
/// the failure policy. Per-file compiler failures are never reported here;
/// they are recorded in [`PassOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum LesscError {
    #[error("Source directory {} does not exist", path.display())]
    SourceDirMissing { path: PathBuf },

    #[error("Source directory {} is not a directory", path.display())]
    SourceDirNotDirectory { path: PathBuf },

    #[error("Source directory {} is not readable: {source}", path.display())]
    SourceDirUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Target directory {} cannot be used: {source}", path.display())]
    TargetDirUnusable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Target directory {} disappeared during the pass", path.display())]
    TargetDirLost { path: PathBuf },

    #[error("Invalid source file name \"{name}\": expected a plain, visible file name")]
    InvalidFileName { name: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LesscError {
    /// Returns `true` for errors caused by the directories or settings a pass
    /// was given, as opposed to an unexpected I/O or encoding problem.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LesscError::SourceDirMissing { .. }
                | LesscError::SourceDirNotDirectory { .. }
                | LesscError::SourceDirUnreadable { .. }
                | LesscError::TargetDirUnusable { .. }
                | LesscError::TargetDirLost { .. }
                | LesscError::InvalidFileName { .. }
                | LesscError::InvalidConfig(_)
        )
    }
}

/// A convenience alias for `Result<T, LesscError>`.
pub type Result<T> = std::result::Result<T, LesscError>;

// ---------------------------------------------------------------------------
// FailurePolicy
// ---------------------------------------------------------------------------

/// Whether per-file failures flip the overall pass result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failed file fails the pass.
    #[default]
    Strict,
    /// Failed files are recorded and logged; the pass still succeeds.
    Lenient,
}

impl FailurePolicy {
    pub fn from_fail_on_error(fail_on_error: bool) -> Self {
        if fail_on_error {
            FailurePolicy::Strict
        } else {
            FailurePolicy::Lenient
        }
    }

    pub fn tolerates_failures(self) -> bool {
        self == FailurePolicy::Lenient
    }
}

// ---------------------------------------------------------------------------
// FailureKind / FileStatus / FileResult
// ---------------------------------------------------------------------------

/// Why a single file failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The command could not be started at all.
    Launch { reason: String },
    /// The command ran and exited unsuccessfully. `exit_code` is `None` when
    /// it was terminated by a signal.
    Execution { exit_code: Option<i32> },
    /// The command exceeded its time limit and was terminated.
    Timeout { timeout_ms: u64 },
    /// The source file named by the caller was not found.
    SourceMissing,
    /// The pass was cancelled before this file was started.
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Launch { reason } => write!(f, "launch failure: {}", reason),
            FailureKind::Execution {
                exit_code: Some(code),
            } => write!(f, "exited with code {}", code),
            FailureKind::Execution { exit_code: None } => write!(f, "terminated by signal"),
            FailureKind::Timeout { timeout_ms } => write!(f, "timed out after {}ms", timeout_ms),
            FailureKind::SourceMissing => write!(f, "source file missing"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Status of one file within a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Success,
    Skipped,
    Failed {
        failure: FailureKind,
        /// Diagnostic output of the command, verbatim.
        diagnostics: String,
    },
}

impl FileStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, FileStatus::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileStatus::Success => "success",
            FileStatus::Skipped => "skipped",
            FileStatus::Failed { .. } => "failed",
        }
    }
}

/// Result recorded for a single source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResult {
    /// File name within the source directory.
    pub name: String,
    pub source: PathBuf,
    pub target: PathBuf,
    pub status: FileStatus,
    pub duration_ms: u64,
}

impl FileResult {
    pub fn failure(&self) -> Option<&FailureKind> {
        match &self.status {
            FileStatus::Failed { failure, .. } => Some(failure),
            _ => None,
        }
    }

    pub fn diagnostics(&self) -> Option<&str> {
        match &self.status {
            FileStatus::Failed { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// PassOutcome
// ---------------------------------------------------------------------------

/// Aggregate result of one pass. Files appear in enumeration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassOutcome {
    pub pass_id: uuid::Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub policy: FailurePolicy,
    pub files: Vec<FileResult>,
    pub passed: bool,
}

impl PassOutcome {
    /// Build the outcome from per-file results. The overall flag is `true`
    /// iff no file failed, or the policy is lenient.
    pub fn from_results(
        pass_id: uuid::Uuid,
        started_at: chrono::DateTime<chrono::Utc>,
        policy: FailurePolicy,
        files: Vec<FileResult>,
    ) -> Self {
        let any_failed = files.iter().any(|f| f.status.is_failed());
        Self {
            pass_id,
            started_at,
            finished_at: chrono::Utc::now(),
            policy,
            passed: !any_failed || policy.tolerates_failures(),
            files,
        }
    }

    pub fn file(&self, name: &str) -> Option<&FileResult> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Success))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(FileStatus::is_failed)
    }

    fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.status)).count()
    }

    /// One-line summary, e.g. `3 files: 2 succeeded, 0 skipped, 1 failed (FAILED)`.
    pub fn summary(&self) -> String {
        format!(
            "{} files: {} succeeded, {} skipped, {} failed ({})",
            self.files.len(),
            self.succeeded(),
            self.skipped(),
            self.failed(),
            if self.passed { "PASSED" } else { "FAILED" }
        )
    }

    /// Serialize this outcome to pretty JSON and write it to `path`.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
