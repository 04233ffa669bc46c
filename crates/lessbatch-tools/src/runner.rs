use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use lessbatch_types::FailureKind;

/// One invocation of the external compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationSpec {
    pub program: String,
    pub args: Vec<OsString>,
    /// `None` waits for the command without a limit.
    pub timeout: Option<Duration>,
    pub working_dir: Option<PathBuf>,
}

impl InvocationSpec {
    /// Build the invocation for compiling `source` into `target`. Fixed flags come
    /// first, followed by the source and target paths. A zero `timeout`
    /// means unbounded.
    pub fn for_file(
        program: &str,
        fixed_args: &[String],
        source: &Path,
        target: &Path,
        timeout: Duration,
    ) -> Self {
        let mut args: Vec<OsString> = fixed_args.iter().map(OsString::from).collect();
        args.push(source.as_os_str().to_os_string());
        args.push(target.as_os_str().to_os_string());
        Self {
            program: program.to_string(),
            args,
            timeout: (!timeout.is_zero()).then_some(timeout),
            working_dir: None,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.map(|t| t.as_millis() as u64).unwrap_or(0)
    }
}

/// Result of running an [`InvocationSpec`].
#[derive(Debug, Clone, Default)]
pub struct InvocationResult {
    /// `None` when the process never started, timed out, or died by signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub timed_out: bool,
    /// Set when the process could not be started.
    pub launch_error: Option<String>,
}

impl InvocationResult {
    pub fn exited(exit_code: i32, stdout: String, stderr: String, elapsed: Duration) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout,
            stderr,
            elapsed,
            ..Default::default()
        }
    }

    pub fn launch_failure(reason: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            launch_error: Some(reason.into()),
            elapsed,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.launch_error.is_none() && !self.timed_out && self.exit_code == Some(0)
    }

    /// Classify an unsuccessful result. Returns `None` on success.
    pub fn failure_kind(&self, spec: &InvocationSpec) -> Option<FailureKind> {
        if let Some(reason) = &self.launch_error {
            return Some(FailureKind::Launch {
                reason: reason.clone(),
            });
        }
        if self.timed_out {
            return Some(FailureKind::Timeout {
                timeout_ms: spec.timeout_ms(),
            });
        }
        match self.exit_code {
            Some(0) => None,
            code => Some(FailureKind::Execution { exit_code: code }),
        }
    }

    /// Text to surface for a failed invocation: the captured stderr verbatim,
    /// or the launch error when nothing was captured.
    pub fn diagnostics(&self) -> String {
        match &self.launch_error {
            Some(reason) if self.stderr.is_empty() => reason.clone(),
            _ => self.stderr.clone(),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

/// Runs external commands. Implementations own no state shared between
/// invocations, so calls may run concurrently.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &InvocationSpec) -> InvocationResult;
}
