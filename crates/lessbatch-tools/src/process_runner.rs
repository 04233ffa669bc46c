use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lessbatch_types::{PassLogger, TracingLogger};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;

use crate::runner::{CommandRunner, InvocationResult, InvocationSpec};

/// Time allowed for the output pipes to drain once the process is gone.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Bytes read so far from one pipe. Shared with the reader task so a drain
/// that gives up still keeps what already arrived.
type OutputBuffer = Arc<Mutex<Vec<u8>>>;

struct PipeReader {
    buffer: OutputBuffer,
    task: JoinHandle<()>,
}

/// Runs commands as local child processes.
///
/// On Unix each child gets its own process group. When the time limit
/// expires the group receives SIGTERM, then SIGKILL after `kill_grace`.
/// The child is always reaped before `run` returns, and whatever is left of
/// its process group is killed.
pub struct ProcessCommandRunner {
    kill_grace: Duration,
    logger: Arc<dyn PassLogger>,
}

impl ProcessCommandRunner {
    pub fn new(logger: Arc<dyn PassLogger>) -> Self {
        Self {
            kill_grace: Duration::from_secs(2),
            logger,
        }
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                // Negative pid targets the whole process group.
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGTERM);
                }
                if tokio::time::timeout(self.kill_grace, child.wait())
                    .await
                    .is_ok()
                {
                    return;
                }
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
        }
        let _ = child.kill().await;
    }
}

/// SIGKILL everything still running in the child's process group.
/// A group that is already empty is not an error.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

impl Default for ProcessCommandRunner {
    fn default() -> Self {
        Self::new(Arc::new(TracingLogger))
    }
}

#[async_trait]
impl CommandRunner for ProcessCommandRunner {
    async fn run(&self, spec: &InvocationSpec) -> InvocationResult {
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let start = tokio::time::Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let reason = format!("failed to start '{}': {}", spec.program, e);
                self.logger.error(&reason);
                return InvocationResult::launch_failure(reason, start.elapsed());
            }
        };

        let pid = child.id();

        // Drain both pipes concurrently so a chatty child cannot block on a full pipe.
        let stdout_task = child.stdout.take().map(spawn_reader);
        let stderr_task = child.stderr.take().map(spawn_reader);

        let waited = match spec.timeout {
            None => Some(child.wait().await),
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status),
                Err(_) => {
                    self.logger.warn(&format!(
                        "'{}' exceeded {}ms; terminating",
                        spec.program,
                        spec.timeout_ms()
                    ));
                    self.terminate(&mut child).await;
                    None
                }
            },
        };

        // Background descendants may still hold the pipes open.
        kill_group(pid);

        let stdout = collect_output(stdout_task).await;
        let mut stderr = collect_output(stderr_task).await;
        let elapsed = start.elapsed();

        if !stdout.is_empty() {
            self.logger
                .debug(&format!("{} stdout:\n{}", spec.program, stdout.trim_end()));
        }

        match waited {
            None => InvocationResult {
                stdout,
                stderr,
                elapsed,
                timed_out: true,
                ..Default::default()
            },
            Some(Ok(status)) => InvocationResult {
                exit_code: status.code(),
                stdout,
                stderr,
                elapsed,
                ..Default::default()
            },
            Some(Err(e)) => {
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                stderr.push_str(&format!("failed to wait for '{}': {}", spec.program, e));
                InvocationResult {
                    stdout,
                    stderr,
                    elapsed,
                    ..Default::default()
                }
            }
        }
    }
}

fn spawn_reader<R>(mut reader: R) -> PipeReader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = OutputBuffer::default();
    let sink = buffer.clone();
    let task = tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let mut buf = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    });
    PipeReader { buffer, task }
}

async fn collect_output(reader: Option<PipeReader>) -> String {
    let Some(PipeReader { buffer, mut task }) = reader else {
        return String::new();
    };
    if tokio::time::timeout(PIPE_DRAIN_GRACE, &mut task).await.is_err() {
        task.abort();
    }
    let bytes = buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let text = String::from_utf8_lossy(&bytes).into_owned();
    text
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use lessbatch_types::{FailureKind, LogLevel, NullLogger, RecordingLogger};
    use std::ffi::OsString;

    fn sh(script: &str, timeout: Duration) -> InvocationSpec {
        InvocationSpec {
            program: "sh".into(),
            args: vec![OsString::from("-c"), OsString::from(script)],
            timeout: (!timeout.is_zero()).then_some(timeout),
            working_dir: None,
        }
    }

    fn runner() -> ProcessCommandRunner {
        ProcessCommandRunner::new(Arc::new(NullLogger))
    }

    fn process_alive(pid: i32) -> bool {
        if unsafe { libc::kill(pid, 0) } != 0 {
            return false;
        }
        // An orphan killed by us may linger as a zombie until init reaps it.
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => !stat.contains(") Z "),
            Err(_) => true,
        }
    }

    async fn wait_for_exit(pid: i32) -> bool {
        for _ in 0..40 {
            if !process_alive(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn captures_exit_code_and_streams() {
        let spec = sh("echo out; echo err >&2; exit 0", Duration::from_secs(5));
        let result = runner().run(&spec).await;
        assert!(result.is_success());
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_stderr_verbatim() {
        let spec = sh("printf 'line 1\\nline 2\\n' >&2; exit 3", Duration::ZERO);
        let result = runner().run(&spec).await;
        assert!(!result.is_success());
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr, "line 1\nline 2\n");
        assert_eq!(
            result.failure_kind(&spec),
            Some(FailureKind::Execution { exit_code: Some(3) })
        );
    }

    #[tokio::test]
    async fn missing_executable_is_launch_failure() {
        let spec = InvocationSpec {
            program: "/definitely/not/a/real/lessc".into(),
            args: vec![],
            timeout: None,
            working_dir: None,
        };
        let logger = Arc::new(RecordingLogger::new());
        let result = ProcessCommandRunner::new(logger.clone()).run(&spec).await;
        assert!(result.launch_error.is_some());
        assert_eq!(result.exit_code, None);
        assert!(matches!(
            result.failure_kind(&spec),
            Some(FailureKind::Launch { .. })
        ));
        assert_eq!(logger.messages(LogLevel::Error).len(), 1);
    }

    #[tokio::test]
    async fn timeout_terminates_the_process() {
        let dir = tempfile::TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());
        let spec = sh(&script, Duration::from_millis(200));

        let started = std::time::Instant::now();
        let result = runner()
            .with_kill_grace(Duration::from_millis(500))
            .run(&spec)
            .await;

        assert!(result.timed_out);
        assert!(!result.is_success());
        assert_eq!(
            result.failure_kind(&spec),
            Some(FailureKind::Timeout { timeout_ms: 200 })
        );
        assert!(result.elapsed >= Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_secs(10));

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(!process_alive(pid), "child {} still running", pid);
    }

    #[tokio::test]
    async fn timeout_escalates_to_sigkill_when_term_is_ignored() {
        let spec = sh("trap '' TERM; while :; do sleep 1; done", Duration::from_millis(100));
        let started = std::time::Instant::now();
        let result = runner()
            .with_kill_grace(Duration::from_millis(200))
            .run(&spec)
            .await;
        assert!(result.timed_out);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn zero_timeout_waits_for_completion() {
        let spec = sh("sleep 0.2; echo done", Duration::ZERO);
        let result = runner().run(&spec).await;
        assert!(result.is_success());
        assert_eq!(result.stdout.trim(), "done");
    }

    #[tokio::test]
    async fn stdout_is_logged_at_debug() {
        let logger = Arc::new(RecordingLogger::new());
        let spec = sh("echo compiled", Duration::ZERO);
        ProcessCommandRunner::new(logger.clone()).run(&spec).await;
        let debug = logger.messages(LogLevel::Debug);
        assert_eq!(debug.len(), 1);
        assert!(debug[0].contains("compiled"));
    }

    #[tokio::test]
    async fn large_output_does_not_deadlock() {
        let spec = sh("head -c 1000000 /dev/zero | tr '\\0' x >&2", Duration::from_secs(10));
        let result = runner().run(&spec).await;
        assert!(result.is_success());
        assert_eq!(result.stderr.len(), 1_000_000);
    }

    #[tokio::test]
    async fn stderr_survives_background_child_holding_the_pipe() {
        let spec = sh("echo 'ParseError line 3' >&2; sleep 5 & exit 1", Duration::from_secs(10));
        let started = std::time::Instant::now();
        let result = runner().run(&spec).await;

        assert_eq!(result.exit_code, Some(1));
        assert_eq!(result.stderr, "ParseError line 3\n");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn background_children_are_killed_after_exit() {
        let dir = tempfile::TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("sleep 30 & echo $! > {}; exit 0", pid_file.display());
        let result = runner().run(&sh(&script, Duration::ZERO)).await;
        assert!(result.is_success());

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(wait_for_exit(pid).await, "background child {} still running", pid);
    }
}
