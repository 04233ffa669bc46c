//! Pass executor: drives one transformation pass.
//!
//! Phases: validate the source directory, select files, ensure the target
//! directory, run every file through the artifact policy and the command
//! runner, then aggregate the per-file results.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lessbatch_tools::{
    list_sources, CommandRunner, InvocationSpec, ProcessCommandRunner, SourceFile, SourceMatcher,
};
use lessbatch_types::{
    FailureKind, FileResult, FileStatus, LesscError, PassLogger, PassOutcome, Result,
    TracingLogger,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::artifact::{ArtifactDecision, ArtifactPolicy, TargetArtifact};
use crate::config::PassConfig;
use crate::events::{EventEmitter, PassEvent};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Runs passes. Owns the command runner, the logger, and the event emitter.
pub struct PassExecutor {
    config: PassConfig,
    runner: Arc<dyn CommandRunner>,
    logger: Arc<dyn PassLogger>,
    events: EventEmitter,
    cancel: CancellationToken,
}

/// Everything a worker needs to process one file.
struct FileContext {
    runner: Arc<dyn CommandRunner>,
    logger: Arc<dyn PassLogger>,
    events: EventEmitter,
    cancel: CancellationToken,
    policy: ArtifactPolicy,
    target_dir: PathBuf,
    command: String,
    args: Vec<String>,
    timeout: std::time::Duration,
}

struct FileJob {
    source: SourceFile,
    target: PathBuf,
}

// ---------------------------------------------------------------------------
// PassExecutor
// ---------------------------------------------------------------------------

impl PassExecutor {
    pub fn new(
        config: PassConfig,
        runner: Arc<dyn CommandRunner>,
        logger: Arc<dyn PassLogger>,
    ) -> Self {
        Self {
            config,
            runner,
            logger,
            events: EventEmitter::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Executor that spawns real processes and logs through `tracing`.
    pub fn with_process_runner(config: PassConfig) -> Self {
        let logger: Arc<dyn PassLogger> = Arc::new(TracingLogger);
        let runner = ProcessCommandRunner::new(logger.clone()).with_kill_grace(config.kill_grace);
        Self::new(config, Arc::new(runner), logger)
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &PassConfig {
        &self.config
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Token that stops passes from starting further invocations. Each pass
    /// runs under a child of this token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a pass over every qualifying file in the source directory.
    pub async fn run(&self) -> Result<PassOutcome> {
        self.config.validate().map_err(|e| self.abort(e))?;
        let source_dir = self.check_source_dir().await?;
        let matcher = SourceMatcher::new(&self.config.source_extension, self.logger.clone())
            .log_matches(self.config.log_matches);
        let sources = match list_sources(&source_dir, &matcher).await {
            Ok(sources) => sources,
            Err(e) => return Err(self.abort(e)),
        };
        self.execute(sources).await
    }

    /// Run a pass over `included`, a list of file names inside the source
    /// directory that has already been filtered. Repeated names are run once.
    /// A name that is not a plain visible file name fails the whole pass.
    pub async fn run_files(&self, included: &[String]) -> Result<PassOutcome> {
        self.config.validate().map_err(|e| self.abort(e))?;
        if let Some(name) = included.iter().find(|name| !is_plain_file_name(name)) {
            return Err(self.abort(LesscError::InvalidFileName { name: name.clone() }));
        }
        let source_dir = self.check_source_dir().await?;

        let mut sources: Vec<SourceFile> = Vec::with_capacity(included.len());
        for name in included {
            if sources.iter().any(|s| &s.name == name) {
                self.logger
                    .warn(&format!("File \"{}\" listed twice; running it once.", name));
                continue;
            }
            let source = match SourceFile::locate(&source_dir, name).await {
                Some(source) => source,
                None => SourceFile {
                    name: name.clone(),
                    path: source_dir.join(name),
                    modified: None,
                },
            };
            sources.push(source);
        }
        self.execute(sources).await
    }

    async fn execute(&self, sources: Vec<SourceFile>) -> Result<PassOutcome> {
        let target_dir = match self.ensure_target_dir().await {
            Ok(dir) => dir,
            Err(e) => return Err(self.abort(e)),
        };

        let pass_id = uuid::Uuid::new_v4();
        let started_at = chrono::Utc::now();
        let file_count = sources.len();
        self.logger.info(&format!(
            "Transforming {} file(s) from {} to {}",
            file_count,
            self.config.source_dir.display(),
            target_dir.display()
        ));
        self.events.emit(PassEvent::PassStarted {
            pass_id: pass_id.to_string(),
            file_count,
        });

        let jobs: Vec<FileJob> = sources
            .into_iter()
            .map(|source| FileJob {
                target: TargetArtifact::path_for(
                    &source,
                    &target_dir,
                    &self.config.source_extension,
                    &self.config.target_extension,
                ),
                source,
            })
            .collect();
        let names: Vec<(String, PathBuf, PathBuf)> = jobs
            .iter()
            .map(|j| (j.source.name.clone(), j.source.path.clone(), j.target.clone()))
            .collect();

        // Infrastructure errors stop only this pass. The caller's token stays
        // untouched, and later passes start from a fresh child.
        let cancel = self.cancel.child_token();
        let ctx = Arc::new(FileContext {
            runner: self.runner.clone(),
            logger: self.logger.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
            policy: ArtifactPolicy::new(self.config.overwrite),
            target_dir,
            command: self.config.command.clone(),
            args: self.config.args.clone(),
            timeout: self.config.timeout,
        });

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let mut workers: JoinSet<Result<(usize, FileResult)>> = JoinSet::new();
        for (index, job) in jobs.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let ctx = ctx.clone();
            workers.spawn(async move {
                let result = process_file(&ctx, job).await;
                drop(permit);
                result.map(|r| (index, r))
            });
        }

        // Results land in a slot per file, so the outcome keeps enumeration order.
        let mut slots: Vec<Option<FileResult>> = vec![None; file_count];
        let mut infra_error: Option<LesscError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok((index, result))) => slots[index] = Some(result),
                Ok(Err(e)) => {
                    infra_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Worker task failed");
                    cancel.cancel();
                    infra_error.get_or_insert(LesscError::Io(std::io::Error::other(format!(
                        "worker task failed: {}",
                        e
                    ))));
                }
            }
        }
        if let Some(e) = infra_error {
            return Err(self.abort(e));
        }

        let files: Vec<FileResult> = slots
            .into_iter()
            .zip(names)
            .map(|(slot, (name, source, target))| {
                slot.unwrap_or_else(|| FileResult {
                    name,
                    source,
                    target,
                    status: FileStatus::Failed {
                        failure: FailureKind::Cancelled,
                        diagnostics: String::new(),
                    },
                    duration_ms: 0,
                })
            })
            .collect();

        let outcome = PassOutcome::from_results(pass_id, started_at, self.config.failure_policy, files);
        if outcome.failed() > 0 && outcome.passed {
            self.logger.warn(&format!(
                "Ignoring {} failed file(s), since the failure policy is lenient.",
                outcome.failed()
            ));
        }
        self.logger.info(&outcome.summary());
        self.events.emit(PassEvent::PassCompleted {
            pass_id: pass_id.to_string(),
            passed: outcome.passed,
            succeeded: outcome.succeeded(),
            skipped: outcome.skipped(),
            failed: outcome.failed(),
        });
        Ok(outcome)
    }

    async fn check_source_dir(&self) -> Result<PathBuf> {
        inspect_source_dir(&self.config.source_dir)
            .await
            .map_err(|e| self.abort(e))
    }

    async fn ensure_target_dir(&self) -> Result<PathBuf> {
        let path = &self.config.target_dir;
        let unusable = |source| LesscError::TargetDirUnusable {
            path: path.clone(),
            source,
        };
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            self.logger
                .info(&format!("Creating target directory {}", path.display()));
        }
        tokio::fs::create_dir_all(path).await.map_err(unusable)?;
        tokio::fs::canonicalize(path).await.map_err(unusable)
    }

    fn abort(&self, error: LesscError) -> LesscError {
        self.logger.error(&error.to_string());
        self.events.emit(PassEvent::PassAborted {
            error: error.to_string(),
        });
        error
    }
}

// ---------------------------------------------------------------------------
// Per-file work
// ---------------------------------------------------------------------------

async fn process_file(ctx: &FileContext, job: FileJob) -> Result<FileResult> {
    let started = tokio::time::Instant::now();
    let name = job.source.name.clone();
    let finish = |status: FileStatus| FileResult {
        name: job.source.name.clone(),
        source: job.source.path.clone(),
        target: job.target.clone(),
        status,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    let failed = |failure: FailureKind, diagnostics: String| {
        let result = finish(FileStatus::Failed {
            failure: failure.clone(),
            diagnostics,
        });
        ctx.events.emit(PassEvent::FileFailed {
            file: name.clone(),
            failure: failure.to_string(),
            duration_ms: result.duration_ms,
        });
        result
    };

    if ctx.cancel.is_cancelled() {
        return Ok(failed(FailureKind::Cancelled, String::new()));
    }

    if !tokio::fs::try_exists(&job.source.path).await.unwrap_or(false) {
        ctx.logger
            .error(&format!("Source file \"{}\" not found.", name));
        return Ok(failed(FailureKind::SourceMissing, String::new()));
    }

    let target = TargetArtifact::inspect(job.target.clone()).await;
    if ctx.policy.decide(&target) == ArtifactDecision::Skip {
        ctx.logger.info(&format!(
            "Skipping \"{}\"; target {} already exists.",
            name,
            target.path.display()
        ));
        ctx.events.emit(PassEvent::FileSkipped { file: name.clone() });
        return Ok(finish(FileStatus::Skipped));
    }

    if !is_usable_dir(&ctx.target_dir).await {
        ctx.cancel.cancel();
        return Err(LesscError::TargetDirLost {
            path: ctx.target_dir.clone(),
        });
    }

    let spec = InvocationSpec::for_file(
        &ctx.command,
        &ctx.args,
        &job.source.path,
        &target.path,
        ctx.timeout,
    );
    ctx.logger.info(&format!(
        "Transforming \"{}\" to {}",
        name,
        target.path.display()
    ));
    ctx.events.emit(PassEvent::FileStarted { file: name.clone() });

    let result = ctx.runner.run(&spec).await;
    match result.failure_kind(&spec) {
        None => {
            let done = finish(FileStatus::Success);
            ctx.events.emit(PassEvent::FileSucceeded {
                file: name.clone(),
                duration_ms: done.duration_ms,
            });
            Ok(done)
        }
        Some(failure) => {
            ctx.logger
                .error(&format!("Failed to transform \"{}\": {}", name, failure));
            let diagnostics = result.diagnostics();
            if !diagnostics.is_empty() {
                ctx.logger.warn(diagnostics.trim_end());
            }
            Ok(failed(failure, diagnostics))
        }
    }
}

/// The source directory must exist, be a directory, and be listable.
/// Returns its canonical path.
async fn inspect_source_dir(path: &Path) -> Result<PathBuf> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LesscError::SourceDirMissing {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(LesscError::SourceDirUnreadable {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if !meta.is_dir() {
        return Err(LesscError::SourceDirNotDirectory {
            path: path.to_path_buf(),
        });
    }
    let unreadable = |source| LesscError::SourceDirUnreadable {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::read_dir(path).await.map_err(unreadable)?;
    tokio::fs::canonicalize(path).await.map_err(unreadable)
}

/// A single visible path component, so joining it onto a directory cannot
/// leave that directory.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains(std::path::MAIN_SEPARATOR)
        && SourceMatcher::is_visible(name)
}

async fn is_usable_dir(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_dir())
}
