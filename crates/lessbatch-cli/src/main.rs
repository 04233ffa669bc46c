//! CLI binary for running a lessbatch pass.
//!
//! Exit codes: 0 when the pass succeeds, 1 when it fails because of
//! per-file failures, 2 on configuration or directory errors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use lessbatch_pipeline::{PassConfig, PassExecutor};
use lessbatch_types::{FailurePolicy, FileStatus, PassOutcome};

const EXIT_PASS_FAILED: i32 = 1;
const EXIT_CONFIG_ERROR: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "lessbatch", version, about = "Compile a directory of Less files to CSS")]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory containing the .less sources
    #[arg(short = 'i', long = "in", value_name = "DIR")]
    source_dir: Option<PathBuf>,

    /// Directory receiving the .css artifacts (created if missing)
    #[arg(short = 'o', long = "out", value_name = "DIR")]
    target_dir: Option<PathBuf>,

    /// Compiler executable
    #[arg(long)]
    command: Option<String>,

    /// Fixed flag passed to the compiler before the paths (repeatable)
    #[arg(long = "arg", value_name = "FLAG", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Per-file time limit, e.g. 500ms, 30s, 2m. 0 waits forever
    #[arg(long = "time-out", value_parser = parse_timeout)]
    timeout: Option<Duration>,

    /// Recompile even when the target file already exists
    #[arg(long)]
    overwrite: bool,

    /// Record per-file failures but still exit 0
    #[arg(long)]
    lenient: bool,

    /// Maximum number of concurrent compiler processes
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Do not log a line for every directory entry examined
    #[arg(long)]
    quiet_matches: bool,

    /// Print the outcome as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Also write the JSON outcome to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    lessbatch_types::duration_serde::parse_duration(s)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing; stdout stays free for the outcome
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };
    tracing::debug!(?config, "Resolved configuration");

    let executor = PassExecutor::with_process_runner(config);
    let outcome = match executor.run().await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", render_table(&outcome));
    }
    if let Some(path) = &cli.report {
        write_report(&outcome, path)?;
    }

    if !outcome.passed {
        std::process::exit(EXIT_PASS_FAILED);
    }
    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<PassConfig> {
    let mut config = match &cli.config {
        Some(path) => PassConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PassConfig::default(),
    };

    if let Some(dir) = &cli.source_dir {
        config.source_dir = dir.clone();
    }
    if let Some(dir) = &cli.target_dir {
        config.target_dir = dir.clone();
    }
    if let Some(command) = &cli.command {
        config.command = command.clone();
    }
    if !cli.args.is_empty() {
        config.args = cli.args.clone();
    }
    if let Some(timeout) = cli.timeout {
        config.timeout = timeout;
    }
    if cli.overwrite {
        config.overwrite = true;
    }
    if cli.lenient {
        config.failure_policy = FailurePolicy::Lenient;
    }
    if let Some(jobs) = cli.jobs {
        config.max_parallel = jobs;
    }
    if cli.quiet_matches {
        config.log_matches = false;
    }

    config.validate()?;
    Ok(config)
}

fn render_table(outcome: &PassOutcome) -> String {
    let mut out = String::new();
    for file in &outcome.files {
        out.push_str(&format!("{:<8} {}\n", file.status.label(), file.name));
        if let FileStatus::Failed {
            failure,
            diagnostics,
        } = &file.status
        {
            out.push_str(&format!("         {}\n", failure));
            for line in diagnostics.lines() {
                out.push_str(&format!("         | {}\n", line));
            }
        }
    }
    out.push_str(&outcome.summary());
    out.push('\n');
    out
}

fn write_report(outcome: &PassOutcome, path: &Path) -> anyhow::Result<()> {
    outcome
        .save(path)
        .with_context(|| format!("failed to write report {}", path.display()))
}
