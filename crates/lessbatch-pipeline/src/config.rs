//! Settings for one pass.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lessbatch_types::{FailurePolicy, LesscError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a pass. Every field has a default, so a config file
/// only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassConfig {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    /// Compiler executable, looked up on `PATH` unless it is a path.
    pub command: String,
    /// Fixed flags passed before the source and target paths.
    pub args: Vec<String>,
    /// Per-invocation limit. Zero waits without a limit.
    #[serde(with = "lessbatch_types::duration_serde")]
    pub timeout: Duration,
    pub overwrite: bool,
    pub failure_policy: FailurePolicy,
    pub source_extension: String,
    pub target_extension: String,
    /// Upper bound on concurrent invocations. 1 runs files one at a time.
    pub max_parallel: usize,
    /// Log one line per evaluated directory entry.
    pub log_matches: bool,
    /// Time between SIGTERM and SIGKILL when an invocation times out.
    #[serde(with = "lessbatch_types::duration_serde")]
    pub kill_grace: Duration,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("src/main/resources/less"),
            target_dir: PathBuf::from("target/css"),
            command: "lessc".to_string(),
            args: Vec::new(),
            timeout: Duration::ZERO,
            overwrite: false,
            failure_policy: FailurePolicy::Strict,
            source_extension: "less".to_string(),
            target_extension: "css".to_string(),
            max_parallel: 1,
            log_matches: true,
            kill_grace: Duration::from_secs(2),
        }
    }
}

impl PassConfig {
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
            ..Default::default()
        }
    }

    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(LesscError::InvalidConfig("command must not be empty".into()));
        }
        for (field, ext) in [
            ("source_extension", &self.source_extension),
            ("target_extension", &self.target_extension),
        ] {
            if ext.is_empty() {
                return Err(LesscError::InvalidConfig(format!("{} must not be empty", field)));
            }
            if ext.starts_with('.') || ext.contains('/') || ext.contains('\\') {
                return Err(LesscError::InvalidConfig(format!(
                    "{} must be a bare extension, got '{}'",
                    field, ext
                )));
            }
        }
        if self.source_extension == self.target_extension && self.source_dir == self.target_dir {
            return Err(LesscError::InvalidConfig(
                "artifacts would overwrite their own sources".into(),
            ));
        }
        if self.max_parallel == 0 {
            return Err(LesscError::InvalidConfig("max_parallel must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_plugin_conventions() {
        let c = PassConfig::default();
        assert_eq!(c.source_dir, PathBuf::from("src/main/resources/less"));
        assert_eq!(c.target_dir, PathBuf::from("target/css"));
        assert_eq!(c.command, "lessc");
        assert_eq!(c.timeout, Duration::ZERO);
        assert!(!c.overwrite);
        assert_eq!(c.failure_policy, FailurePolicy::Strict);
        assert_eq!(c.max_parallel, 1);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let c: PassConfig = serde_json::from_str(
            r#"{"source_dir": "styles", "timeout": "30s", "failure_policy": "lenient"}"#,
        )
        .unwrap();
        assert_eq!(c.source_dir, PathBuf::from("styles"));
        assert_eq!(c.timeout, Duration::from_secs(30));
        assert_eq!(c.failure_policy, FailurePolicy::Lenient);
        assert_eq!(c.command, "lessc");
    }

    #[test]
    fn config_serializes_durations_as_strings() {
        let json = serde_json::to_value(PassConfig::default()).unwrap();
        assert_eq!(json["timeout"], "0ms");
        assert_eq!(json["kill_grace"], "2000ms");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("lessbatch.json");
        std::fs::write(&path, r#"{"command": "node_modules/.bin/lessc", "overwrite": true}"#)
            .unwrap();
        let c = PassConfig::load(&path).unwrap();
        assert_eq!(c.command, "node_modules/.bin/lessc");
        assert!(c.overwrite);
    }

    #[test]
    fn load_rejects_bad_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(PassConfig::load(&path), Err(LesscError::Json(_))));
    }

    #[test]
    fn validate_rejects_empty_command() {
        let c = PassConfig {
            command: "  ".into(),
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(LesscError::InvalidConfig(_))));
    }

    #[test]
    fn validate_rejects_dotted_extension() {
        let c = PassConfig {
            source_extension: ".less".into(),
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_self_overwrite() {
        let c = PassConfig {
            target_dir: PathBuf::from("src/main/resources/less"),
            target_extension: "less".into(),
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let c = PassConfig {
            max_parallel: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }
}
