//! Target artifact derivation and the overwrite gate.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use lessbatch_tools::SourceFile;

/// Output file name for `name`: the source extension is replaced by the
/// target extension, the base name is kept.
pub fn target_file_name(name: &str, source_ext: &str, target_ext: &str) -> String {
    let suffix = format!(".{}", source_ext);
    let base = name.strip_suffix(&suffix).unwrap_or(name);
    format!("{}.{}", base, target_ext)
}

/// The output expected for a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetArtifact {
    pub path: PathBuf,
    pub exists: bool,
    pub modified: Option<SystemTime>,
}

impl TargetArtifact {
    pub fn path_for(
        source: &SourceFile,
        target_dir: &Path,
        source_ext: &str,
        target_ext: &str,
    ) -> PathBuf {
        target_dir.join(target_file_name(&source.name, source_ext, target_ext))
    }

    /// Stat `path` to find out whether the artifact is already there.
    pub async fn inspect(path: PathBuf) -> Self {
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Self {
                modified: meta.modified().ok(),
                exists: true,
                path,
            },
            Err(_) => Self {
                path,
                exists: false,
                modified: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactDecision {
    Write,
    Skip,
}

/// Binary overwrite gate. An existing artifact is presumed current; no
/// content or timestamp comparison is made.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactPolicy {
    overwrite: bool,
}

impl ArtifactPolicy {
    pub fn new(overwrite: bool) -> Self {
        Self { overwrite }
    }

    pub fn decide(&self, target: &TargetArtifact) -> ArtifactDecision {
        if self.overwrite || !target.exists {
            ArtifactDecision::Write
        } else {
            ArtifactDecision::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifact(exists: bool) -> TargetArtifact {
        TargetArtifact {
            path: PathBuf::from("/out/a.css"),
            exists,
            modified: None,
        }
    }

    #[test]
    fn target_name_replaces_extension() {
        assert_eq!(target_file_name("a.less", "less", "css"), "a.css");
        assert_eq!(target_file_name("site.theme.less", "less", "css"), "site.theme.css");
    }

    #[test]
    fn target_name_without_source_extension_appends() {
        assert_eq!(target_file_name("README", "less", "css"), "README.css");
    }

    #[test]
    fn path_for_roots_at_target_dir() {
        let source = SourceFile {
            name: "main.less".into(),
            path: PathBuf::from("/src/main.less"),
            modified: None,
        };
        assert_eq!(
            TargetArtifact::path_for(&source, Path::new("/out"), "less", "css"),
            PathBuf::from("/out/main.css")
        );
    }

    #[test]
    fn overwrite_always_writes() {
        let policy = ArtifactPolicy::new(true);
        assert_eq!(policy.decide(&artifact(true)), ArtifactDecision::Write);
        assert_eq!(policy.decide(&artifact(false)), ArtifactDecision::Write);
    }

    #[test]
    fn no_overwrite_skips_existing() {
        let policy = ArtifactPolicy::new(false);
        assert_eq!(policy.decide(&artifact(true)), ArtifactDecision::Skip);
        assert_eq!(policy.decide(&artifact(false)), ArtifactDecision::Write);
    }

    #[tokio::test]
    async fn inspect_reports_existence() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("a.css");
        std::fs::write(&present, "a{}").unwrap();

        let found = TargetArtifact::inspect(present.clone()).await;
        assert!(found.exists);
        assert!(found.modified.is_some());
        assert_eq!(found.path, present);

        let missing = TargetArtifact::inspect(dir.path().join("b.css")).await;
        assert!(!missing.exists);
        assert!(missing.modified.is_none());
    }
}
