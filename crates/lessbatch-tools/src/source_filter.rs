use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use lessbatch_types::{LesscError, PassLogger};

/// A qualifying source file, as found in the source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// File name within the source directory.
    pub name: String,
    /// Absolute path.
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
}

impl SourceFile {
    /// Look up `name` inside `dir`. Returns `None` if the file is gone.
    pub async fn locate(dir: &Path, name: &str) -> Option<Self> {
        let path = dir.join(name);
        let meta = tokio::fs::metadata(&path).await.ok()?;
        Some(Self {
            name: name.to_string(),
            path,
            modified: meta.modified().ok(),
        })
    }
}

/// Decides whether a directory entry is a source file.
///
/// An entry qualifies iff its name ends with `.<extension>` (exact,
/// case-sensitive), does not start with a dot, and is not a directory.
pub struct SourceMatcher {
    suffix: String,
    logger: Arc<dyn PassLogger>,
    log_matches: bool,
}

impl SourceMatcher {
    pub fn new(extension: &str, logger: Arc<dyn PassLogger>) -> Self {
        Self {
            suffix: format!(".{}", extension),
            logger,
            log_matches: true,
        }
    }

    /// Enable or disable the per-entry match/no-match log line.
    pub fn log_matches(mut self, enabled: bool) -> Self {
        self.log_matches = enabled;
        self
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn has_source_suffix(&self, name: &str) -> bool {
        name.ends_with(&self.suffix)
    }

    pub fn is_visible(name: &str) -> bool {
        !name.starts_with('.')
    }

    pub fn matches(&self, dir: &Path, name: &str) -> bool {
        let matched =
            self.has_source_suffix(name) && Self::is_visible(name) && is_not_directory(dir, name);
        if self.log_matches {
            if matched {
                self.logger
                    .info(&format!("File \"{}\" matches; including.", name));
            } else {
                self.logger
                    .info(&format!("File \"{}\" does not match; excluding.", name));
            }
        }
        matched
    }
}

/// Entries that cannot be stat'ed (unreadable, deleted since listing) count
/// as "not a plain file".
fn is_not_directory(dir: &Path, name: &str) -> bool {
    match std::fs::metadata(dir.join(name)) {
        Ok(meta) => !meta.is_dir(),
        Err(_) => false,
    }
}

/// List the qualifying files of `dir` in directory-listing order.
pub async fn list_sources(
    dir: &Path,
    matcher: &SourceMatcher,
) -> lessbatch_types::Result<Vec<SourceFile>> {
    let unreadable = |source: std::io::Error| LesscError::SourceDirUnreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut read_dir = tokio::fs::read_dir(dir).await.map_err(unreadable)?;
    let mut sources = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(unreadable)? {
        let Ok(name) = entry.file_name().into_string() else {
            tracing::debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
            continue;
        };
        if !matcher.matches(dir, &name) {
            continue;
        }
        if let Some(source) = SourceFile::locate(dir, &name).await {
            sources.push(source);
        }
    }
    Ok(sources)
}
