//! Injected logging capability.
//!
//! Components receive an `Arc<dyn PassLogger>` rather than writing to a
//! process-wide logger, so a host can redirect output and tests can inspect it.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Leveled log sink.
pub trait PassLogger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

// ---------------------------------------------------------------------------
// TracingLogger
// ---------------------------------------------------------------------------

/// Forwards every entry to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl PassLogger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "lessbatch", "{}", message),
            LogLevel::Info => tracing::info!(target: "lessbatch", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "lessbatch", "{}", message),
            LogLevel::Error => tracing::error!(target: "lessbatch", "{}", message),
        }
    }
}

// ---------------------------------------------------------------------------
// NullLogger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl PassLogger for NullLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

// ---------------------------------------------------------------------------
// RecordingLogger
// ---------------------------------------------------------------------------

/// Keeps every entry in memory. Used by tests to assert on log output.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Messages logged at `level`, in order.
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|(_, m)| m.contains(needle))
    }
}

impl PassLogger for RecordingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn recording_logger_keeps_levels() {
        let logger = RecordingLogger::new();
        logger.info("File \"a.less\" matches; including.");
        logger.warn("compile failed");
        logger.debug("stdout: ok");

        assert_eq!(logger.entries().len(), 3);
        assert_eq!(logger.messages(LogLevel::Warn), vec!["compile failed"]);
        assert!(logger.contains("a.less"));
        assert!(!logger.contains("b.less"));
    }

    #[test]
    fn loggers_are_usable_as_trait_objects() {
        let loggers: Vec<Arc<dyn PassLogger>> = vec![
            Arc::new(TracingLogger),
            Arc::new(NullLogger),
            Arc::new(RecordingLogger::new()),
        ];
        for logger in &loggers {
            logger.error("boom");
        }
    }

    #[test]
    fn levels_are_ordered() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
    }
}
