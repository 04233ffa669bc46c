//! Pass event system for observability.
//!
//! Emits [`PassEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (progress bars, build-tool bridges, tests) can follow a
//! pass without coupling to the executor internals.

use serde::{Deserialize, Serialize};

/// Events emitted during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassEvent {
    PassStarted {
        pass_id: String,
        file_count: usize,
    },
    FileStarted {
        file: String,
    },
    FileSkipped {
        file: String,
    },
    FileSucceeded {
        file: String,
        duration_ms: u64,
    },
    FileFailed {
        file: String,
        failure: String,
        duration_ms: u64,
    },
    PassCompleted {
        pass_id: String,
        passed: bool,
        succeeded: usize,
        skipped: usize,
        failed: usize,
    },
    PassAborted {
        error: String,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PassEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PassEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PassEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
