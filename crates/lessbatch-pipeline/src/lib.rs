//! Pass orchestration for lessbatch.
//!
//! Ties the source matcher, artifact policy, and command runner together:
//! one pass validates the directories, enumerates qualifying files, decides
//! per file whether to (re)write the artifact, invokes the compiler, and
//! aggregates everything into a `PassOutcome`.

pub mod artifact;
pub mod config;
pub mod events;
pub mod executor;

pub use artifact::{target_file_name, ArtifactDecision, ArtifactPolicy, TargetArtifact};
pub use config::PassConfig;
pub use events::{EventEmitter, PassEvent};
pub use executor::PassExecutor;
