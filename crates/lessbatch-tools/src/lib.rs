//! Source file selection and external command invocation for lessbatch.
//!
//! Provides the `SourceMatcher` path predicate, `list_sources` directory
//! enumeration, the `CommandRunner` trait, and the `ProcessCommandRunner`
//! implementation that spawns real child processes with a time limit.

pub mod process_runner;
pub mod runner;
pub mod source_filter;

pub use process_runner::ProcessCommandRunner;
pub use runner::{CommandRunner, InvocationResult, InvocationSpec};
pub use source_filter::{list_sources, SourceFile, SourceMatcher};
