//! ci-runner - A CI test-orchestration runner: provision, test, report

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod runner;

// Re-export commonly used types
pub use crate::core::{FailurePolicy, Pipeline, PipelineContext, RunStatus, Step, StepState};
pub use crate::execution::{ExecutionEngine, ExecutionEvent, RunOutcome};
pub use crate::runner::{CommandInvocation, CommandOutput, CommandRunner, OutputSink, ShellRunner};
