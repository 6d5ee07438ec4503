//! Pipeline execution engine

pub mod engine;
pub mod executor;

pub use engine::{EngineError, EventHandler, ExecutionEngine, ExecutionEvent, RunOutcome};
pub use executor::{ExecutionResult, StepExecutor};
