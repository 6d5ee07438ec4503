//! Command runners - how a step's command line becomes a process

pub mod output;
pub mod shell;
pub mod streaming;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub use output::{CommandOutput, RunnerError};
pub use shell::ShellRunner;
pub use streaming::{OutputSink, OutputStream};

/// A fully rendered command, ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Step the command belongs to (for logs and streamed output)
    pub step_id: String,

    /// Shell program, invoked as `<shell> -c <command>`
    pub shell: String,

    /// Rendered command line
    pub command: String,

    /// Working directory (None = inherit)
    pub working_dir: Option<PathBuf>,

    /// Extra environment on top of the inherited one
    pub env: BTreeMap<String, String>,

    /// Kill the command after this long
    pub timeout: Option<Duration>,
}

impl CommandInvocation {
    pub fn new(step_id: impl Into<String>, shell: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            shell: shell.into(),
            command: command.into(),
            working_dir: None,
            env: BTreeMap::new(),
            timeout: None,
        }
    }
}

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion, streaming its output lines to `sink`
    ///
    /// A non-zero exit is not an error: it comes back as a `CommandOutput`.
    /// Errors are reserved for commands that never produced an exit status.
    async fn run(
        &self,
        invocation: &CommandInvocation,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutput, RunnerError>;
}
