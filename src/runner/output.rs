//! Command output and error types

use crate::core::state::{EXIT_INTERNAL, EXIT_SPAWN_FAILURE, EXIT_TIMEOUT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for command execution
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timeout after {0} seconds")]
    Timeout(u64),

    #[error("I/O error while waiting for command: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Exit code recorded for a command that never produced one
    pub fn exit_code(&self) -> i32 {
        match self {
            RunnerError::Spawn { .. } => EXIT_SPAWN_FAILURE,
            RunnerError::Timeout(_) => EXIT_TIMEOUT,
            RunnerError::Io(_) => EXIT_INTERNAL,
        }
    }
}

/// What a finished command produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code, when the process exited normally
    pub exit_code: Option<i32>,

    /// Terminating signal, when the process was killed (unix)
    pub signal: Option<i32>,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Output of a command that exited normally
    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code: Some(exit_code),
            ..Self::default()
        }
    }

    /// Builder: set stdout
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Builder: set stderr
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Exit status as a shell would report it (`128 + n` for signal `n`)
    pub fn status_code(&self) -> i32 {
        match (self.exit_code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => EXIT_INTERNAL,
        }
    }

    pub fn success(&self) -> bool {
        self.status_code() == 0
    }

    /// Last non-empty line of stderr, falling back to stdout
    pub fn summary_line(&self) -> Option<&str> {
        fn last_line(s: &str) -> Option<&str> {
            s.lines().rev().map(str::trim).find(|line| !line.is_empty())
        }
        last_line(&self.stderr).or_else(|| last_line(&self.stdout))
    }
}
