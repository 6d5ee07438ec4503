//! Step executor - runs individual steps with the command runner

use crate::{
    core::{state::EXIT_INTERNAL, PipelineContext, Step, StepResult},
    runner::{CommandInvocation, CommandOutput, CommandRunner, OutputSink},
};
use tracing::{debug, error, info, warn};

/// Result of executing a step
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    /// Command exited with status zero
    Success {
        command: String,
        output: CommandOutput,
    },
    /// Command failed, but its output says the resource is already there
    AlreadyExists {
        command: String,
        output: CommandOutput,
    },
    /// Command failed, timed out, could not start, or could not be rendered
    Failed {
        exit_code: i32,
        error: String,
        output: Option<CommandOutput>,
    },
}

impl ExecutionResult {
    /// Exit code to record for this result
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecutionResult::Success { output, .. } | ExecutionResult::AlreadyExists { output, .. } => {
                output.status_code()
            }
            ExecutionResult::Failed { exit_code, .. } => *exit_code,
        }
    }

    /// Result later steps can reference through `{{ steps.<id>.* }}`
    pub fn to_step_result(&self) -> StepResult {
        let output = match self {
            ExecutionResult::Success { output, .. } | ExecutionResult::AlreadyExists { output, .. } => {
                Some(output)
            }
            ExecutionResult::Failed { output, .. } => output.as_ref(),
        };

        StepResult {
            exit_code: self.exit_code(),
            stdout: output.map(|o| o.stdout.clone()).unwrap_or_default(),
            stderr: output.map(|o| o.stderr.clone()).unwrap_or_default(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, ExecutionResult::Failed { .. })
    }
}

/// Executes a single step
pub struct StepExecutor<R> {
    runner: R,
}

impl<R: CommandRunner> StepExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Access the underlying runner
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Execute a step's main command and classify the result
    pub async fn execute(
        &self,
        step: &Step,
        context: &PipelineContext,
        shell: &str,
        sink: Option<&dyn OutputSink>,
    ) -> ExecutionResult {
        info!("Executing step: {}", step.id);

        let command = match step.render_command(context) {
            Ok(command) => command,
            Err(e) => {
                error!("Cannot render command for step {}: {}", step.id, e);
                return ExecutionResult::Failed {
                    exit_code: EXIT_INTERNAL,
                    error: format!("Cannot render command: {}", e),
                    output: None,
                };
            }
        };

        let result = self.run_command(step, shell, command.clone(), sink).await;

        match result {
            ExecutionResult::Failed {
                exit_code,
                error,
                output: Some(output),
            } => {
                if step.reports_existing(&output.stdout, &output.stderr) {
                    info!(
                        "Step {} exited with {} but its resource already exists",
                        step.id, exit_code
                    );
                    ExecutionResult::AlreadyExists { command, output }
                } else {
                    ExecutionResult::Failed {
                        exit_code,
                        error,
                        output: Some(output),
                    }
                }
            }
            other => other,
        }
    }

    /// Execute a step's teardown command
    ///
    /// Returns `None` when the step has no teardown.
    pub async fn execute_teardown(
        &self,
        step: &Step,
        context: &PipelineContext,
        shell: &str,
        sink: Option<&dyn OutputSink>,
    ) -> Option<ExecutionResult> {
        let command = match step.render_teardown(context)? {
            Ok(command) => command,
            Err(e) => {
                error!("Cannot render teardown for step {}: {}", step.id, e);
                return Some(ExecutionResult::Failed {
                    exit_code: EXIT_INTERNAL,
                    error: format!("Cannot render teardown: {}", e),
                    output: None,
                });
            }
        };

        info!("Tearing down step: {}", step.id);
        Some(self.run_command(step, shell, command, sink).await)
    }

    async fn run_command(
        &self,
        step: &Step,
        shell: &str,
        command: String,
        sink: Option<&dyn OutputSink>,
    ) -> ExecutionResult {
        debug!("Rendered command for step {}: {}", step.id, command);

        let invocation = CommandInvocation {
            step_id: step.id.clone(),
            shell: shell.to_string(),
            command: command.clone(),
            working_dir: step.working_dir.clone(),
            env: step.env.clone(),
            timeout: step.timeout(),
        };

        match self.runner.run(&invocation, sink).await {
            Ok(output) if output.success() => {
                debug!("Step {} succeeded in {}ms", step.id, output.duration_ms);
                ExecutionResult::Success { command, output }
            }
            Ok(output) => {
                let exit_code = output.status_code();
                let error = match (output.signal, output.summary_line()) {
                    (Some(signal), _) if output.exit_code.is_none() => {
                        format!("Killed by signal {}", signal)
                    }
                    (_, Some(line)) => format!("Exited with code {}: {}", exit_code, line),
                    (_, None) => format!("Exited with code {}", exit_code),
                };
                warn!("Step {} failed: {}", step.id, error);
                ExecutionResult::Failed {
                    exit_code,
                    error,
                    output: Some(output),
                }
            }
            Err(e) => {
                error!("Runner error for step {}: {}", step.id, e);
                ExecutionResult::Failed {
                    exit_code: e.exit_code(),
                    error: e.to_string(),
                    output: None,
                }
            }
        }
    }
}
