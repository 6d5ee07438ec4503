//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{FailurePolicy, Pipeline, RunStatus, StepState},
    execution::{ExecutionResult, StepExecutor},
    runner::{CommandRunner, OutputSink},
};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        total_steps: usize,
    },
    StepStarted {
        step_id: String,
        index: usize,
        total: usize,
    },
    StepSucceeded {
        step_id: String,
        duration_ms: u64,
    },
    StepAlreadyExists {
        step_id: String,
        exit_code: i32,
    },
    StepFailed {
        step_id: String,
        exit_code: i32,
        error: String,
        policy: FailurePolicy,
    },
    StepSkipped {
        step_id: String,
        reason: String,
    },
    TeardownStarted {
        step_id: String,
    },
    TeardownSucceeded {
        step_id: String,
    },
    TeardownFailed {
        step_id: String,
        exit_code: i32,
        error: String,
    },
    PipelineFinished {
        execution_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Errors that prevent a run from happening at all
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("pipeline execution {0} has already been run")]
    AlreadyRun(Uuid),
}

/// How a finished run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub execution_id: Uuid,
    pub status: RunStatus,
    /// Process exit code to forward to the caller
    pub exit_code: i32,
    /// The failure came from the failed step's teardown, not its command
    pub failed_in_teardown: bool,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// Main pipeline execution engine
pub struct ExecutionEngine<R> {
    executor: StepExecutor<R>,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
    output_sink: Option<Arc<dyn OutputSink>>,
}

impl<R: CommandRunner> ExecutionEngine<R> {
    pub fn new(runner: R) -> Self {
        Self {
            executor: StepExecutor::new(runner),
            event_handlers: Arc::new(Mutex::new(Vec::new())),
            output_sink: None,
        }
    }

    /// Stream command output lines to `sink` while steps run
    pub fn with_output_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.output_sink = Some(sink);
        self
    }

    /// Access the underlying command runner
    pub fn runner(&self) -> &R {
        self.executor.runner()
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    async fn emit_event(&self, event: ExecutionEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute the entire pipeline
    ///
    /// Steps run strictly in order. A failing step with the `abort` policy
    /// halts the run and its exit code becomes the run's exit code; failing
    /// `continue` steps are recorded and the run goes on. Teardowns of steps
    /// that created their resource run last, in reverse order.
    ///
    /// # Errors
    /// Returns `EngineError::AlreadyRun` if the pipeline state is not fresh.
    pub async fn execute(&self, pipeline: &mut Pipeline) -> Result<RunOutcome, EngineError> {
        let execution_id = pipeline.state.execution_id;
        if pipeline.state.status != RunStatus::NotStarted {
            return Err(EngineError::AlreadyRun(execution_id));
        }

        let total = pipeline.steps.len();
        info!(
            "Starting pipeline execution: {} ({}, {} steps)",
            pipeline.name, execution_id, total
        );
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name.clone(),
            total_steps: total,
        })
        .await;

        pipeline.state.start(total);
        let mut context = pipeline.create_context();
        let sink = self.output_sink.as_deref();

        // Indices of steps whose teardown must run, in creation order
        let mut teardowns: Vec<usize> = Vec::new();
        let mut aborted: Option<(usize, i32)> = None;

        for index in 0..total {
            if let Some((failed_index, _)) = aborted {
                let reason = format!("aborted after '{}' failed", pipeline.steps[failed_index].id);
                let step = &mut pipeline.steps[index];
                step.state = StepState::Skipped {
                    reason: reason.clone(),
                };
                self.emit_event(ExecutionEvent::StepSkipped {
                    step_id: step.id.clone(),
                    reason,
                })
                .await;
                continue;
            }

            pipeline.state.enter_step(index);
            let step_id = pipeline.steps[index].id.clone();
            let started_at = Utc::now();
            pipeline.steps[index].state = StepState::Running { started_at };
            self.emit_event(ExecutionEvent::StepStarted {
                step_id: step_id.clone(),
                index,
                total,
            })
            .await;

            let result = self
                .executor
                .execute(&pipeline.steps[index], &context, &pipeline.shell, sink)
                .await;
            context.record_result(&step_id, result.to_step_result());

            let step = &mut pipeline.steps[index];
            match result {
                ExecutionResult::Success { output, .. } => {
                    step.state = StepState::Succeeded {
                        exit_code: output.status_code(),
                        started_at,
                        completed_at: Utc::now(),
                    };
                    if step.teardown.is_some() {
                        teardowns.push(index);
                    }
                    self.emit_event(ExecutionEvent::StepSucceeded {
                        step_id,
                        duration_ms: output.duration_ms,
                    })
                    .await;
                }
                ExecutionResult::AlreadyExists { output, .. } => {
                    let exit_code = output.status_code();
                    step.state = StepState::AlreadyExists {
                        exit_code,
                        started_at,
                        completed_at: Utc::now(),
                    };
                    self.emit_event(ExecutionEvent::StepAlreadyExists { step_id, exit_code })
                        .await;
                }
                ExecutionResult::Failed {
                    exit_code, error, ..
                } => {
                    let policy = step.policy;
                    step.state = StepState::Failed {
                        exit_code,
                        error: error.clone(),
                        started_at,
                        failed_at: Utc::now(),
                    };
                    match policy {
                        FailurePolicy::Abort => {
                            error!(
                                "Step {} failed with exit code {}, aborting run",
                                step_id, exit_code
                            );
                            aborted = Some((index, exit_code));
                        }
                        FailurePolicy::Continue => {
                            warn!(
                                "Step {} failed with exit code {}, continuing",
                                step_id, exit_code
                            );
                        }
                    }
                    self.emit_event(ExecutionEvent::StepFailed {
                        step_id,
                        exit_code,
                        error,
                        policy,
                    })
                    .await;
                }
            }

            pipeline.update_counts();
        }

        let teardown_failure = self.run_teardowns(pipeline, &teardowns, &context).await;

        let failed_in_teardown = aborted.is_none() && teardown_failure.is_some();
        match aborted.or(teardown_failure) {
            Some((step_index, exit_code)) => pipeline.state.fail(step_index, exit_code),
            None => pipeline.state.succeed(),
        }
        pipeline.update_counts();

        let status = pipeline.state.status;
        let exit_code = status.exit_code().unwrap_or_default();
        info!(
            "Pipeline {} finished: {} (exit code {})",
            pipeline.name,
            status.label(),
            exit_code
        );
        self.emit_event(ExecutionEvent::PipelineFinished {
            execution_id,
            status,
        })
        .await;

        Ok(RunOutcome {
            execution_id,
            status,
            exit_code,
            failed_in_teardown,
        })
    }

    /// Run registered teardowns last-in first-out
    ///
    /// Returns the first teardown failure that should fail the run.
    async fn run_teardowns(
        &self,
        pipeline: &Pipeline,
        teardowns: &[usize],
        context: &crate::core::PipelineContext,
    ) -> Option<(usize, i32)> {
        let sink = self.output_sink.as_deref();
        let mut failure = None;

        for &index in teardowns.iter().rev() {
            let step = &pipeline.steps[index];
            self.emit_event(ExecutionEvent::TeardownStarted {
                step_id: step.id.clone(),
            })
            .await;

            match self
                .executor
                .execute_teardown(step, context, &pipeline.shell, sink)
                .await
            {
                Some(ExecutionResult::Failed {
                    exit_code, error, ..
                }) => {
                    warn!("Teardown of step {} failed: {}", step.id, error);
                    if step.aborts_on_failure() && failure.is_none() {
                        failure = Some((index, exit_code));
                    }
                    self.emit_event(ExecutionEvent::TeardownFailed {
                        step_id: step.id.clone(),
                        exit_code,
                        error,
                    })
                    .await;
                }
                Some(_) => {
                    self.emit_event(ExecutionEvent::TeardownSucceeded {
                        step_id: step.id.clone(),
                    })
                    .await;
                }
                None => {}
            }
        }

        failure
    }
}
