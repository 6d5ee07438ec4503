//! Pipeline domain model

use crate::core::{
    config::{ConfigError, PipelineConfig},
    context::PipelineContext,
    state::{PipelineState, RunStatus},
    step::{FailurePolicy, RenderError, Step},
};
use std::collections::HashMap;

/// A step as it would run, for `--dry-run`
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub id: String,
    pub name: String,
    pub policy: FailurePolicy,
    pub command: Result<String, RenderError>,
    pub teardown: Option<Result<String, RenderError>>,
}

/// A pipeline definition plus the state of its run
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Resolved variables available to all steps
    pub variables: HashMap<String, String>,

    /// Shell program used for every command
    pub shell: String,

    /// Steps in execution order
    pub steps: Vec<Step>,

    /// Execution state
    pub state: PipelineState,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let steps = config
            .steps
            .iter()
            .map(|step_config| Step::from_config(step_config, &config.defaults))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Pipeline {
            name: config.name.clone(),
            variables: config.resolve_variables()?,
            shell: config.shell().to_string(),
            steps,
            state: PipelineState::new(),
        })
    }

    /// Build a pipeline directly from steps
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Pipeline {
            name: name.into(),
            variables: HashMap::new(),
            shell: crate::core::config::DEFAULT_SHELL.to_string(),
            steps,
            state: PipelineState::new(),
        }
    }

    /// Hardened mode: every step aborts the run on failure
    pub fn with_fail_fast(mut self) -> Self {
        self.steps = self
            .steps
            .into_iter()
            .map(|step| step.with_policy(FailurePolicy::Abort))
            .collect();
        self
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Position of a step in execution order
    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    /// Check if every step reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.state.is_terminal())
    }

    /// Step that failed the run, if any
    pub fn failed_step(&self) -> Option<&Step> {
        match self.state.status {
            RunStatus::Failed { step_index, .. } => self.steps.get(step_index),
            _ => None,
        }
    }

    /// Recount step states into the pipeline state
    pub fn update_counts(&mut self) {
        self.state.update_counts(self.steps.iter().map(|s| &s.state));
    }

    /// Create the execution context for a run
    pub fn create_context(&self) -> PipelineContext {
        let mut context = PipelineContext::new();
        context.variables.extend(self.variables.clone());
        context.set_variable("pipeline_name".to_string(), self.name.clone());
        context.set_variable("run_id".to_string(), self.state.execution_id.to_string());
        context
    }

    /// Render every command without running anything
    pub fn plan(&self) -> Vec<PlannedStep> {
        let mut context = self.create_context();
        context.dry_run = true;

        self.steps
            .iter()
            .map(|step| PlannedStep {
                id: step.id.clone(),
                name: step.name.clone(),
                policy: step.policy,
                command: step.render_command(&context),
                teardown: step.render_teardown(&context),
            })
            .collect()
    }
}
