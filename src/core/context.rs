//! Pipeline context - variables and results of finished steps

use crate::core::step::{shell_quote, Placeholder, RenderError, StepResultField};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a finished step left behind for later steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// Exit code, after signal/timeout mapping
    pub exit_code: i32,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,
}

/// Execution context for a pipeline run
///
/// Results are addressed by step ID. There is no notion of "the previous
/// step's status": a step that needs another step's exit code names that
/// step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineContext {
    /// Global, builtin and overridden variables
    pub variables: HashMap<String, String>,

    /// Results of finished steps (step_id -> result)
    pub step_results: HashMap<String, StepResult>,

    /// Render step references as `<steps.id.field>` instead of failing
    #[serde(default)]
    pub dry_run: bool,
}

impl PipelineContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable
    pub fn set_variable(&mut self, key: String, value: String) {
        self.variables.insert(key, value);
    }

    /// Get a variable
    pub fn get_variable(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }

    /// Record the result of a finished step
    pub fn record_result(&mut self, step_id: &str, result: StepResult) {
        self.step_results.insert(step_id.to_string(), result);
    }

    /// Get the result of a finished step
    pub fn step_result(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.get(step_id)
    }

    /// Resolve a placeholder to its rendered value
    pub fn resolve(&self, placeholder: &Placeholder) -> Result<String, RenderError> {
        match placeholder {
            Placeholder::Variable(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| RenderError::UnknownVariable(name.clone())),
            Placeholder::StepResult { step, field } => {
                let field_kind = StepResultField::parse(field)
                    .ok_or_else(|| RenderError::UnknownField(field.clone()))?;

                let Some(result) = self.step_results.get(step) else {
                    if self.dry_run {
                        return Ok(format!("<steps.{}.{}>", step, field));
                    }
                    return Err(RenderError::MissingStepResult(step.clone()));
                };

                Ok(match field_kind {
                    StepResultField::ExitCode => result.exit_code.to_string(),
                    StepResultField::Stdout => result.stdout.trim_end().to_string(),
                    StepResultField::Stderr => result.stderr.trim_end().to_string(),
                    StepResultField::StdoutQuoted => shell_quote(result.stdout.trim_end()),
                    StepResultField::StderrQuoted => shell_quote(result.stderr.trim_end()),
                })
            }
        }
    }
}
