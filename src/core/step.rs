//! Step domain model

use crate::core::{
    config::{ConfigError, DefaultsConfig, StepConfig},
    context::PipelineContext,
    state::StepState,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// What the orchestrator does when a step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Halt the run; remaining steps are skipped
    Abort,
    /// Record the failure and move on to the next step
    #[default]
    Continue,
}

/// A placeholder could not be filled in
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("step '{0}' has no recorded result")]
    MissingStepResult(String),

    #[error("unknown step result field '{0}'")]
    UnknownField(String),
}

/// A `{{ ... }}` reference inside a command template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// `{{ name }}`
    Variable(String),
    /// `{{ steps.<id>.<field> }}`
    StepResult { step: String, field: String },
}

impl Placeholder {
    fn parse(key: &str) -> Self {
        if let Some(rest) = key.strip_prefix("steps.") {
            if let Some((step, field)) = rest.split_once('.') {
                return Placeholder::StepResult {
                    step: step.to_string(),
                    field: field.to_string(),
                };
            }
        }
        Placeholder::Variable(key.to_string())
    }
}

/// Parts of a finished step a later step may read
///
/// `stdout` and `stderr` are pasted into the command as they are, so the
/// shell interprets them. The `_quoted` forms arrive as one single-quoted
/// word instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResultField {
    ExitCode,
    Stdout,
    Stderr,
    StdoutQuoted,
    StderrQuoted,
}

impl StepResultField {
    pub fn parse(field: &str) -> Option<Self> {
        match field {
            "exit_code" => Some(StepResultField::ExitCode),
            "stdout" => Some(StepResultField::Stdout),
            "stderr" => Some(StepResultField::Stderr),
            "stdout_quoted" => Some(StepResultField::StdoutQuoted),
            "stderr_quoted" => Some(StepResultField::StderrQuoted),
            _ => None,
        }
    }
}

/// Quote `text` as a single POSIX shell word
pub fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder regex is valid")
    })
}

/// Every placeholder in `template`, in order of appearance
pub fn placeholders(template: &str) -> Vec<Placeholder> {
    placeholder_regex()
        .captures_iter(template)
        .map(|caps| Placeholder::parse(&caps[1]))
        .collect()
}

/// Fill in every `{{ ... }}` in `template` from `context`
pub fn render_template(template: &str, context: &PipelineContext) -> Result<String, RenderError> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder_regex().captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(&context.resolve(&Placeholder::parse(&caps[1]))?);
        last = whole.end();
    }
    rendered.push_str(&template[last..]);

    Ok(rendered)
}

/// A single step in a pipeline
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique step identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Command template
    pub command: String,

    /// Failure policy
    pub policy: FailurePolicy,

    /// Timeout in seconds (None = wait forever)
    pub timeout_secs: Option<u64>,

    /// Working directory for the child process
    pub working_dir: Option<PathBuf>,

    /// Environment for the child process (defaults merged with step env)
    pub env: BTreeMap<String, String>,

    /// Output pattern meaning "resource already exists"
    pub exists_pattern: Option<Regex>,

    /// Teardown command template, registered when the step succeeds
    pub teardown: Option<String>,

    /// Runtime state
    pub state: StepState,
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(config: &StepConfig, defaults: &DefaultsConfig) -> Result<Self, ConfigError> {
        let exists_pattern = config
            .exists_pattern
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    step: config.id.clone(),
                    source,
                })
            })
            .transpose()?;

        let mut env = defaults.env.clone();
        env.extend(config.env.clone());

        Ok(Step {
            id: config.id.clone(),
            name: config.display_name().to_string(),
            description: config.description.clone(),
            command: config.run.clone(),
            policy: config
                .on_failure
                .or(defaults.on_failure)
                .unwrap_or_default(),
            timeout_secs: config.timeout_secs.or(defaults.timeout_secs),
            working_dir: config
                .working_dir
                .as_ref()
                .or(defaults.working_dir.as_ref())
                .map(PathBuf::from),
            env,
            exists_pattern,
            teardown: config.teardown.clone(),
            state: StepState::Pending,
        })
    }

    /// Minimal step with default settings
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        let id = id.into();
        Step {
            name: id.clone(),
            id,
            description: None,
            command: command.into(),
            policy: FailurePolicy::default(),
            timeout_secs: None,
            working_dir: None,
            env: BTreeMap::new(),
            exists_pattern: None,
            teardown: None,
            state: StepState::Pending,
        }
    }

    /// Builder: set the failure policy
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder: set the teardown command
    pub fn with_teardown(mut self, teardown: impl Into<String>) -> Self {
        self.teardown = Some(teardown.into());
        self
    }

    /// Render the command with variables and earlier step results
    pub fn render_command(&self, context: &PipelineContext) -> Result<String, RenderError> {
        render_template(&self.command, context)
    }

    /// Render the teardown command, if any
    pub fn render_teardown(&self, context: &PipelineContext) -> Option<Result<String, RenderError>> {
        self.teardown
            .as_deref()
            .map(|teardown| render_template(teardown, context))
    }

    /// Timeout as a duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn aborts_on_failure(&self) -> bool {
        self.policy == FailurePolicy::Abort
    }

    /// Check whether failed output says the resource already exists
    pub fn reports_existing(&self, stdout: &str, stderr: &str) -> bool {
        self.exists_pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(stdout) || pattern.is_match(stderr))
    }
}
