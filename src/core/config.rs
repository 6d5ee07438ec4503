//! Pipeline configuration from YAML

use crate::core::{
    step::{placeholders, FailurePolicy, Placeholder, StepResultField},
    Pipeline,
};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Variables every pipeline gets without declaring them
pub const BUILTIN_VARIABLES: &[&str] = &["pipeline_name", "run_id"];

/// Shell used when a pipeline does not name one
pub const DEFAULT_SHELL: &str = "sh";

/// Errors raised while parsing or validating a pipeline file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid pipeline YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("pipeline name must not be empty")]
    EmptyName,

    #[error("pipeline has no steps")]
    NoSteps,

    #[error("invalid step ID '{0}' (use letters, digits, '-' and '_')")]
    InvalidStepId(String),

    #[error("duplicate step ID: {0}")]
    DuplicateStepId(String),

    #[error("step '{0}' has an empty `run` command")]
    EmptyCommand(String),

    #[error("step '{step}' has an invalid exists_pattern: {source}")]
    InvalidPattern {
        step: String,
        #[source]
        source: regex::Error,
    },

    #[error("step '{step}' has a zero timeout")]
    ZeroTimeout { step: String },

    #[error("step '{step}' references unknown variable '{name}'")]
    UnknownVariable { step: String, name: String },

    #[error("step '{step}' references step '{target}', which does not run before it")]
    ForwardReference { step: String, target: String },

    #[error("step '{step}' references unknown step result field '{field}'")]
    UnknownResultField { step: String, field: String },

    #[error("variable '{variable}' reads environment variable {env}, which is not set")]
    MissingEnvironment { variable: String, env: String },
}

/// Variable definition - a literal or a value read from the environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableDefinition {
    /// Literal string value
    String(String),
    /// Environment lookup with optional fallback
    Env {
        env: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl VariableDefinition {
    /// Resolve the value of variable `name`, using `lookup` for environment reads
    pub fn resolve<F>(&self, name: &str, lookup: &F) -> Result<String, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            VariableDefinition::String(s) => Ok(s.clone()),
            VariableDefinition::Env { env, default } => lookup(env)
                .or_else(|| default.clone())
                .ok_or_else(|| ConfigError::MissingEnvironment {
                    variable: name.to_string(),
                    env: env.clone(),
                }),
        }
    }
}

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Pipeline version (optional)
    #[serde(default)]
    pub version: Option<String>,

    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,

    /// Global variables available to all steps
    #[serde(default)]
    pub variables: BTreeMap<String, VariableDefinition>,

    /// Settings inherited by every step
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Pipeline steps, executed in declared order
    pub steps: Vec<StepConfig>,
}

/// Pipeline-wide step defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Shell program, invoked as `<shell> -c <command>`
    #[serde(default)]
    pub shell: Option<String>,

    /// Default timeout in seconds (absent = no timeout)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Default failure policy
    #[serde(default)]
    pub on_failure: Option<FailurePolicy>,

    /// Default working directory
    #[serde(default)]
    pub working_dir: Option<String>,

    /// Environment added to every step
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step identifier
    pub id: String,

    /// Human-readable step name (defaults to the ID)
    #[serde(default)]
    pub name: Option<String>,

    /// Optional step description
    #[serde(default)]
    pub description: Option<String>,

    /// Command line, run through the pipeline shell
    pub run: String,

    /// What to do when the command fails
    #[serde(default)]
    pub on_failure: Option<FailurePolicy>,

    /// Timeout for this step (overrides the default)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Working directory (overrides the default)
    #[serde(default)]
    pub working_dir: Option<String>,

    /// Extra environment for this step
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Regex matched against output of a failed run; a match means the
    /// resource was already there
    #[serde(default)]
    pub exists_pattern: Option<String>,

    /// Command releasing whatever this step created
    #[serde(default)]
    pub teardown: Option<String>,
}

impl StepConfig {
    /// Display name, falling back to the ID
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file_with_overrides(path, &[])
    }

    /// Load a YAML file, apply `key=value` overrides, then validate
    pub fn from_file_with_overrides<P: AsRef<Path>>(
        path: P,
        overrides: &[(String, String)],
    ) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        let config = Self::parse_yaml(&content)?.with_overrides(overrides);
        config
            .validate()
            .with_context(|| format!("Invalid pipeline file {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate pipeline configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config = Self::parse_yaml(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating
    pub fn parse_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Replace or add literal variables
    pub fn with_overrides(mut self, overrides: &[(String, String)]) -> Self {
        for (key, value) in overrides {
            self.variables
                .insert(key.clone(), VariableDefinition::String(value.clone()));
        }
        self
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.steps.is_empty() {
            return Err(ConfigError::NoSteps);
        }
        if self.defaults.timeout_secs == Some(0) {
            return Err(ConfigError::ZeroTimeout {
                step: "defaults".to_string(),
            });
        }

        let mut declared: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if !is_valid_step_id(&step.id) {
                return Err(ConfigError::InvalidStepId(step.id.clone()));
            }
            if declared.contains(step.id.as_str()) {
                return Err(ConfigError::DuplicateStepId(step.id.clone()));
            }
            if step.run.trim().is_empty() {
                return Err(ConfigError::EmptyCommand(step.id.clone()));
            }
            if step.timeout_secs == Some(0) {
                return Err(ConfigError::ZeroTimeout {
                    step: step.id.clone(),
                });
            }
            if let Some(pattern) = &step.exists_pattern {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    step: step.id.clone(),
                    source,
                })?;
            }

            // `run` may only see steps declared before it
            self.check_placeholders(&step.id, &step.run, &declared)?;

            // teardown runs after the whole sequence, so it may also see itself
            if let Some(teardown) = &step.teardown {
                declared.insert(step.id.as_str());
                self.check_placeholders(&step.id, teardown, &declared)?;
            }
            declared.insert(step.id.as_str());
        }

        Ok(())
    }

    fn check_placeholders(
        &self,
        step_id: &str,
        template: &str,
        visible_steps: &HashSet<&str>,
    ) -> Result<(), ConfigError> {
        for placeholder in placeholders(template) {
            match placeholder {
                Placeholder::Variable(name) => {
                    if !self.variables.contains_key(&name)
                        && !BUILTIN_VARIABLES.contains(&name.as_str())
                    {
                        return Err(ConfigError::UnknownVariable {
                            step: step_id.to_string(),
                            name,
                        });
                    }
                }
                Placeholder::StepResult { step, field } => {
                    if StepResultField::parse(&field).is_none() {
                        return Err(ConfigError::UnknownResultField {
                            step: step_id.to_string(),
                            field,
                        });
                    }
                    if !visible_steps.contains(step.as_str()) {
                        return Err(ConfigError::ForwardReference {
                            step: step_id.to_string(),
                            target: step,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve variables against the process environment
    pub fn resolve_variables(&self) -> Result<HashMap<String, String>, ConfigError> {
        self.resolve_variables_with(|name| std::env::var(name).ok())
    }

    /// Resolve variables with a custom environment lookup
    pub fn resolve_variables_with<F>(&self, lookup: F) -> Result<HashMap<String, String>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.variables
            .iter()
            .map(|(key, definition)| Ok((key.clone(), definition.resolve(key, &lookup)?)))
            .collect()
    }

    /// Shell program for this pipeline
    pub fn shell(&self) -> &str {
        self.defaults.shell.as_deref().unwrap_or(DEFAULT_SHELL)
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline, ConfigError> {
        Pipeline::from_config(self)
    }
}

fn is_valid_step_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
