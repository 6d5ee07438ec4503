//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Exit code recorded when a step timed out (same as coreutils `timeout`)
pub const EXIT_TIMEOUT: i32 = 124;

/// Exit code recorded when a step's command could not be spawned
pub const EXIT_SPAWN_FAILURE: i32 = 127;

/// Exit code recorded when a step failed before reaching the shell
pub const EXIT_INTERNAL: i32 = 1;

/// Overall pipeline run status
///
/// `NotStarted → Running(index) → Succeeded | Failed(index, code)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Run has not started
    NotStarted,
    /// Step at `step_index` is executing
    Running { step_index: usize },
    /// Every abort-on-failure step succeeded
    Succeeded,
    /// An abort-on-failure step failed and halted the run
    Failed { step_index: usize, exit_code: i32 },
}

impl RunStatus {
    /// Check if the run reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed { .. })
    }

    /// Process exit code for this status (`None` while not terminal)
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunStatus::Succeeded => Some(0),
            RunStatus::Failed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Short label used by the console and the history store
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::NotStarted => "not_started",
            RunStatus::Running { .. } => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed { .. } => "failed",
        }
    }
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not run yet
    Pending,
    /// Step is currently running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Command exited with status zero
    Succeeded {
        exit_code: i32,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Command failed but its output matched the step's `exists_pattern`
    AlreadyExists {
        exit_code: i32,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Command failed, timed out, or could not be started
    Failed {
        exit_code: i32,
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step never ran because an earlier step aborted the run
    Skipped {
        reason: String,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepState::Pending | StepState::Running { .. })
    }

    /// Check if the step counts as successful
    pub fn is_success(&self) -> bool {
        matches!(self, StepState::Succeeded { .. } | StepState::AlreadyExists { .. })
    }

    /// Exit code of a finished step
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            StepState::Succeeded { exit_code, .. }
            | StepState::AlreadyExists { exit_code, .. }
            | StepState::Failed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current run status
    pub status: RunStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution finished
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of steps
    pub total_steps: usize,

    /// Steps that succeeded (including already-existing resources)
    pub succeeded_steps: usize,

    /// Steps that failed, whatever their policy
    pub failed_steps: usize,

    /// Steps skipped after an abort
    pub skipped_steps: usize,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: RunStatus::NotStarted,
            started_at: None,
            completed_at: None,
            total_steps: 0,
            succeeded_steps: 0,
            failed_steps: 0,
            skipped_steps: 0,
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self, total_steps: usize) {
        self.status = RunStatus::Running { step_index: 0 };
        self.started_at = Some(Utc::now());
        self.total_steps = total_steps;
    }

    /// Advance the running cursor
    pub fn enter_step(&mut self, step_index: usize) {
        self.status = RunStatus::Running { step_index };
    }

    /// Mark pipeline as succeeded
    pub fn succeed(&mut self) {
        self.status = RunStatus::Succeeded;
        self.completed_at = Some(Utc::now());
    }

    /// Mark pipeline as failed at `step_index`
    pub fn fail(&mut self, step_index: usize, exit_code: i32) {
        self.status = RunStatus::Failed {
            step_index,
            exit_code,
        };
        self.completed_at = Some(Utc::now());
    }

    /// Recount steps from their states
    pub fn update_counts<'a>(&mut self, states: impl Iterator<Item = &'a StepState>) {
        let (mut succeeded, mut failed, mut skipped) = (0, 0, 0);
        for state in states {
            match state {
                StepState::Succeeded { .. } | StepState::AlreadyExists { .. } => succeeded += 1,
                StepState::Failed { .. } => failed += 1,
                StepState::Skipped { .. } => skipped += 1,
                _ => {}
            }
        }
        self.succeeded_steps = succeeded;
        self.failed_steps = failed;
        self.skipped_steps = skipped;
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
