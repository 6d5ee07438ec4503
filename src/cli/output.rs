//! CLI output formatting

use crate::{
    core::{FailurePolicy, PlannedStep, RunStatus, StepState},
    execution::ExecutionEvent,
    persistence::ExecutionSummary,
};
use console::{Emoji, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static RECYCLE: Emoji<'_, '_> = Emoji("♻️  ", "= ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "* ");

/// Create a spinner for the running step
///
/// Hidden when stdout is not a terminal so CI logs stay clean.
pub fn create_spinner() -> ProgressBar {
    if !Term::stdout().is_term() {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn format_policy(policy: FailurePolicy) -> String {
    match policy {
        FailurePolicy::Abort => style("abort").red().to_string(),
        FailurePolicy::Continue => style("continue").yellow().to_string(),
    }
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Succeeded { .. } => style("SUCCEEDED").green().to_string(),
        StepState::AlreadyExists { .. } => style("ALREADY EXISTS").cyan().to_string(),
        StepState::Failed { exit_code, .. } => {
            style(format!("FAILED ({})", exit_code)).red().to_string()
        }
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::NotStarted => style("NOT STARTED").dim().to_string(),
        RunStatus::Running { step_index } => {
            style(format!("RUNNING (step {})", step_index + 1)).yellow().to_string()
        }
        RunStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        RunStatus::Failed {
            step_index,
            exit_code,
        } => style(format!("FAILED (step {}, exit {})", step_index + 1, exit_code))
            .red()
            .to_string(),
    }
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Succeeded => CHECK,
        RunStatus::Failed { .. } => CROSS,
        RunStatus::Running { .. } => SPINNER,
        RunStatus::NotStarted => INFO,
    };

    let failed_at = summary
        .failed_step
        .as_ref()
        .map(|step| format!(" at {}", style(step).red()))
        .unwrap_or_default();

    format!(
        "{} {} - {} - {}{} ({}/{} ok, {} failed, {} skipped) - {}",
        status_icon,
        style(short_id(&summary.execution_id)).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        failed_at,
        summary.succeeded_steps,
        summary.total_steps,
        summary.failed_steps,
        summary.skipped_steps,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            total_steps,
        } => format!(
            "{} Starting pipeline {} ({}, {} steps)",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(execution_id)).dim(),
            total_steps
        ),
        ExecutionEvent::StepStarted {
            step_id,
            index,
            total,
        } => format!(
            "{} [{}/{}] {}",
            SPINNER,
            style(index + 1).cyan(),
            style(total).dim(),
            style(step_id).cyan()
        ),
        ExecutionEvent::StepSucceeded {
            step_id,
            duration_ms,
        } => format!(
            "{} {} {}",
            CHECK,
            style(step_id).green(),
            style(format_duration(Duration::from_millis(*duration_ms))).dim()
        ),
        ExecutionEvent::StepAlreadyExists { step_id, exit_code } => format!(
            "{} {} already exists (exit {}), treated as success",
            RECYCLE,
            style(step_id).cyan(),
            exit_code
        ),
        ExecutionEvent::StepFailed {
            step_id,
            exit_code,
            error,
            policy,
        } => format!(
            "{} {} exited with {} [{}]: {}",
            CROSS,
            style(step_id).red(),
            style(exit_code).red().bold(),
            format_policy(*policy),
            style(error).dim()
        ),
        ExecutionEvent::StepSkipped { step_id, reason } => {
            format!("{} {} ({})", SKIP, style(step_id).dim(), style(reason).dim())
        }
        ExecutionEvent::TeardownStarted { step_id } => {
            format!("{} Tearing down {}", BROOM, style(step_id).cyan())
        }
        ExecutionEvent::TeardownSucceeded { step_id } => {
            format!("{} Teardown of {} done", CHECK, style(step_id).green())
        }
        ExecutionEvent::TeardownFailed {
            step_id,
            exit_code,
            error,
        } => format!(
            "{} Teardown of {} exited with {}: {}",
            WARN,
            style(step_id).yellow(),
            exit_code,
            style(error).dim()
        ),
        ExecutionEvent::PipelineFinished {
            execution_id,
            status,
        } => format!(
            "{} Pipeline ({}) {}",
            INFO,
            style(short_id(execution_id)).dim(),
            format_status(*status)
        ),
    }
}

/// Format one step of a dry-run plan
pub fn format_planned_step(index: usize, total: usize, step: &PlannedStep) -> String {
    let mut lines = vec![format!(
        "[{}/{}] {} [{}]",
        style(index + 1).cyan(),
        style(total).dim(),
        style(&step.name).bold(),
        format_policy(step.policy)
    )];

    match &step.command {
        Ok(command) => lines.push(format!("    $ {}", command)),
        Err(e) => lines.push(format!("    {} {}", CROSS, style(e).red())),
    }

    match &step.teardown {
        Some(Ok(teardown)) => lines.push(format!("    {} {}", style("teardown:").dim(), teardown)),
        Some(Err(e)) => lines.push(format!("    {} teardown: {}", CROSS, style(e).red())),
        None => {}
    }

    lines.join("\n")
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
