use anyhow::{Context, Result};
use ci_runner::cli::commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use ci_runner::cli::output::*;
use ci_runner::cli::terminal_output::TerminalOutputSink;
use ci_runner::cli::{Cli, Command};
use ci_runner::core::config::PipelineConfig;
use ci_runner::core::{Pipeline, RunStatus};
use ci_runner::execution::{ExecutionEngine, ExecutionEvent, RunOutcome};
use ci_runner::persistence::{create_summary, ExecutionSummary, PersistenceBackend};
use ci_runner::runner::ShellRunner;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    let exit_code = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, cli.stream).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::List(cmd) => list_pipelines(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}

/// Open the history store configured for this build
#[cfg(feature = "sqlite")]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    let store = ci_runner::persistence::SqliteExecutionStore::with_default_path().await?;
    Ok(Arc::new(store))
}

/// Without SQLite, history only lives as long as the process
#[cfg(not(feature = "sqlite"))]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    Ok(Arc::new(ci_runner::persistence::InMemoryPersistence::new()))
}

async fn run_pipeline(cmd: &RunCommand, stream: bool) -> Result<i32> {
    // Load pipeline config; --var overrides take part in validation
    let config = PipelineConfig::from_file_with_overrides(&cmd.file, &cmd.variable)
        .context("Failed to load pipeline config")?;

    println!("{} Loaded pipeline: {}", INFO, style(&config.name).bold());

    for (key, value) in &cmd.variable {
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let mut pipeline = config
        .to_pipeline()
        .context("Failed to prepare pipeline")?;

    if cmd.fail_fast {
        pipeline = pipeline.with_fail_fast();
        println!("{} Fail-fast: every step aborts the run on failure", WARN);
    }

    if cmd.dry_run {
        print_plan(&pipeline);
        return Ok(0);
    }

    // History is best-effort; a broken store never blocks a run
    let store: Option<Arc<dyn PersistenceBackend>> = if cmd.no_history {
        None
    } else {
        match open_store().await {
            Ok(store) => Some(store),
            Err(e) => {
                warn!("Execution history unavailable: {:#}", e);
                None
            }
        }
    };

    let terminal = Arc::new(TerminalOutputSink::new());
    let mut engine = ExecutionEngine::new(ShellRunner::new());
    if stream {
        engine = engine.with_output_sink(terminal.clone());
    }

    let spinner = if stream {
        indicatif::ProgressBar::hidden()
    } else {
        create_spinner()
    };

    // Set up event handler for console output
    let progress = spinner.clone();
    engine
        .add_event_handler(move |event| {
            match &event {
                ExecutionEvent::StepStarted {
                    step_id,
                    index,
                    total,
                } if stream => {
                    terminal.print_step_header(index + 1, *total, step_id);
                    return;
                }
                ExecutionEvent::StepStarted { step_id, .. } => {
                    progress.set_message(step_id.clone());
                }
                _ => {}
            }

            let line = format_execution_event(&event);
            if progress.is_hidden() {
                println!("{}", line);
            } else {
                progress.println(line);
            }

            if let ExecutionEvent::PipelineFinished { .. } = event {
                progress.finish_and_clear();
            }
        })
        .await;

    // Execute pipeline
    println!();
    let outcome = engine.execute(&mut pipeline).await?;
    spinner.finish_and_clear();

    print_step_report(&pipeline, &outcome);

    // Save to history
    if let Some(store) = store {
        let summary = create_summary(&pipeline);
        match store.save_execution(&summary).await {
            Ok(()) => println!(
                "\n{} Execution saved to history (ID: {})",
                INFO,
                style(&summary.execution_id.to_string()[..8]).dim()
            ),
            Err(e) => warn!("Failed to save execution history: {:#}", e),
        }
    }

    // Print final status
    match outcome.status {
        RunStatus::Failed {
            step_index,
            exit_code,
        } => {
            let step_id = pipeline
                .steps
                .get(step_index)
                .map(|s| s.id.as_str())
                .unwrap_or("?");
            let place = if outcome.failed_in_teardown {
                "in the teardown of"
            } else {
                "at"
            };
            println!(
                "\n{} {} {} {} {} (exit code {})",
                CROSS,
                style(&pipeline.name).bold(),
                style("failed").red(),
                place,
                style(step_id).red(),
                exit_code
            );
            error!("Pipeline {} failed {} step {}", pipeline.name, place, step_id);
        }
        _ => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&pipeline.name).bold(),
                style("successfully").green()
            );
        }
    }

    Ok(outcome.exit_code)
}

/// Print what a run would execute, without running it
fn print_plan(pipeline: &Pipeline) {
    println!(
        "\n{} Dry run of {} ({} steps, shell: {})\n",
        INFO,
        style(&pipeline.name).bold(),
        pipeline.steps.len(),
        style(&pipeline.shell).cyan()
    );

    let plan = pipeline.plan();
    let total = plan.len();
    for (index, step) in plan.iter().enumerate() {
        println!("{}", format_planned_step(index, total, step));
    }
}

/// Print the final state of every step
fn print_step_report(pipeline: &Pipeline, outcome: &RunOutcome) {
    let teardown_failed_at = match outcome.status {
        RunStatus::Failed { step_index, .. } if outcome.failed_in_teardown => Some(step_index),
        _ => None,
    };

    println!("\n{}", style("Steps:").bold());
    for (index, step) in pipeline.steps.iter().enumerate() {
        let teardown_note = if teardown_failed_at == Some(index) {
            format!(" {}", style("(teardown failed)").red())
        } else {
            String::new()
        };
        println!(
            "  {:<24} {}{}",
            step.id,
            format_step_state(&step.state),
            teardown_note
        );
    }
    println!(
        "  {} succeeded, {} failed, {} skipped",
        style(pipeline.state.succeeded_steps).green(),
        style(pipeline.state.failed_steps).red(),
        style(pipeline.state.skipped_steps).dim()
    );
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<i32> {
    println!("{} Validating pipeline...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Steps: {}", style(config.steps.len()).cyan());
            println!("  Variables: {}", style(config.variables.len()).cyan());
            for step in &config.steps {
                let policy = step.on_failure.or(config.defaults.on_failure).unwrap_or_default();
                println!(
                    "    {} {} [{}]{}",
                    style("-").dim(),
                    style(step.display_name()).bold(),
                    style(format!("{:?}", policy).to_lowercase()).dim(),
                    if step.teardown.is_some() { " (teardown)" } else { "" }
                );
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(0)
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            Ok(1)
        }
    }
}

async fn list_pipelines(cmd: &ListCommand) -> Result<i32> {
    let store = open_store().await?;
    let pipelines = store.list_pipelines().await?;

    if cmd.json {
        let mut json_data = Vec::new();
        for pipeline in &pipelines {
            let executions = store.list_executions(pipeline).await?;
            json_data.push(serde_json::json!({
                "name": pipeline,
                "execution_count": executions.len(),
                "succeeded": executions.iter().filter(|e| e.status == RunStatus::Succeeded).count(),
            }));
        }
        let data = serde_json::json!({ "pipelines": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(0);
    }

    if pipelines.is_empty() {
        println!("{} No pipelines found in history", INFO);
        return Ok(0);
    }

    println!("{} Pipelines in history:", INFO);

    for pipeline_name in &pipelines {
        if cmd.with_counts {
            let executions = store.list_executions(pipeline_name).await?;
            let succeeded = executions
                .iter()
                .filter(|e| e.status == RunStatus::Succeeded)
                .count();
            let failed = executions
                .iter()
                .filter(|e| matches!(e.status, RunStatus::Failed { .. }))
                .count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(pipeline_name).bold(),
                style(executions.len()).cyan(),
                style(succeeded).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(pipeline_name).bold());
        }
    }

    Ok(0)
}

async fn show_history(cmd: &HistoryCommand) -> Result<i32> {
    let store = open_store().await?;

    // If specific execution ID is requested
    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;

        return match store.load_execution(exec_id).await? {
            Some(summary) => {
                print_execution_details(&summary, cmd.details || cmd.json)?;
                Ok(0)
            }
            None => {
                println!("{} Execution not found", WARN);
                Ok(1)
            }
        };
    }

    // List executions for pipeline or all
    let mut executions = if let Some(pipeline_name) = &cmd.pipeline {
        store.list_executions(pipeline_name).await?
    } else {
        let mut all_execs = Vec::new();
        for pipeline in store.list_pipelines().await? {
            all_execs.extend(store.list_executions(&pipeline).await?);
        }
        all_execs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all_execs
    };
    executions.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(0);
    }

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(0);
    }

    println!("{} Execution history (showing latest {}):", INFO, executions.len());
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
    }

    Ok(0)
}

fn print_execution_details(summary: &ExecutionSummary, details: bool) -> Result<()> {
    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_status(summary.status));
    if let Some(step) = &summary.failed_step {
        println!("  Failed step: {}", style(step).red());
    }
    if let Some(code) = summary.exit_code {
        println!("  Exit code: {}", style(code).bold());
    }
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
    }
    if let Some(duration) = summary.duration().and_then(|d| d.to_std().ok()) {
        println!("  Duration: {}", style(format_duration(duration)).dim());
    }
    println!(
        "  Steps: {} total, {} succeeded, {} failed, {} skipped",
        summary.total_steps,
        style(summary.succeeded_steps).green(),
        style(summary.failed_steps).red(),
        style(summary.skipped_steps).dim()
    );

    if details {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
