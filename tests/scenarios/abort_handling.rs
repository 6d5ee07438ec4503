//! Test: Abort Handling - abort vs continue failure policies

use crate::helpers::*;
use ci_runner::runner::CommandOutput;

/// A failing abort step halts the run; nothing after it executes
#[tokio::test]
async fn test_abort_step_halts_run() {
    let runner = MockRunner::new().output(
        "create-db",
        CommandOutput::exited(2).with_stderr("psql: error: permission denied to create database\n"),
    );

    let result = run_scenario(COVERAGE_PIPELINE, runner).await;

    assert_run_failed_at(&result, "create-db", 2);
    assert_step_succeeded(&result, "create-role");
    assert_step_failed(&result, "create-db", 2);
    for later in [
        "fetch-reporter",
        "chmod-reporter",
        "report-before",
        "run-tests",
        "report-after",
    ] {
        assert_step_skipped(&result, later);
    }
    assert_eq!(result.execution_order(), vec!["create-role", "create-db"]);
    assert_eq!(result.pipeline.state.skipped_steps, 5);
    assert_eq!(result.pipeline.failed_step().map(|s| s.id.as_str()), Some("create-db"));
}

/// A failing continue step is recorded but does not change the status
#[tokio::test]
async fn test_continue_step_failure_is_recorded() {
    let yaml = r#"
name: "continue"
steps:
  - id: lint
    run: flake8
  - id: tests
    run: pytest
    on_failure: abort
"#;
    let runner = MockRunner::new().exits("lint", 1);

    let result = run_scenario(yaml, runner).await;

    assert_run_succeeded(&result);
    assert_step_failed(&result, "lint", 1);
    assert_step_succeeded(&result, "tests");
    assert_eq!(result.pipeline.state.failed_steps, 1);
}

/// The first abort failure decides the exit code; earlier continue failures do not
#[tokio::test]
async fn test_exit_code_comes_from_abort_step() {
    let yaml = r#"
name: "codes"
steps:
  - id: warmup
    run: warmup
  - id: migrate
    run: migrate
    on_failure: abort
  - id: tests
    run: pytest
"#;
    let runner = MockRunner::new().exits("warmup", 9).exits("migrate", 4);

    let result = run_scenario(yaml, runner).await;

    assert_run_failed_at(&result, "migrate", 4);
    assert_step_failed(&result, "warmup", 9);
    assert_step_skipped(&result, "tests");
}

/// A command killed by a signal reports 128 + signal
#[tokio::test]
async fn test_signal_exit_code() {
    let yaml = r#"
name: "signal"
steps:
  - id: tests
    run: pytest
    on_failure: abort
"#;
    let killed = CommandOutput {
        signal: Some(9),
        ..CommandOutput::default()
    };

    let result = run_scenario(yaml, MockRunner::new().output("tests", killed)).await;

    assert_run_failed_at(&result, "tests", 137);
}

/// A command that cannot be spawned reports 127
#[tokio::test]
async fn test_spawn_failure_exit_code() {
    let yaml = r#"
name: "spawn"
steps:
  - id: tests
    run: pytest
    on_failure: abort
"#;
    let runner = MockRunner::new().scripted("tests", Scripted::SpawnFailure);

    let result = run_scenario(yaml, runner).await;

    assert_run_failed_at(&result, "tests", 127);
}
