//! Test: Teardown Order - resources are released last-in first-out

use crate::helpers::*;

const DROP_DB: &str = r#"psql -U postgres -c "DROP DATABASE IF EXISTS ci_test""#;
const DROP_ROLE: &str = r#"psql -U postgres -c "DROP ROLE IF EXISTS ci""#;

/// After a successful run, teardowns run in reverse creation order
#[tokio::test]
async fn test_teardown_after_success() {
    let result = run_scenario(COVERAGE_PIPELINE, MockRunner::new()).await;

    assert_run_succeeded(&result);
    assert_eq!(result.teardown_order(), vec!["create-db", "create-role"]);

    let last_two: Vec<_> = result.calls[result.calls.len() - 2..]
        .iter()
        .map(|call| call.command.as_str())
        .collect();
    assert_eq!(last_two, vec![DROP_DB, DROP_ROLE]);
}

/// After an aborted run, only the steps that ran get torn down
#[tokio::test]
async fn test_teardown_after_abort() {
    let runner = MockRunner::new().exits("fetch-reporter", 6);

    let result = run_scenario(COVERAGE_PIPELINE, runner).await;

    assert_run_failed_at(&result, "fetch-reporter", 6);
    assert_eq!(result.teardown_order(), vec!["create-db", "create-role"]);
}

/// A failed provisioning step registers nothing
#[tokio::test]
async fn test_failed_step_registers_no_teardown() {
    let runner = MockRunner::new().exits("create-db", 2);

    let result = run_scenario(COVERAGE_PIPELINE, runner).await;

    assert_eq!(result.teardown_order(), vec!["create-role"]);
}

/// A failing teardown of an abort step fails an otherwise good run
#[tokio::test]
async fn test_teardown_failure_fails_run() {
    let runner = MockRunner::new().command_exits(DROP_DB, 1);

    let result = run_scenario(COVERAGE_PIPELINE, runner).await;

    assert_run_failed_at(&result, "create-db", 1);
    assert!(result.outcome.failed_in_teardown);
    // the command itself succeeded
    assert_step_succeeded(&result, "create-db");
    // the remaining teardown still runs
    assert_eq!(result.teardown_order(), vec!["create-db", "create-role"]);
}

/// A failing teardown of a continue step is only reported
#[tokio::test]
async fn test_continue_teardown_failure_is_reported() {
    let yaml = r#"
name: "scratch"
steps:
  - id: scratch-dir
    run: mkdir -p /tmp/ci-scratch
    teardown: rm -rf /tmp/ci-scratch
"#;
    let runner = MockRunner::new().command_exits("rm -rf /tmp/ci-scratch", 1);

    let result = run_scenario(yaml, runner).await;

    assert_run_succeeded(&result);
    assert!(result.events.iter().any(|event| matches!(
        event,
        ci_runner::execution::ExecutionEvent::TeardownFailed { step_id, .. } if step_id == "scratch-dir"
    )));
}

/// A teardown failure never replaces the exit code of an aborted run
#[tokio::test]
async fn test_abort_code_wins_over_teardown_failure() {
    let runner = MockRunner::new()
        .exits("run-tests", 1)
        .exits("report-after", 3)
        .command_exits(DROP_ROLE, 1);

    let result = run_scenario(COVERAGE_PIPELINE, runner).await;

    assert_run_failed_at(&result, "report-after", 3);
    assert!(!result.outcome.failed_in_teardown);
}

/// Teardowns can reference results of the step they belong to
#[tokio::test]
async fn test_teardown_sees_own_result() {
    let yaml = r#"
name: "container"
steps:
  - id: start-db
    run: docker run -d postgres
    on_failure: abort
    teardown: docker rm -f {{ steps.start-db.stdout }}
"#;
    let runner = MockRunner::new().output(
        "start-db",
        ci_runner::runner::CommandOutput::exited(0).with_stdout("c0ffee\n"),
    );

    let result = run_scenario(yaml, runner).await;

    assert_eq!(
        result.commands_for("start-db"),
        vec!["docker run -d postgres", "docker rm -f c0ffee"]
    );
}
