//! Test: Idempotence - re-running against resources that already exist

use crate::helpers::*;
use ci_runner::execution::ExecutionEvent;
use ci_runner::runner::CommandOutput;

fn role_exists() -> CommandOutput {
    CommandOutput::exited(1).with_stderr("ERROR:  role \"ci\" already exists\n")
}

fn database_exists() -> CommandOutput {
    CommandOutput::exited(1).with_stderr("ERROR:  database \"ci_test\" already exists\n")
}

/// Second run: both provisioning steps find their resource and succeed
#[tokio::test]
async fn test_existing_resources_succeed() {
    let runner = MockRunner::new()
        .output("create-role", role_exists())
        .output("create-db", database_exists());

    let result = run_scenario(COVERAGE_PIPELINE, runner).await;

    assert_run_succeeded(&result);
    assert_step_already_exists(&result, "create-role");
    assert_step_already_exists(&result, "create-db");
    assert_eq!(result.pipeline.state.succeeded_steps, 7);

    assert!(result.events.iter().any(|event| matches!(
        event,
        ExecutionEvent::StepAlreadyExists { step_id, exit_code: 1 } if step_id == "create-role"
    )));
}

/// Resources the run did not create are not torn down
#[tokio::test]
async fn test_existing_resources_are_not_torn_down() {
    let runner = MockRunner::new().output("create-role", role_exists());

    let result = run_scenario(COVERAGE_PIPELINE, runner).await;

    assert_eq!(result.teardown_order(), vec!["create-db"]);
    assert_eq!(result.commands_for("create-role").len(), 1);
}

/// Without `exists_pattern` the step fails with its own code and stderr
#[tokio::test]
async fn test_without_pattern_failure_is_attributed() {
    let yaml = r#"
name: "no-pattern"
variables:
  db_user: postgres
steps:
  - id: create-role
    run: psql -U {{ db_user }} -c "CREATE ROLE ci"
    on_failure: abort
  - id: tests
    run: pytest
"#;
    let runner = MockRunner::new().output("create-role", role_exists());

    let result = run_scenario(yaml, runner).await;

    assert_run_failed_at(&result, "create-role", 1);
    assert_step_skipped(&result, "tests");
    match result.step_state("create-role") {
        ci_runner::core::StepState::Failed { error, .. } => {
            assert!(error.contains("already exists"), "error was: {}", error)
        }
        other => panic!("unexpected state {:?}", other),
    }
}

/// Output that does not match the pattern is still a failure
#[tokio::test]
async fn test_unrelated_failure_is_not_masked() {
    let runner = MockRunner::new().output(
        "create-role",
        CommandOutput::exited(2).with_stderr("psql: error: connection refused\n"),
    );

    let result = run_scenario(COVERAGE_PIPELINE, runner).await;

    assert_run_failed_at(&result, "create-role", 2);
    assert!(result.teardown_order().is_empty());
}
