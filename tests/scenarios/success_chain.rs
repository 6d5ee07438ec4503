//! Test: Success Chain - every step succeeds

use crate::helpers::*;
use ci_runner::core::StepState;

/// All seven coverage steps succeed: status Succeeded, exit code 0
#[tokio::test]
async fn test_all_steps_succeed() {
    let result = run_scenario(COVERAGE_PIPELINE, MockRunner::new()).await;

    assert_run_succeeded(&result);
    assert_eq!(
        result.execution_order(),
        vec![
            "create-role",
            "create-db",
            "fetch-reporter",
            "chmod-reporter",
            "report-before",
            "run-tests",
            "report-after",
        ]
    );
    for step in &result.pipeline.steps {
        assert_step_succeeded(&result, &step.id);
    }
    assert_eq!(result.pipeline.state.succeeded_steps, 7);
    assert!(result.pipeline.is_complete());
}

/// Variables and builtins are substituted before the shell sees the command
#[tokio::test]
async fn test_commands_are_rendered() {
    let result = run_scenario(COVERAGE_PIPELINE, MockRunner::new()).await;

    assert_eq!(
        result.commands_for("create-role")[0],
        r#"psql -U postgres -c "CREATE ROLE ci LOGIN""#
    );
    assert_eq!(
        result.commands_for("report-after")[0],
        "./cc-test-reporter after-build --coverage-input-type coverage.py --exit-code 0"
    );
}

#[tokio::test]
async fn test_builtin_variables() {
    let yaml = r#"
name: "builtins"
steps:
  - id: tag
    run: echo {{ pipeline_name }}-{{ run_id }}
"#;

    let result = run_scenario(yaml, MockRunner::new()).await;

    assert_run_succeeded(&result);
    let expected = format!("echo builtins-{}", result.outcome.execution_id);
    assert_eq!(result.commands_for("tag"), vec![expected]);
}

/// A step that exits zero records exit code 0 in its state
#[tokio::test]
async fn test_success_state_records_exit_code() {
    let yaml = r#"
name: "single"
steps:
  - id: only
    run: "true"
"#;

    let result = run_scenario(yaml, MockRunner::new()).await;

    match result.step_state("only") {
        StepState::Succeeded {
            exit_code,
            started_at,
            completed_at,
        } => {
            assert_eq!(*exit_code, 0);
            assert!(completed_at >= started_at);
        }
        other => panic!("unexpected state {:?}", other),
    }
}
