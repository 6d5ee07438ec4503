//! Test: Status Forwarding - capture a step's exit code, forward it later

use crate::helpers::*;
use ci_runner::runner::CommandOutput;

/// The coverage scenario: tests fail with 1, the reporter is told 1 and
/// its own exit code becomes the process exit code
#[tokio::test]
async fn test_reporter_receives_test_exit_code() {
    let runner = MockRunner::new().exits("run-tests", 1);

    let result = run_scenario(COVERAGE_PIPELINE, runner).await;

    assert_step_failed(&result, "run-tests", 1);
    assert_eq!(
        result.commands_for("report-after"),
        vec!["./cc-test-reporter after-build --coverage-input-type coverage.py --exit-code 1"]
    );
    // report-after itself exited 0
    assert_run_succeeded(&result);
}

/// The process exit code is whatever the reporter returns
#[tokio::test]
async fn test_process_exit_code_is_reporter_code() {
    let runner = MockRunner::new().exits("run-tests", 1).exits("report-after", 3);

    let result = run_scenario(COVERAGE_PIPELINE, runner).await;

    assert!(result.commands_for("report-after")[0].ends_with("--exit-code 1"));
    assert_run_failed_at(&result, "report-after", 3);
}

/// A step between the test run and the report does not disturb the
/// forwarded code: there is no ambient "last status"
#[tokio::test]
async fn test_intermediate_step_does_not_change_forwarded_code() {
    let yaml = r#"
name: "forwarding"
steps:
  - id: tests
    run: pytest
  - id: collect
    run: coverage xml
  - id: cleanup
    run: rm -rf .pytest_cache
  - id: report
    run: reporter --exit-code {{ steps.tests.exit_code }} --xml-status {{steps.collect.exit_code}}
    on_failure: abort
"#;
    let runner = MockRunner::new()
        .exits("tests", 2)
        .exits("collect", 5)
        .exits("cleanup", 0);

    let result = run_scenario(yaml, runner).await;

    assert_eq!(
        result.commands_for("report"),
        vec!["reporter --exit-code 2 --xml-status 5"]
    );
    assert_run_succeeded(&result);
}

/// stdout of an earlier step can be forwarded too (trailing newline trimmed)
#[tokio::test]
async fn test_stdout_is_forwarded() {
    let yaml = r#"
name: "stdout"
steps:
  - id: version
    run: git rev-parse HEAD
  - id: report
    run: reporter --commit {{ steps.version.stdout }}
"#;
    let runner = MockRunner::new().output(
        "version",
        CommandOutput::exited(0).with_stdout("4f2a9c1\n"),
    );

    let result = run_scenario(yaml, runner).await;

    assert_eq!(result.commands_for("report"), vec!["reporter --commit 4f2a9c1"]);
}

/// A timed-out step forwards 124
#[tokio::test]
async fn test_timeout_is_forwarded_as_124() {
    let yaml = r#"
name: "timeout"
steps:
  - id: tests
    run: pytest
    timeout_secs: 60
  - id: report
    run: reporter --exit-code {{ steps.tests.exit_code }}
"#;
    let runner = MockRunner::new().scripted("tests", Scripted::Timeout(60));

    let result = run_scenario(yaml, runner).await;

    assert_step_failed(&result, "tests", 124);
    assert_eq!(result.commands_for("report"), vec!["reporter --exit-code 124"]);
}
