//! Test: Fetch Failure - best-effort vs hardened handling of a failed download

use crate::helpers::*;
use ci_runner::core::config::PipelineConfig;
use ci_runner::core::FailurePolicy;
use ci_runner::execution::ExecutionEvent;
use ci_runner::runner::CommandOutput;

fn curl_failure() -> CommandOutput {
    CommandOutput::exited(6).with_stderr("curl: (6) Could not resolve host: codeclimate.com\n")
}

/// With every step on `continue` (the unchecked chaining of a plain shell
/// script) the failed download is recorded and the run goes on
#[tokio::test]
async fn test_best_effort_fetch_failure_continues() {
    let mut pipeline = PipelineConfig::from_yaml(COVERAGE_PIPELINE)
        .unwrap()
        .to_pipeline()
        .unwrap();
    pipeline.steps = pipeline
        .steps
        .into_iter()
        .map(|step| step.with_policy(FailurePolicy::Continue))
        .collect();
    let runner = MockRunner::new()
        .output("fetch-reporter", curl_failure())
        .exits("chmod-reporter", 1)
        .exits("report-before", 127);

    let result = run_pipeline(pipeline, runner).await;

    assert_run_succeeded(&result);
    assert_step_failed(&result, "fetch-reporter", 6);
    assert_step_failed(&result, "chmod-reporter", 1);
    assert_eq!(result.execution_order().len(), 7);
}

/// With the shipped policies the fetch step aborts the run
#[tokio::test]
async fn test_fetch_failure_aborts_with_shipped_policy() {
    let runner = MockRunner::new().output("fetch-reporter", curl_failure());

    let result = run_scenario(COVERAGE_PIPELINE, runner).await;

    assert_run_failed_at(&result, "fetch-reporter", 6);
    assert_step_skipped(&result, "chmod-reporter");
    assert_step_skipped(&result, "run-tests");
    assert_step_skipped(&result, "report-after");
}

/// `--fail-fast` turns any failure, even a `continue` step's, into an abort
#[tokio::test]
async fn test_fail_fast_aborts_on_continue_step() {
    let runner = MockRunner::new().exits("report-before", 1);

    let result = run_scenario_fail_fast(COVERAGE_PIPELINE, runner).await;

    assert_run_failed_at(&result, "report-before", 1);
    assert_step_skipped(&result, "run-tests");
    assert_step_skipped(&result, "report-after");
}

/// The failure event attributes the error to the fetch step
#[tokio::test]
async fn test_failure_event_is_attributed() {
    let runner = MockRunner::new().output("fetch-reporter", curl_failure());

    let result = run_scenario_fail_fast(COVERAGE_PIPELINE, runner).await;

    let failure = result
        .events
        .iter()
        .find_map(|event| match event {
            ExecutionEvent::StepFailed {
                step_id,
                exit_code,
                error,
                policy,
            } => Some((step_id.clone(), *exit_code, error.clone(), *policy)),
            _ => None,
        })
        .expect("a StepFailed event");

    assert_eq!(failure.0, "fetch-reporter");
    assert_eq!(failure.1, 6);
    assert!(failure.2.contains("Could not resolve host"));
    assert_eq!(failure.3, FailurePolicy::Abort);
}
