//! Test: Config Validation - broken pipelines are rejected at load time

use ci_runner::core::config::{ConfigError, PipelineConfig};

fn load(yaml: &str) -> Result<PipelineConfig, ConfigError> {
    PipelineConfig::from_yaml(yaml)
}

#[test]
fn test_shipped_pipeline_is_valid() {
    let config = load(crate::helpers::COVERAGE_PIPELINE).unwrap();
    assert_eq!(config.name, "coverage");
    assert_eq!(config.steps.len(), 7);
}

#[test]
fn test_rejects_duplicate_ids() {
    let yaml = r#"
name: "dup"
steps:
  - id: tests
    run: pytest
  - id: tests
    run: pytest -x
"#;
    assert!(matches!(load(yaml), Err(ConfigError::DuplicateStepId(id)) if id == "tests"));
}

#[test]
fn test_rejects_forward_reference() {
    let yaml = r#"
name: "forward"
steps:
  - id: report
    run: reporter --exit-code {{ steps.tests.exit_code }}
  - id: tests
    run: pytest
"#;
    assert!(matches!(
        load(yaml),
        Err(ConfigError::ForwardReference { step, target }) if step == "report" && target == "tests"
    ));
}

#[test]
fn test_rejects_unknown_variable() {
    let yaml = r#"
name: "vars"
steps:
  - id: create-db
    run: createdb -U {{ db_user }} ci
"#;
    assert!(matches!(
        load(yaml),
        Err(ConfigError::UnknownVariable { name, .. }) if name == "db_user"
    ));
}

#[test]
fn test_override_satisfies_unknown_variable() {
    let yaml = r#"
name: "vars"
steps:
  - id: create-db
    run: createdb -U {{ db_user }} ci
"#;
    let config = PipelineConfig::parse_yaml(yaml)
        .unwrap()
        .with_overrides(&[("db_user".to_string(), "ci".to_string())]);
    assert!(config.validate().is_ok());
}

#[test]
fn test_rejects_invalid_regex() {
    let yaml = r#"
name: "regex"
steps:
  - id: create-role
    run: psql -c "CREATE ROLE ci"
    exists_pattern: "already (exists"
"#;
    assert!(matches!(
        load(yaml),
        Err(ConfigError::InvalidPattern { step, .. }) if step == "create-role"
    ));
}

#[test]
fn test_dry_run_plan_of_shipped_pipeline() {
    let pipeline = load(crate::helpers::COVERAGE_PIPELINE)
        .unwrap()
        .to_pipeline()
        .unwrap();
    let plan = pipeline.plan();

    assert_eq!(plan.len(), 7);
    let report = plan[6].command.as_deref().unwrap();
    assert!(report.ends_with("--exit-code <steps.run-tests.exit_code>"));
    assert!(plan.iter().all(|step| step.command.is_ok()));
}
