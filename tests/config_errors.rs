// tests/config_errors.rs

use std::io::Write;

use tempfile::NamedTempFile;
use taskgate::config::{Action, Outcome, load_and_validate, load_from_path, task_order};
use taskgate::errors::TaskgateError;
use taskgate::types::SchedulingIntent;
use taskgate_test_utils::builders::{ConditionSpecBuilder, PlanFileBuilder, TaskSpecBuilder};

fn plan_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_plan_parses_with_defaults() {
    let file = plan_file(
        r#"
[engine]
max_concurrency = 2

[condition.online]
after = "probe"
deadline_ms = 500

[condition.blocked]
outcome = "fail"
reason = "maintenance window"

[task.probe]

[task.fetch]
action = "fail"
message = "404"
duration_ms = 10
after = ["probe"]
conditions = ["online"]
exclusive = ["network"]
intent = "initiated"
produce = 2
"#,
    );

    let plan = load_and_validate(file.path()).unwrap();

    assert_eq!(plan.engine.max_concurrency, 2);
    assert!(!plan.engine.cancel_dependents_on_failure);

    let probe = &plan.task["probe"];
    assert_eq!(probe.action, Action::Succeed);
    assert_eq!(probe.intent, SchedulingIntent::None);
    assert!(probe.after.is_empty());

    let fetch = &plan.task["fetch"];
    assert_eq!(fetch.action, Action::Fail);
    assert_eq!(fetch.failure_message("fetch"), "404");
    assert_eq!(fetch.intent, SchedulingIntent::Initiated);
    assert_eq!(fetch.produce, 2);
    assert_eq!(fetch.exclusive, vec!["network".to_string()]);

    assert_eq!(plan.condition["online"].outcome, Outcome::Pass);
    assert_eq!(plan.condition["online"].deadline_ms, Some(500));
    assert_eq!(plan.condition["blocked"].outcome, Outcome::Fail);

    assert_eq!(task_order(&plan), vec!["probe".to_string(), "fetch".to_string()]);

    let options = plan.engine_options(Some(7));
    assert_eq!(options.max_concurrency, 7);
    assert_eq!(plan.engine_options(None).max_concurrency, 2);
}

#[test]
fn test_dag_cycle_returns_structured_error() {
    let file = plan_file(
        r#"
[task.A]
after = ["B"]

[task.B]
after = ["A"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(TaskgateError::DagCycle(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains("A") || msg.contains("B"));
        }
        Err(e) => panic!("Expected DagCycle error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn cycle_through_a_condition_dependency_is_detected() {
    // A needs condition C, and C waits for A.
    let result = PlanFileBuilder::new()
        .with_condition("C", ConditionSpecBuilder::passing().after("A").build())
        .with_task("A", TaskSpecBuilder::new().condition("C").build())
        .try_build();

    match result {
        Err(TaskgateError::DagCycle(msg)) => assert!(msg.contains("cycle detected")),
        other => panic!("Expected DagCycle error, got: {:?}", other),
    }
}

#[test]
fn test_unknown_dependency_returns_unknown_reference() {
    let file = plan_file(
        r#"
[task.A]
after = ["NonExistent"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(TaskgateError::UnknownReference { kind, from, name }) => {
            assert_eq!(kind, "task");
            assert_eq!(from, "A");
            assert_eq!(name, "NonExistent");
        }
        Err(e) => panic!("Expected UnknownReference, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn unknown_condition_is_reported() {
    let result = PlanFileBuilder::new()
        .with_task("A", TaskSpecBuilder::new().condition("missing").build())
        .try_build();

    match result {
        Err(err @ TaskgateError::UnknownReference { .. }) => {
            assert_eq!(
                err.to_string(),
                "Unknown condition referenced by 'A': missing"
            );
        }
        other => panic!("Expected UnknownReference, got: {:?}", other),
    }
}

#[test]
fn condition_after_must_name_a_task() {
    let result = PlanFileBuilder::new()
        .with_condition("C", ConditionSpecBuilder::passing().after("ghost").build())
        .with_task("A", TaskSpecBuilder::new().build())
        .try_build();

    assert!(matches!(
        result,
        Err(TaskgateError::UnknownReference { kind: "task", .. })
    ));
}

#[test]
fn self_dependency_is_a_config_error() {
    let result = PlanFileBuilder::new()
        .with_task("A", TaskSpecBuilder::new().after("A").build())
        .try_build();

    match result {
        Err(TaskgateError::ConfigError(msg)) => assert!(msg.contains("cannot depend on itself")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
fn empty_plan_is_rejected() {
    let file = plan_file("[engine]\nmax_concurrency = 1\n");
    match load_and_validate(file.path()) {
        Err(TaskgateError::ConfigError(msg)) => assert!(msg.contains("at least one")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
fn zero_concurrency_is_rejected() {
    let result = PlanFileBuilder::new()
        .max_concurrency(0)
        .with_task("A", TaskSpecBuilder::new().build())
        .try_build();

    match result {
        Err(TaskgateError::ConfigError(msg)) => assert!(msg.contains("max_concurrency")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
fn unknown_fields_and_bad_values_are_toml_errors() {
    let typo = plan_file("[task.A]\nafterr = []\n");
    assert!(matches!(
        load_from_path(typo.path()),
        Err(TaskgateError::TomlError(_))
    ));

    let bad_intent = plan_file("[task.A]\nintent = \"urgent\"\n");
    assert!(matches!(
        load_from_path(bad_intent.path()),
        Err(TaskgateError::TomlError(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_and_validate(dir.path().join("Taskgate.toml"));
    assert!(matches!(result, Err(TaskgateError::IoError(_))));
}
