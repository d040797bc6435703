// tests/plan_runs.rs

use std::error::Error;
use std::time::{Duration, Instant};

use taskgate::plan::build_tasks;
use taskgate::run_plan;
use taskgate::task::TaskError;
use taskgate::types::{PriorityClass, SchedulingIntent};
use taskgate_test_utils::builders::{ConditionSpecBuilder, PlanFileBuilder, TaskSpecBuilder};
use taskgate_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn built_tasks_carry_plan_wiring() -> TestResult {
    let plan = PlanFileBuilder::new()
        .with_condition("ready", ConditionSpecBuilder::passing().after("probe").build())
        .with_task("probe", TaskSpecBuilder::new().build())
        .with_task("setup", TaskSpecBuilder::new().build())
        .with_task(
            "deploy",
            TaskSpecBuilder::new()
                .after("setup")
                .condition("ready")
                .exclusive("prod")
                .intent(SchedulingIntent::Initiated)
                .build(),
        )
        .build();

    let tasks = build_tasks(&plan)?;
    let names: Vec<&str> = tasks.iter().map(|t| t.name()).collect();
    assert_eq!(names.len(), 3);
    assert_eq!(names.last(), Some(&"deploy"));

    let deploy = tasks.iter().find(|t| t.name() == "deploy").ok_or("deploy")?;
    let deps: Vec<String> = deploy
        .dependencies()
        .iter()
        .map(|t| t.name().to_string())
        .collect();
    assert_eq!(deps, vec!["setup".to_string(), "probe".to_string()]);
    assert_eq!(deploy.direct_dependencies().len(), 1);
    assert!(deploy.has_conditions());
    assert_eq!(deploy.exclusivity_categories(), ["prod".to_string()]);
    assert_eq!(deploy.scheduling_intent(), SchedulingIntent::Initiated);
    Ok(())
}

#[tokio::test]
async fn successful_plan_runs_every_task() -> TestResult {
    init_tracing();

    let plan = PlanFileBuilder::new()
        .with_condition("ready", ConditionSpecBuilder::passing().after("probe").build())
        .with_task("probe", TaskSpecBuilder::new().duration_ms(5).build())
        .with_task(
            "build",
            TaskSpecBuilder::new()
                .after("probe")
                .condition("ready")
                .produce(2)
                .intent(SchedulingIntent::SideEffect)
                .build(),
        )
        .build();

    let summary = with_timeout(run_plan(&plan, None)).await?;

    assert!(summary.all_succeeded(), "{summary}");
    assert!(summary.position("probe") < summary.position("build"));
    assert!(summary.get("build/child-1").is_some());
    assert!(summary.get("build/child-2").is_some());
    assert_eq!(
        summary.get("build/child-1").map(|r| r.priority),
        Some(PriorityClass::Utility)
    );
    Ok(())
}

#[tokio::test]
async fn failing_condition_cancels_the_gated_task() -> TestResult {
    init_tracing();

    let plan = PlanFileBuilder::new()
        .with_condition("window", ConditionSpecBuilder::failing("maintenance").build())
        .with_task("migrate", TaskSpecBuilder::new().condition("window").build())
        .build();

    let summary = with_timeout(run_plan(&plan, Some(1))).await?;

    let report = summary.get("migrate").ok_or("no report")?;
    assert!(report.cancelled);
    assert_eq!(
        report.errors,
        vec![TaskError::condition_failed("window", "maintenance")]
    );
    Ok(())
}

#[tokio::test]
async fn condition_past_its_deadline_times_out() -> TestResult {
    init_tracing();

    let plan = PlanFileBuilder::new()
        .with_condition(
            "fresh",
            ConditionSpecBuilder::passing()
                .after("slow")
                .deadline_ms(10)
                .build(),
        )
        .with_task("slow", TaskSpecBuilder::new().duration_ms(60).build())
        .with_task("consume", TaskSpecBuilder::new().condition("fresh").build())
        .build();

    let summary = with_timeout(run_plan(&plan, None)).await?;

    let report = summary.get("consume").ok_or("no report")?;
    assert!(report.cancelled);
    assert!(matches!(
        report.errors.as_slice(),
        [TaskError::TimedOut { elapsed }] if elapsed.as_millis() >= 10
    ));
    Ok(())
}

#[tokio::test]
async fn failing_task_cascades_when_configured() -> TestResult {
    init_tracing();

    let plan = PlanFileBuilder::new()
        .cancel_dependents_on_failure(true)
        .with_task("compile", TaskSpecBuilder::new().fail("syntax error").build())
        .with_task("test", TaskSpecBuilder::new().after("compile").build())
        .with_task("package", TaskSpecBuilder::new().after("test").build())
        .build();

    let summary = with_timeout(run_plan(&plan, None)).await?;

    assert_eq!(
        summary.get("compile").map(|r| r.errors.clone()),
        Some(vec![TaskError::failed("syntax error")])
    );
    assert!(summary.get("test").is_some_and(|r| r.cancelled));
    assert!(summary.get("package").is_some_and(|r| r.cancelled));
    assert_eq!(summary.succeeded().count(), 0);
    Ok(())
}

#[tokio::test]
async fn exclusive_plan_tasks_run_in_sequence() -> TestResult {
    init_tracing();

    let plan = PlanFileBuilder::new()
        .max_concurrency(4)
        .with_task("a", TaskSpecBuilder::new().exclusive("db").duration_ms(15).build())
        .with_task("b", TaskSpecBuilder::new().exclusive("db").duration_ms(15).build())
        .build();

    let started = Instant::now();
    let summary = with_timeout(run_plan(&plan, None)).await?;

    assert!(summary.all_succeeded());
    assert_eq!(summary.reports.len(), 2);
    assert!(started.elapsed() >= Duration::from_millis(30));
    Ok(())
}
