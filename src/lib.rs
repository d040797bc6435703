// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod plan;
pub mod task;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{PlanFile, load_and_validate, task_order};
use crate::engine::{Engine, RunSummary};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan loading + validation
/// - task construction
/// - engine + queue
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let plan_path = PathBuf::from(&args.plan);
    let plan = load_and_validate(&plan_path)?;

    if args.dry_run {
        print_dry_run(&plan);
        return Ok(());
    }

    let summary = run_plan(&plan, args.max_concurrency).await?;
    print!("{summary}");

    if summary.all_succeeded() {
        Ok(())
    } else {
        let failed: Vec<&str> = summary.failed().map(|r| r.name.as_str()).collect();
        anyhow::bail!("{} task(s) did not succeed: {}", failed.len(), failed.join(", "))
    }
}

/// Build the plan's tasks, hand them to a fresh engine and run it to
/// completion.
pub async fn run_plan(
    plan: &PlanFile,
    max_concurrency: Option<usize>,
) -> crate::errors::Result<RunSummary> {
    let (engine, queue) = Engine::new(plan.engine_options(max_concurrency))?;

    // Ctrl-C → graceful shutdown.
    {
        let queue = queue.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            queue.shutdown();
        });
    }

    let tasks = plan::build_tasks(plan)?;
    info!(tasks = tasks.len(), "handing plan to engine");
    for task in tasks {
        queue.add_task(task);
    }

    engine.run().await
}

/// Simple dry-run output: print tasks in execution order with their wiring.
fn print_dry_run(plan: &PlanFile) {
    println!("taskgate dry-run");
    println!("  engine.max_concurrency = {}", plan.engine.max_concurrency);
    println!(
        "  engine.cancel_dependents_on_failure = {}",
        plan.engine.cancel_dependents_on_failure
    );
    println!();

    println!("tasks ({}):", plan.task.len());
    for name in task_order(plan) {
        let Some(task) = plan.task.get(&name) else {
            continue;
        };
        println!("  - {name}");
        println!("      action: {:?}", task.action);
        println!(
            "      intent: {:?} ({})",
            task.intent,
            task.intent.priority_class()
        );
        if task.duration_ms > 0 {
            println!("      duration_ms: {}", task.duration_ms);
        }
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if !task.conditions.is_empty() {
            println!("      conditions: {:?}", task.conditions);
        }
        if !task.exclusive.is_empty() {
            println!("      exclusive: {:?}", task.exclusive);
        }
        if task.produce > 0 {
            println!("      produce: {}", task.produce);
        }
    }

    if !plan.condition.is_empty() {
        println!();
        println!("conditions ({}):", plan.condition.len());
        for (name, condition) in plan.condition.iter() {
            println!("  - {name}: {:?}", condition.outcome);
            if let Some(ref after) = condition.after {
                println!("      after: {after}");
            }
            if let Some(deadline) = condition.deadline_ms {
                println!("      deadline_ms: {deadline}");
            }
        }
    }

    debug!("dry-run complete (no execution)");
}
