// tests/property_engine.rs

use std::collections::BTreeSet;

use proptest::prelude::*;
use taskgate::engine::{Engine, EngineOptions};
use taskgate::task::{Task, TaskError};
use taskgate_test_utils::{Phase, RecordingObserver};

/// Random DAG: task `i` may only depend on tasks `0..i`, which keeps it
/// acyclic. Each entry is (dependencies, fails).
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<(BTreeSet<usize>, bool)>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            (
                proptest::collection::vec(any::<usize>(), 0..num_tasks),
                proptest::bool::weighted(0.2),
            ),
            num_tasks,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (potential, fails))| {
                    let deps = if i == 0 {
                        BTreeSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    };
                    (deps, fails)
                })
                .collect()
        })
    })
}

fn build(dag: &[(BTreeSet<usize>, bool)], recorder: &RecordingObserver) -> Vec<Task> {
    let mut tasks: Vec<Task> = Vec::with_capacity(dag.len());
    for (i, (deps, fails)) in dag.iter().enumerate() {
        let fails = *fails;
        let task = Task::builder(format!("task_{i}"))
            .work_fn(move |task: &Task| {
                if fails {
                    task.finish_with_error(Some(TaskError::failed("injected")));
                } else {
                    task.finish(Vec::new());
                }
            })
            .build();
        for &dep in deps {
            task.add_dependency(&tasks[dep]);
        }
        task.add_observer(recorder.clone());
        tasks.push(task);
    }
    tasks
}

fn index_of(
    entries: &[(String, Phase)],
    name: &str,
    is_phase: impl Fn(&Phase) -> bool,
) -> Option<usize> {
    entries
        .iter()
        .position(|(task, phase)| task == name && is_phase(phase))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_task_finishes_once_and_after_its_dependencies(
        dag in dag_strategy(10),
        reverse in any::<bool>(),
        cascade in any::<bool>(),
        max_concurrency in 1..4usize,
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let recorder = RecordingObserver::new();
        let tasks = build(&dag, &recorder);

        let summary = runtime.block_on(async {
            let (engine, queue) = Engine::new(EngineOptions {
                max_concurrency,
                cancel_dependents_on_failure: cascade,
            })?;
            let mut order: Vec<Task> = tasks.clone();
            if reverse {
                order.reverse();
            }
            for task in order {
                queue.add_task(task);
            }
            tokio::time::timeout(std::time::Duration::from_secs(10), engine.run())
                .await
                .map_err(|e| taskgate::errors::TaskgateError::Runtime(e.to_string()))?
        }).unwrap();

        prop_assert_eq!(summary.reports.len(), tasks.len());

        let entries = recorder.entries();
        for (i, task) in tasks.iter().enumerate() {
            prop_assert!(task.is_finished());

            let name = task.name();
            let finishes = entries
                .iter()
                .filter(|(t, p)| t == name && matches!(p, Phase::DidFinish(_)))
                .count();
            prop_assert_eq!(finishes, 1);

            let executed = index_of(&entries, name, |p| matches!(p, Phase::WillExecute(_)));
            for &dep in &dag[i].0 {
                let dep_task = &tasks[dep];
                if let Some(executed) = executed {
                    let dep_finishing = index_of(&entries, dep_task.name(), |p| {
                        matches!(p, Phase::WillFinish(_))
                    });
                    prop_assert!(dep_finishing.is_some_and(|f| f < executed));
                }
                if cascade && !dep_task.errors().is_empty() {
                    prop_assert!(task.is_cancelled());
                    prop_assert!(executed.is_none());
                }
            }
        }
    }
}
