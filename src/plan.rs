// src/plan.rs

//! Turning a validated [`PlanFile`] into wired [`Task`]s.
//!
//! Plan tasks simulate work: they sleep for `duration_ms` (polling for
//! cancellation), emit `produce` children, then succeed or fail. Plan
//! conditions pass, fail, or time out against a deadline measured from when
//! the plan was built.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::{Action, ConditionSpec, Outcome, PlanFile, TaskSpec, task_order};
use crate::errors::{Result, TaskgateError};
use crate::task::{Condition, Task, TaskError, Work};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Build every plan task, in dependency order, with dependencies, conditions,
/// exclusivity categories and scheduling intent wired up.
pub fn build_tasks(plan: &PlanFile) -> Result<Vec<Task>> {
    let started = Instant::now();
    let mut tasks: HashMap<String, Task> = HashMap::new();
    let mut conditions: HashMap<String, Arc<dyn Condition>> = HashMap::new();
    let mut ordered = Vec::with_capacity(plan.task.len());

    for name in task_order(plan) {
        let spec = plan
            .task
            .get(&name)
            .ok_or_else(|| TaskgateError::ConfigError(format!("no task named '{name}'")))?;

        let task = build_task(&name, spec);

        for dep in &spec.after {
            let dep_task = lookup(&tasks, "task", &name, dep)?;
            task.add_dependency(dep_task);
        }

        for condition_name in &spec.conditions {
            let condition = match conditions.get(condition_name) {
                Some(existing) => Arc::clone(existing),
                None => {
                    let condition_spec = plan.condition.get(condition_name).ok_or_else(|| {
                        TaskgateError::UnknownReference {
                            kind: "condition",
                            from: name.clone(),
                            name: condition_name.clone(),
                        }
                    })?;
                    let dependency = match &condition_spec.after {
                        Some(dep) => Some(lookup(&tasks, "task", condition_name, dep)?.clone()),
                        None => None,
                    };
                    let built: Arc<dyn Condition> = Arc::new(PlanCondition::new(
                        condition_name,
                        condition_spec,
                        dependency,
                        started,
                    ));
                    conditions.insert(condition_name.clone(), Arc::clone(&built));
                    built
                }
            };
            task.add_shared_condition(condition);
        }

        debug!(
            task = %name,
            after = spec.after.len(),
            conditions = spec.conditions.len(),
            "plan task built"
        );

        tasks.insert(name, task.clone());
        ordered.push(task);
    }

    info!(tasks = ordered.len(), conditions = conditions.len(), "plan built");
    Ok(ordered)
}

fn lookup<'a>(
    tasks: &'a HashMap<String, Task>,
    kind: &'static str,
    from: &str,
    name: &str,
) -> Result<&'a Task> {
    tasks.get(name).ok_or_else(|| TaskgateError::UnknownReference {
        kind,
        from: from.to_string(),
        name: name.to_string(),
    })
}

fn build_task(name: &str, spec: &TaskSpec) -> Task {
    let mut builder = Task::builder(name)
        .work(PlanWork::new(name, spec))
        .intent(spec.intent);
    for category in &spec.exclusive {
        builder = builder.exclusive(category.clone());
    }
    builder.build()
}

/// Work body of a plan task.
#[derive(Debug, Clone)]
pub struct PlanWork {
    duration: Duration,
    action: Action,
    message: String,
    produce: usize,
}

impl PlanWork {
    pub fn new(name: &str, spec: &TaskSpec) -> Self {
        Self {
            duration: Duration::from_millis(spec.duration_ms),
            action: spec.action,
            message: spec.failure_message(name),
            produce: spec.produce,
        }
    }
}

impl Work for PlanWork {
    fn execute(&self, task: &Task) {
        let until = Instant::now() + self.duration;
        loop {
            // An executing task is finished by `cancel` itself.
            if task.is_cancelled() {
                debug!(task = %task.name(), "plan work observed cancellation");
                return;
            }
            let now = Instant::now();
            if now >= until {
                break;
            }
            thread::sleep(POLL_INTERVAL.min(until - now));
        }

        for n in 1..=self.produce {
            let child = Task::builder(format!("{}/child-{n}", task.name()))
                .intent(task.scheduling_intent())
                .build();
            task.produce_task(&child);
        }

        match self.action {
            Action::Succeed => task.finish(Vec::new()),
            Action::Fail => task.finish_with_error(Some(TaskError::failed(self.message.clone()))),
        }
    }
}

/// Condition declared in a plan.
#[derive(Debug, Clone)]
pub struct PlanCondition {
    name: String,
    outcome: Outcome,
    reason: String,
    dependency: Option<Task>,
    deadline: Option<Duration>,
    started: Instant,
}

impl PlanCondition {
    pub fn new(
        name: &str,
        spec: &ConditionSpec,
        dependency: Option<Task>,
        started: Instant,
    ) -> Self {
        Self {
            name: name.to_string(),
            outcome: spec.outcome,
            reason: spec
                .reason
                .clone()
                .unwrap_or_else(|| "condition not met".to_string()),
            dependency,
            deadline: spec.deadline_ms.map(Duration::from_millis),
            started,
        }
    }
}

impl Condition for PlanCondition {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependency(&self, _task: &Task) -> Option<Task> {
        self.dependency.clone()
    }

    fn evaluate(&self, _task: &Task) -> std::result::Result<(), Vec<TaskError>> {
        let elapsed = self.started.elapsed();
        if let Some(deadline) = self.deadline {
            if elapsed > deadline {
                return Err(vec![TaskError::TimedOut { elapsed }]);
            }
        }

        match self.outcome {
            Outcome::Pass => Ok(()),
            Outcome::Fail => Err(vec![TaskError::condition_failed(
                &self.name,
                &self.reason,
            )]),
        }
    }
}
