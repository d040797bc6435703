// src/config/validate.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConditionSpec, PlanFile, RawPlanFile, TaskSpec};
use crate::errors::{Result, TaskgateError};

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = TaskgateError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_plan(&raw)?;
        Ok(PlanFile::new_unchecked(raw.engine, raw.condition, raw.task))
    }
}

/// Node of the combined plan graph. Tasks and conditions live in separate
/// namespaces, so a task and a condition may share a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Node<'a> {
    Task(&'a str),
    Condition(&'a str),
}

fn validate_raw_plan(plan: &RawPlanFile) -> Result<()> {
    ensure_has_tasks(plan)?;
    validate_engine_section(plan)?;
    validate_task_references(plan)?;
    validate_condition_references(plan)?;
    plan_order(&plan.condition, &plan.task)?;
    Ok(())
}

fn ensure_has_tasks(plan: &RawPlanFile) -> Result<()> {
    if plan.task.is_empty() {
        return Err(TaskgateError::ConfigError(
            "plan must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine_section(plan: &RawPlanFile) -> Result<()> {
    if plan.engine.max_concurrency == 0 {
        return Err(TaskgateError::ConfigError(
            "[engine].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_references(plan: &RawPlanFile) -> Result<()> {
    for (name, task) in plan.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(TaskgateError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !plan.task.contains_key(dep) {
                return Err(TaskgateError::UnknownReference {
                    kind: "task",
                    from: name.clone(),
                    name: dep.clone(),
                });
            }
        }

        for condition in task.conditions.iter() {
            if !plan.condition.contains_key(condition) {
                return Err(TaskgateError::UnknownReference {
                    kind: "condition",
                    from: name.clone(),
                    name: condition.clone(),
                });
            }
        }

        if task.exclusive.iter().any(|c| c.trim().is_empty()) {
            return Err(TaskgateError::ConfigError(format!(
                "task '{}' has an empty exclusivity category",
                name
            )));
        }
    }
    Ok(())
}

fn validate_condition_references(plan: &RawPlanFile) -> Result<()> {
    for (name, condition) in plan.condition.iter() {
        if let Some(dep) = &condition.after {
            if !plan.task.contains_key(dep) {
                return Err(TaskgateError::UnknownReference {
                    kind: "task",
                    from: format!("condition.{name}"),
                    name: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Task names in an order where every task comes after everything it waits
/// on (its `after` list and the dependencies of its conditions).
///
/// Edge direction: prerequisite -> dependent. For
///
/// ```toml
/// [condition.C]
/// after = "D"
///
/// [task.A]
/// after = ["B"]
/// conditions = ["C"]
/// ```
///
/// the edges are `B -> A`, `D -> C` and `C -> A`.
fn plan_order(
    conditions: &BTreeMap<String, ConditionSpec>,
    tasks: &BTreeMap<String, TaskSpec>,
) -> Result<Vec<String>> {
    let mut graph: DiGraphMap<Node<'_>, ()> = DiGraphMap::new();

    for name in tasks.keys() {
        graph.add_node(Node::Task(name.as_str()));
    }
    for (name, condition) in conditions.iter() {
        let node = graph.add_node(Node::Condition(name.as_str()));
        if let Some(dep) = &condition.after {
            graph.add_edge(Node::Task(dep.as_str()), node, ());
        }
    }
    for (name, task) in tasks.iter() {
        for dep in task.after.iter() {
            graph.add_edge(Node::Task(dep.as_str()), Node::Task(name.as_str()), ());
        }
        for condition in task.conditions.iter() {
            graph.add_edge(
                Node::Condition(condition.as_str()),
                Node::Task(name.as_str()),
                (),
            );
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(order) => Ok(order
            .into_iter()
            .filter_map(|node| match node {
                Node::Task(name) => Some(name.to_string()),
                Node::Condition(_) => None,
            })
            .collect()),
        Err(cycle) => {
            let message = match cycle.node_id() {
                Node::Task(name) => format!("cycle detected in plan involving task '{name}'"),
                Node::Condition(name) => {
                    format!("cycle detected in plan involving condition '{name}'")
                }
            };
            Err(TaskgateError::DagCycle(message))
        }
    }
}

/// Execution order of a validated plan.
pub fn task_order(plan: &PlanFile) -> Vec<String> {
    // Validated plans are acyclic; fall back to name order regardless.
    plan_order(&plan.condition, &plan.task)
        .unwrap_or_else(|_| plan.task.keys().cloned().collect())
}
