// src/engine/exclusivity.rs

//! Mutual exclusivity by category.
//!
//! Tasks declaring the same category run one after another, in registration
//! order. The ordering is injected as a hidden edge
//! ([`Task::add_exclusivity_dependency`]), so it shows up in
//! [`Task::wait_dependencies`] but never in [`Task::dependencies`], and
//! `remove_dependency` cannot undo it.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::task::{Task, TaskId};

#[derive(Debug, Default)]
pub struct ExclusivityController {
    /// Unfinished tasks per category, in registration order.
    holders: Mutex<HashMap<String, Vec<Task>>>,
}

impl ExclusivityController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `task` behind the most recently registered unfinished task
    /// of each category.
    ///
    /// The edge is skipped when the previous holder already waits on `task`
    /// (directly or transitively); adding it would deadlock both.
    pub fn register(&self, task: &Task, categories: &[String]) {
        if categories.is_empty() {
            return;
        }

        let mut holders = self.holders.lock().unwrap_or_else(PoisonError::into_inner);
        for category in categories {
            let queue = holders.entry(category.clone()).or_default();
            queue.retain(|t| !t.is_finished());

            if let Some(previous) = queue.last() {
                if previous != task && !waits_on(previous, task) {
                    debug!(
                        task = %task.name(),
                        after = %previous.name(),
                        %category,
                        "injecting exclusivity edge"
                    );
                    task.add_exclusivity_dependency(previous);
                }
            }

            if !queue.contains(task) {
                queue.push(task.clone());
            }
        }
    }

    /// Drop `task` from every category it holds.
    pub fn release(&self, task: &Task) {
        let mut holders = self.holders.lock().unwrap_or_else(PoisonError::into_inner);
        for category in task.exclusivity_categories() {
            if let Some(queue) = holders.get_mut(category) {
                queue.retain(|t| t != task);
                if queue.is_empty() {
                    holders.remove(category);
                }
            }
        }
    }

    /// Number of unfinished tasks registered under `category`.
    pub fn holders_of(&self, category: &str) -> usize {
        self.holders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(category)
            .map_or(0, Vec::len)
    }
}

/// Whether `from` reaches `target` through its wait graph.
fn waits_on(from: &Task, target: &Task) -> bool {
    let mut seen: HashSet<TaskId> = HashSet::new();
    let mut stack = vec![from.clone()];

    while let Some(current) = stack.pop() {
        if !seen.insert(current.id()) {
            continue;
        }
        for dep in current.wait_dependencies() {
            if &dep == target {
                return true;
            }
            stack.push(dep);
        }
    }

    false
}
