// src/engine/mod.rs

//! Reference execution engine.
//!
//! The task core never owns threads. This module is the collaborator that
//! does:
//! - [`queue`]: `TaskQueue`, the handle used to hand tasks over. Each task
//!   gets a driver future that waits for its wait graph and then calls
//!   [`Task::start`] on a blocking thread.
//! - [`runtime`]: `Engine`, the event loop that tracks outstanding tasks and
//!   produces the [`RunSummary`].
//! - [`exclusivity`]: serializes tasks that share a category through hidden
//!   dependency edges.

use std::fmt;

use crate::task::{Task, TaskError, TaskId};
use crate::types::PriorityClass;

/// Knobs for the engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Upper bound on tasks running their work body at the same time.
    pub max_concurrency: usize,
    /// Cancel a task with [`TaskError::ParentCancelled`] when one of its
    /// visible dependencies finished with errors.
    pub cancel_dependents_on_failure: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            cancel_dependents_on_failure: false,
        }
    }
}

/// Events flowing from task drivers and observers into the engine loop.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A task was handed to the queue and is now `Pending`.
    TaskEnqueued(Task),
    /// A task reached `Finished`.
    TaskFinished { task: Task, errors: Vec<TaskError> },
    /// A task's entry point panicked (a lifecycle fault) and it will never
    /// finish.
    TaskAborted { task: Task, reason: String },
    /// Cancel everything outstanding and drain.
    ShutdownRequested,
}

/// Final record for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub id: TaskId,
    pub name: String,
    pub priority: PriorityClass,
    pub cancelled: bool,
    pub errors: Vec<TaskError>,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        !self.cancelled && self.errors.is_empty()
    }
}

/// Reports for every task the engine saw, in finish order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub reports: Vec<TaskReport>,
}

impl RunSummary {
    pub fn succeeded(&self) -> impl Iterator<Item = &TaskReport> {
        self.reports.iter().filter(|r| r.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskReport> {
        self.reports.iter().filter(|r| !r.succeeded())
    }

    pub fn all_succeeded(&self) -> bool {
        self.reports.iter().all(TaskReport::succeeded)
    }

    pub fn get(&self, name: &str) -> Option<&TaskReport> {
        self.reports.iter().find(|r| r.name == name)
    }

    /// Position of `name` in finish order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.reports.iter().position(|r| r.name == name)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ok = self.succeeded().count();
        writeln!(
            f,
            "{} task(s), {} succeeded, {} failed",
            self.reports.len(),
            ok,
            self.reports.len() - ok
        )?;
        for report in &self.reports {
            let status = if report.succeeded() {
                "ok"
            } else if report.cancelled {
                "cancelled"
            } else {
                "failed"
            };
            writeln!(f, "  {:<9} {} [{}]", status, report.name, report.priority)?;
            for error in &report.errors {
                writeln!(f, "            - {error}")?;
            }
        }
        Ok(())
    }
}

pub mod exclusivity;
pub mod queue;
pub mod runtime;

pub use exclusivity::ExclusivityController;
pub use queue::TaskQueue;
pub use runtime::Engine;
