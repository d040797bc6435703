// src/task/work.rs

use crate::task::Task;

/// The task-specific part of a task: what runs while it is `Executing`.
///
/// `execute` receives the task handle and must eventually call
/// [`Task::finish`] (directly, or later from another thread). Long-running
/// bodies should poll [`Task::is_cancelled`] and stop early; cancellation of
/// an executing task already drives it to `Finished`, so a late `finish` from
/// the body is harmless.
pub trait Work: Send + Sync {
    fn execute(&self, task: &Task);
}

impl<F> Work for F
where
    F: Fn(&Task) + Send + Sync,
{
    fn execute(&self, task: &Task) {
        self(task)
    }
}

/// Work body that finishes immediately without errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl Work for Noop {
    fn execute(&self, task: &Task) {
        task.finish(Vec::new());
    }
}
