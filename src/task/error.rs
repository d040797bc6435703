// src/task/error.rs

use std::time::Duration;

use thiserror::Error;

/// A failure recorded on a task.
///
/// Tasks accumulate these in order; they are never raised across task
/// boundaries.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// A condition attached to the task evaluated to failure.
    #[error("condition '{condition}' failed: {reason}")]
    ConditionFailed { condition: String, reason: String },

    /// A deadline elapsed before the task (or its condition) could proceed.
    #[error("timed out after {elapsed:?}")]
    TimedOut { elapsed: Duration },

    /// A task this one depended on was cancelled or failed.
    #[error("parent task cancelled with {} error(s)", .errors.len())]
    ParentCancelled { errors: Vec<TaskError> },

    /// Work-body or externally injected failure.
    #[error("{0}")]
    Failed(String),
}

impl TaskError {
    pub fn failed(msg: impl Into<String>) -> Self {
        TaskError::Failed(msg.into())
    }

    pub fn condition_failed(condition: impl Into<String>, reason: impl Into<String>) -> Self {
        TaskError::ConditionFailed {
            condition: condition.into(),
            reason: reason.into(),
        }
    }
}

// Nested error lists are heterogeneous, so `ParentCancelled` compares by count.
impl PartialEq for TaskError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                TaskError::ConditionFailed { condition: a, reason: ra },
                TaskError::ConditionFailed { condition: b, reason: rb },
            ) => a == b && ra == rb,
            (TaskError::TimedOut { elapsed: a }, TaskError::TimedOut { elapsed: b }) => a == b,
            (
                TaskError::ParentCancelled { errors: a },
                TaskError::ParentCancelled { errors: b },
            ) => a.len() == b.len(),
            (TaskError::Failed(a), TaskError::Failed(b)) => a == b,
            _ => false,
        }
    }
}
