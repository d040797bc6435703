// src/task/fault.rs

//! Design-time faults.
//!
//! Calling the task API outside its preconditions is a wiring bug, not a
//! runtime condition. These are logged and then abort the calling thread via
//! `panic!`; nothing tries to recover.

use thiserror::Error;
use tracing::error;

use crate::task::state::TaskState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleViolation {
    #[error("illegal state transition {from} -> {to} (cancelled = {cancelled})")]
    IllegalTransition {
        from: TaskState,
        to: TaskState,
        cancelled: bool,
    },

    #[error("cannot modify dependencies once a task is {state}")]
    DependenciesFrozen { state: TaskState },

    #[error("cannot add conditions once a task is {state}")]
    ConditionsFrozen { state: TaskState },

    #[error("cannot change scheduling intent once a task is {state}")]
    IntentFrozen { state: TaskState },

    #[error("cannot produce tasks before the task is scheduled")]
    ProduceBeforeScheduled,

    #[error("a task cannot depend on itself")]
    SelfDependency,

    #[error("waiting synchronously for a task is not supported; express ordering as a dependency")]
    BlockingWait,
}

/// Log the violation against the task and panic.
#[track_caller]
pub(crate) fn fatal(task: &str, violation: LifecycleViolation) -> ! {
    error!(task = %task, %violation, "task lifecycle violation");
    panic!("{violation}");
}
