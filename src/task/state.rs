// src/task/state.rs

//! Task lifecycle states and the legal-transition table.

use std::fmt;

/// Lifecycle state of a [`Task`](crate::task::Task).
///
/// Variants are ordered by definition, so `state <= TaskState::Executing`
/// reads the way the preconditions are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskState {
    /// Constructed, still being wired (dependencies, conditions, observers).
    Initialized,
    /// Handed to an engine; waiting for dependencies.
    Pending,
    /// The work body is running.
    Executing,
    /// The termination sequence is running.
    Finishing,
    /// Terminal.
    Finished,
}

impl TaskState {
    /// Whether `self -> to` is a legal transition.
    ///
    /// `Pending -> Finishing` is only legal for a cancelled task, so the
    /// cancellation flag is part of the input.
    pub fn can_transition_to(self, to: TaskState, cancelled: bool) -> bool {
        use TaskState::*;

        match (self, to) {
            (Initialized, Pending) => true,
            (Pending, Executing) => true,
            (Pending, Finishing) => cancelled,
            (Executing, Finishing) => true,
            (Finishing, Finished) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == TaskState::Finished
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Initialized => "initialized",
            TaskState::Pending => "pending",
            TaskState::Executing => "executing",
            TaskState::Finishing => "finishing",
            TaskState::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a task, published on every state or cancellation
/// change. Engines subscribe to it to wait for dependencies without blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStatus {
    pub state: TaskState,
    pub cancelled: bool,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}
