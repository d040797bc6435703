// src/task/condition.rs

//! Gating conditions and the aggregate gate that evaluates them.
//!
//! A task with conditions does not run its body until a synthetic "gate" task
//! has evaluated every condition. The gate:
//! - depends on the owner's direct dependencies and on each condition's own
//!   dependency, so conditions are only evaluated once those have finished;
//! - is attached to the owner as a hidden edge (see
//!   [`Task::wait_dependencies`]);
//! - cancels the owner with the collected failures if any condition fails
//!   (or if the gate itself was cancelled).
//!   This happens from the gate's `will_finish` phase, i.e. before the gate
//!   is observably `Finished`, so the owner can never start in between.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::task::observer::{Capabilities, Observer};
use crate::task::work::Work;
use crate::task::{Task, TaskError, WeakTask};

/// A predicate that must hold before a task may execute.
pub trait Condition: Send + Sync {
    /// Name used in logs and in [`TaskError::ConditionFailed`].
    fn name(&self) -> &str;

    /// Optional task that must finish before this condition is evaluated.
    ///
    /// Called on demand (it feeds [`Task::dependencies`]), so return the same
    /// handle every time rather than building a new task per call.
    fn dependency(&self, _task: &Task) -> Option<Task> {
        None
    }

    /// Evaluate the condition for `task`. An `Err` carries the failures;
    /// an empty list is reported as a generic condition failure.
    fn evaluate(&self, task: &Task) -> Result<(), Vec<TaskError>>;
}

/// Work body of the aggregate gate.
pub(crate) struct ConditionGate {
    owner: WeakTask,
    conditions: Vec<Arc<dyn Condition>>,
}

impl ConditionGate {
    pub(crate) fn new(owner: WeakTask, conditions: Vec<Arc<dyn Condition>>) -> Self {
        Self { owner, conditions }
    }
}

impl Work for ConditionGate {
    fn execute(&self, gate: &Task) {
        let Some(owner) = self.owner.upgrade() else {
            debug!(gate = %gate.name(), "owning task dropped; skipping condition evaluation");
            gate.finish(Vec::new());
            return;
        };

        let mut failures = Vec::new();
        for condition in &self.conditions {
            if gate.is_cancelled() {
                break;
            }

            match condition.evaluate(&owner) {
                Ok(()) => {
                    debug!(
                        task = %owner.name(),
                        condition = %condition.name(),
                        "condition satisfied"
                    );
                }
                Err(errors) if errors.is_empty() => {
                    failures.push(TaskError::condition_failed(
                        condition.name(),
                        "condition reported failure",
                    ));
                }
                Err(errors) => {
                    warn!(
                        task = %owner.name(),
                        condition = %condition.name(),
                        failures = errors.len(),
                        "condition failed"
                    );
                    failures.extend(errors);
                }
            }
        }

        gate.finish(failures);
    }
}

/// Cancels the owning task when its gate finishes with failures.
pub(crate) struct GateListener {
    owner: WeakTask,
}

impl GateListener {
    pub(crate) fn new(owner: WeakTask) -> Self {
        Self { owner }
    }
}

impl Observer for GateListener {
    fn capabilities(&self) -> Capabilities {
        Capabilities::WILL_FINISH
    }

    fn will_finish(&self, gate: &Task, errors: &[TaskError]) {
        // A cancelled gate never finished evaluating, so the owner is not
        // cleared to run either.
        if errors.is_empty() && !gate.is_cancelled() {
            return;
        }
        if let Some(owner) = self.owner.upgrade() {
            owner.cancel_with_errors(errors.to_vec());
        }
    }
}
