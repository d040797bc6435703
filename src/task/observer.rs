// src/task/observer.rs

//! Lifecycle observers.
//!
//! An observer implements any subset of seven callbacks. Which ones it cares
//! about is declared up front through [`Observer::capabilities`] and resolved
//! once, when the observer is registered; dispatch then only walks the
//! observers flagged for that phase.
//!
//! Dispatch always iterates a snapshot of the registry, so an observer added
//! while a dispatch is in flight neither receives nor blocks it.

use std::fmt;
use std::ops::BitOr;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::task::{Task, TaskError};

/// Set of lifecycle phases an observer wants to hear about.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    pub const WILL_ATTACH: Capabilities = Capabilities(1 << 0);
    pub const WILL_EXECUTE: Capabilities = Capabilities(1 << 1);
    pub const WILL_CANCEL: Capabilities = Capabilities(1 << 2);
    pub const DID_CANCEL: Capabilities = Capabilities(1 << 3);
    pub const DID_PRODUCE_TASK: Capabilities = Capabilities(1 << 4);
    pub const WILL_FINISH: Capabilities = Capabilities(1 << 5);
    pub const DID_FINISH: Capabilities = Capabilities(1 << 6);
    pub const ALL: Capabilities = Capabilities(0b0111_1111);

    pub const fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Capabilities) -> Capabilities {
        Capabilities(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        self.union(rhs)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Capabilities, &str); 7] = [
            (Capabilities::WILL_ATTACH, "will_attach"),
            (Capabilities::WILL_EXECUTE, "will_execute"),
            (Capabilities::WILL_CANCEL, "will_cancel"),
            (Capabilities::DID_CANCEL, "did_cancel"),
            (Capabilities::DID_PRODUCE_TASK, "did_produce_task"),
            (Capabilities::WILL_FINISH, "will_finish"),
            (Capabilities::DID_FINISH, "did_finish"),
        ];

        f.debug_set()
            .entries(
                NAMES
                    .iter()
                    .filter(|(cap, _)| self.contains(*cap))
                    .map(|(_, name)| name),
            )
            .finish()
    }
}

/// Lifecycle listener.
///
/// Callbacks may be invoked from any thread. They run outside the task's
/// internal locks, but must not block waiting on other tasks.
pub trait Observer: Send + Sync {
    /// Phases this observer implements. Read once at registration.
    fn capabilities(&self) -> Capabilities;

    fn will_attach(&self, _task: &Task) {}

    fn will_execute(&self, _task: &Task) {}

    fn will_cancel(&self, _task: &Task, _errors: &[TaskError]) {}

    fn did_cancel(&self, _task: &Task) {}

    fn did_produce_task(&self, _task: &Task, _produced: &Task) {}

    fn will_finish(&self, _task: &Task, _errors: &[TaskError]) {}

    fn did_finish(&self, _task: &Task, _errors: &[TaskError]) {}
}

#[derive(Clone)]
struct Registered {
    capabilities: Capabilities,
    observer: Arc<dyn Observer>,
}

/// Append-only collection of observers for one task.
#[derive(Default)]
pub struct ObserverRegistry {
    entries: RwLock<Vec<Registered>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer, returning the capabilities it was filed under.
    pub fn register(&self, observer: Arc<dyn Observer>) -> Capabilities {
        let capabilities = observer.capabilities();
        if capabilities.is_empty() {
            warn!("registering an observer with no capabilities; it will never be called");
        }

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registered {
                capabilities,
                observer,
            });

        capabilities
    }

    /// Observers registered for `phase`, in registration order.
    pub fn snapshot(&self, phase: Capabilities) -> Vec<Arc<dyn Observer>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.capabilities.contains(phase))
            .map(|r| Arc::clone(&r.observer))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("len", &self.len())
            .finish()
    }
}

type TaskFn = Box<dyn Fn(&Task) + Send + Sync>;
type ErrorsFn = Box<dyn Fn(&Task, &[TaskError]) + Send + Sync>;
type ProduceFn = Box<dyn Fn(&Task, &Task) + Send + Sync>;

/// Observer assembled from closures; capabilities follow from which
/// closures were supplied.
#[derive(Default)]
pub struct FnObserver {
    will_attach: Option<TaskFn>,
    will_execute: Option<TaskFn>,
    will_cancel: Option<ErrorsFn>,
    did_cancel: Option<TaskFn>,
    did_produce_task: Option<ProduceFn>,
    will_finish: Option<ErrorsFn>,
    did_finish: Option<ErrorsFn>,
}

impl FnObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_will_attach(mut self, f: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        self.will_attach = Some(Box::new(f));
        self
    }

    pub fn on_will_execute(mut self, f: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        self.will_execute = Some(Box::new(f));
        self
    }

    pub fn on_will_cancel(
        mut self,
        f: impl Fn(&Task, &[TaskError]) + Send + Sync + 'static,
    ) -> Self {
        self.will_cancel = Some(Box::new(f));
        self
    }

    pub fn on_did_cancel(mut self, f: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        self.did_cancel = Some(Box::new(f));
        self
    }

    pub fn on_did_produce_task(
        mut self,
        f: impl Fn(&Task, &Task) + Send + Sync + 'static,
    ) -> Self {
        self.did_produce_task = Some(Box::new(f));
        self
    }

    pub fn on_will_finish(
        mut self,
        f: impl Fn(&Task, &[TaskError]) + Send + Sync + 'static,
    ) -> Self {
        self.will_finish = Some(Box::new(f));
        self
    }

    pub fn on_did_finish(
        mut self,
        f: impl Fn(&Task, &[TaskError]) + Send + Sync + 'static,
    ) -> Self {
        self.did_finish = Some(Box::new(f));
        self
    }
}

impl Observer for FnObserver {
    fn capabilities(&self) -> Capabilities {
        let flag = |present: bool, cap: Capabilities| {
            if present { cap } else { Capabilities::NONE }
        };

        flag(self.will_attach.is_some(), Capabilities::WILL_ATTACH)
            | flag(self.will_execute.is_some(), Capabilities::WILL_EXECUTE)
            | flag(self.will_cancel.is_some(), Capabilities::WILL_CANCEL)
            | flag(self.did_cancel.is_some(), Capabilities::DID_CANCEL)
            | flag(self.did_produce_task.is_some(), Capabilities::DID_PRODUCE_TASK)
            | flag(self.will_finish.is_some(), Capabilities::WILL_FINISH)
            | flag(self.did_finish.is_some(), Capabilities::DID_FINISH)
    }

    fn will_attach(&self, task: &Task) {
        if let Some(f) = &self.will_attach {
            f(task);
        }
    }

    fn will_execute(&self, task: &Task) {
        if let Some(f) = &self.will_execute {
            f(task);
        }
    }

    fn will_cancel(&self, task: &Task, errors: &[TaskError]) {
        if let Some(f) = &self.will_cancel {
            f(task, errors);
        }
    }

    fn did_cancel(&self, task: &Task) {
        if let Some(f) = &self.did_cancel {
            f(task);
        }
    }

    fn did_produce_task(&self, task: &Task, produced: &Task) {
        if let Some(f) = &self.did_produce_task {
            f(task, produced);
        }
    }

    fn will_finish(&self, task: &Task, errors: &[TaskError]) {
        if let Some(f) = &self.will_finish {
            f(task, errors);
        }
    }

    fn did_finish(&self, task: &Task, errors: &[TaskError]) {
        if let Some(f) = &self.did_finish {
            f(task, errors);
        }
    }
}

/// Logs every lifecycle phase through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl Observer for LoggingObserver {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn will_attach(&self, task: &Task) {
        debug!(task = %task.name(), task_id = %task.id(), "observer attached");
    }

    fn will_execute(&self, task: &Task) {
        info!(task = %task.name(), task_id = %task.id(), "task about to execute");
    }

    fn will_cancel(&self, task: &Task, errors: &[TaskError]) {
        info!(
            task = %task.name(),
            task_id = %task.id(),
            errors = errors.len(),
            "task being cancelled"
        );
    }

    fn did_cancel(&self, task: &Task) {
        debug!(task = %task.name(), task_id = %task.id(), "task cancelled");
    }

    fn did_produce_task(&self, task: &Task, produced: &Task) {
        info!(
            task = %task.name(),
            task_id = %task.id(),
            produced = %produced.name(),
            "task produced a new task"
        );
    }

    fn will_finish(&self, task: &Task, errors: &[TaskError]) {
        debug!(
            task = %task.name(),
            task_id = %task.id(),
            errors = errors.len(),
            "task finishing"
        );
    }

    fn did_finish(&self, task: &Task, errors: &[TaskError]) {
        if errors.is_empty() {
            info!(task = %task.name(), task_id = %task.id(), "task finished");
        } else {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            warn!(
                task = %task.name(),
                task_id = %task.id(),
                errors = ?messages,
                "task finished with errors"
            );
        }
    }
}
