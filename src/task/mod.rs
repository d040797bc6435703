// src/task/mod.rs

//! The task lifecycle core.
//!
//! A [`Task`] is a cheap, cloneable handle to one unit of schedulable work:
//! - [`state`] holds the five-state lifecycle and its transition table.
//! - [`observer`] holds the listener registry notified at each phase.
//! - [`condition`] holds gating conditions and the aggregate gate.
//! - [`work`] holds the injected work body.
//! - [`error`] / [`fault`] hold task failures (values) and API misuse (fatal).
//!
//! Locking: one mutex guards state, cancellation and errors; dependency edges
//! and conditions have their own mutexes; observers live in an append-only
//! registry. Observers and hooks are always called with no lock held.

pub mod condition;
pub mod error;
pub mod fault;
pub mod observer;
pub mod state;
pub mod work;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::types::SchedulingIntent;

pub use condition::Condition;
pub use error::TaskError;
pub use fault::LifecycleViolation;
pub use observer::{Capabilities, FnObserver, LoggingObserver, Observer, ObserverRegistry};
pub use state::{TaskState, TaskStatus};
pub use work::{Noop, Work};

use condition::{ConditionGate, GateListener};
use fault::fatal;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type TaskHook = Box<dyn Fn(&Task) + Send + Sync>;
type ErrorsHook = Box<dyn Fn(&Task, &[TaskError]) + Send + Sync>;

/// Per-task lifecycle callbacks, fixed at construction.
///
/// Each hook runs just before the observers of the same phase.
#[derive(Default)]
struct Hooks {
    will_cancel: Option<ErrorsHook>,
    did_cancel: Option<TaskHook>,
    will_finish: Option<ErrorsHook>,
    did_finish: Option<ErrorsHook>,
}

/// Everything guarded by the lifecycle lock.
#[derive(Debug)]
struct Lifecycle {
    state: TaskState,
    cancelled: bool,
    /// Set while the canceller is running `will_cancel` / `did_cancel`.
    notifying_cancel: bool,
    /// Errors of a `finish` that arrived while cancel callbacks were running.
    /// The canceller runs it once `did_cancel` has been dispatched.
    deferred_finish: Option<Vec<TaskError>>,
    /// Set once the termination sequence has been claimed.
    finished_already: bool,
    errors: Vec<TaskError>,
    intent: SchedulingIntent,
}

impl Lifecycle {
    fn status(&self) -> TaskStatus {
        TaskStatus {
            state: self.state,
            cancelled: self.cancelled,
        }
    }
}

#[derive(Default)]
struct Edges {
    /// Declared through `add_dependency`; visible and removable.
    direct: Vec<Task>,
    /// Condition gates and exclusivity edges. Only part of the wait graph.
    hidden: Vec<Task>,
}

struct TaskInner {
    id: TaskId,
    name: String,
    work: Box<dyn Work>,
    hooks: Hooks,
    exclusive: Vec<String>,
    lifecycle: Mutex<Lifecycle>,
    status_tx: watch::Sender<TaskStatus>,
    edges: Mutex<Edges>,
    conditions: Mutex<Vec<Arc<dyn Condition>>>,
    observers: ObserverRegistry,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a task. Clones share the same task; equality is by id.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

/// Non-owning handle, used where a task would otherwise keep itself alive.
#[derive(Clone)]
pub struct WeakTask {
    inner: Weak<TaskInner>,
}

impl WeakTask {
    pub fn upgrade(&self) -> Option<Task> {
        self.inner.upgrade().map(|inner| Task { inner })
    }
}

impl Task {
    /// Task with the given name and work body.
    pub fn new(name: impl Into<String>, work: impl Work + 'static) -> Task {
        Task::builder(name).work(work).build()
    }

    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(name)
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn downgrade(&self) -> WeakTask {
        WeakTask {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ---------------------------------------------------------------------
    // State machine
    // ---------------------------------------------------------------------

    pub fn state(&self) -> TaskState {
        lock(&self.inner.lifecycle).state
    }

    pub fn status(&self) -> TaskStatus {
        lock(&self.inner.lifecycle).status()
    }

    /// Watch channel that receives every state / cancellation change.
    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn is_executing(&self) -> bool {
        self.state() == TaskState::Executing
    }

    pub fn is_finished(&self) -> bool {
        self.state() == TaskState::Finished
    }

    pub fn is_cancelled(&self) -> bool {
        lock(&self.inner.lifecycle).cancelled
    }

    /// Errors accumulated so far, in the order they were recorded.
    pub fn errors(&self) -> Vec<TaskError> {
        lock(&self.inner.lifecycle).errors.clone()
    }

    /// Apply a transition while holding the lifecycle lock.
    ///
    /// The "will change" / "did change" records and the status broadcast all
    /// happen inside the critical section, so observers of the watch channel
    /// see transitions in order.
    fn transition_locked(
        &self,
        lc: &mut Lifecycle,
        to: TaskState,
    ) -> Result<(), LifecycleViolation> {
        let from = lc.state;
        if !from.can_transition_to(to, lc.cancelled) {
            return Err(LifecycleViolation::IllegalTransition {
                from,
                to,
                cancelled: lc.cancelled,
            });
        }

        trace!(task = %self.name(), task_id = %self.id(), %from, %to, "task state will change");
        lc.state = to;
        self.inner.status_tx.send_replace(lc.status());
        debug!(task = %self.name(), task_id = %self.id(), %from, %to, "task state did change");

        Ok(())
    }

    fn transition(&self, to: TaskState) {
        let result = {
            let mut lc = lock(&self.inner.lifecycle);
            self.transition_locked(&mut lc, to)
        };
        if let Err(violation) = result {
            fatal(self.name(), violation);
        }
    }

    /// Fault unless the current state satisfies `allowed`.
    fn require_state(
        &self,
        allowed: impl Fn(TaskState) -> bool,
        violation: impl Fn(TaskState) -> LifecycleViolation,
    ) {
        let state = self.state();
        if !allowed(state) {
            fatal(self.name(), violation(state));
        }
    }

    /// Called by the engine when the task is handed over (`Initialized -> Pending`).
    pub fn will_enqueue(&self) {
        self.transition(TaskState::Pending);
    }

    /// Engine entry point, invoked exactly once after every wait dependency
    /// has finished.
    ///
    /// A task that was cancelled (or already carries errors) while pending
    /// goes straight to the termination sequence without ever executing.
    /// `will_execute` observers only fire once the task is `Executing`.
    pub fn start(&self) {
        let result = {
            let mut lc = lock(&self.inner.lifecycle);
            if lc.cancelled || !lc.errors.is_empty() {
                None
            } else {
                Some(self.transition_locked(&mut lc, TaskState::Executing))
            }
        };

        match result {
            None => self.finish_without_executing(),
            Some(Err(violation)) => fatal(self.name(), violation),
            Some(Ok(())) => {
                for observer in self.inner.observers.snapshot(Capabilities::WILL_EXECUTE) {
                    observer.will_execute(self);
                }

                // Cancelling an executing task already drove it to `Finished`.
                if self.is_cancelled() {
                    debug!(
                        task = %self.name(),
                        task_id = %self.id(),
                        "task cancelled before its body ran"
                    );
                    return;
                }

                info!(task = %self.name(), task_id = %self.id(), "executing task");
                self.inner.work.execute(self);
            }
        }
    }

    fn finish_without_executing(&self) {
        if !self.is_cancelled() {
            self.cancel();
        }
        debug!(
            task = %self.name(),
            task_id = %self.id(),
            "task cancelled before executing; finishing"
        );
        self.finish(Vec::new());
    }

    /// Always faults: blocking on a task is not supported. Express ordering
    /// with [`Task::add_dependency`] instead.
    pub fn wait_until_finished(&self) -> ! {
        fatal(self.name(), LifecycleViolation::BlockingWait)
    }

    // ---------------------------------------------------------------------
    // Dependencies and conditions
    // ---------------------------------------------------------------------

    /// Declare that `other` must finish before this task starts.
    ///
    /// Faults once the task is past `Executing`.
    pub fn add_dependency(&self, other: &Task) {
        if other == self {
            fatal(self.name(), LifecycleViolation::SelfDependency);
        }
        self.require_state(
            |s| s <= TaskState::Executing,
            |state| LifecycleViolation::DependenciesFrozen { state },
        );

        let mut edges = lock(&self.inner.edges);
        if !edges.direct.contains(other) {
            edges.direct.push(other.clone());
        }
    }

    /// Remove a dependency previously added with [`Task::add_dependency`].
    ///
    /// Hidden edges (condition gates, exclusivity) are not affected.
    pub fn remove_dependency(&self, other: &Task) {
        self.require_state(
            |s| s <= TaskState::Executing,
            |state| LifecycleViolation::DependenciesFrozen { state },
        );

        lock(&self.inner.edges).direct.retain(|t| t != other);
    }

    pub fn direct_dependencies(&self) -> Vec<Task> {
        lock(&self.inner.edges).direct.clone()
    }

    /// Dependencies implied by attached conditions. Recomputed on each call.
    pub fn indirect_dependencies(&self) -> Vec<Task> {
        let conditions = lock(&self.inner.conditions).clone();
        let mut out: Vec<Task> = Vec::new();
        for condition in conditions {
            if let Some(dep) = condition.dependency(self) {
                if !out.contains(&dep) {
                    out.push(dep);
                }
            }
        }
        out
    }

    /// Direct dependencies plus condition dependencies, without duplicates.
    pub fn dependencies(&self) -> Vec<Task> {
        let mut all = self.direct_dependencies();
        for dep in self.indirect_dependencies() {
            if !all.contains(&dep) {
                all.push(dep);
            }
        }
        all
    }

    /// The full set of tasks an engine must wait for: [`Task::dependencies`]
    /// plus hidden edges (condition gates and exclusivity edges).
    ///
    /// Hidden edges never show up in `dependencies()` and cannot be removed
    /// with `remove_dependency`; inspect this method when debugging a task
    /// that waits on something its declared dependencies don't explain.
    pub fn wait_dependencies(&self) -> Vec<Task> {
        let mut all = self.dependencies();
        let hidden = lock(&self.inner.edges).hidden.clone();
        for dep in hidden {
            if !all.contains(&dep) {
                all.push(dep);
            }
        }
        all
    }

    /// Inject a hidden edge on behalf of an exclusivity coordinator.
    ///
    /// The edge serializes this task after `other` but is deliberately left
    /// out of `dependencies()` / `direct_dependencies()` and out of reach of
    /// `remove_dependency`.
    pub fn add_exclusivity_dependency(&self, other: &Task) {
        if other == self {
            fatal(self.name(), LifecycleViolation::SelfDependency);
        }
        self.require_state(
            |s| s < TaskState::Executing,
            |state| LifecycleViolation::DependenciesFrozen { state },
        );
        self.add_hidden_edge(other);
    }

    fn add_hidden_edge(&self, other: &Task) {
        let mut edges = lock(&self.inner.edges);
        if !edges.hidden.contains(other) {
            edges.hidden.push(other.clone());
        }
    }

    /// Attach a gating condition. Faults once the task is `Executing` or later.
    pub fn add_condition(&self, condition: impl Condition + 'static) {
        self.add_shared_condition(Arc::new(condition));
    }

    pub fn add_shared_condition(&self, condition: Arc<dyn Condition>) {
        self.require_state(
            |s| s < TaskState::Executing,
            |state| LifecycleViolation::ConditionsFrozen { state },
        );
        lock(&self.inner.conditions).push(condition);
    }

    pub fn has_conditions(&self) -> bool {
        !lock(&self.inner.conditions).is_empty()
    }

    /// Build the aggregate gate that evaluates this task's conditions.
    ///
    /// Returns `None` when no conditions are attached. Otherwise the gate
    /// depends on this task's direct dependencies and on every condition's
    /// dependency, is attached to this task as a hidden edge, and cancels
    /// this task with the gate's failures if any condition fails. The caller
    /// (the engine) is responsible for scheduling the returned gate.
    pub fn evaluate_conditions(&self) -> Option<Task> {
        self.require_state(
            |s| s < TaskState::Executing,
            |state| LifecycleViolation::ConditionsFrozen { state },
        );

        let conditions = lock(&self.inner.conditions).clone();
        if conditions.is_empty() {
            return None;
        }

        let gate = Task::builder(format!("{}:conditions", self.name()))
            .work(ConditionGate::new(self.downgrade(), conditions))
            .intent(self.scheduling_intent())
            .build();

        for dep in self.dependencies() {
            gate.add_dependency(&dep);
        }
        gate.add_observer(GateListener::new(self.downgrade()));
        self.add_hidden_edge(&gate);

        debug!(
            task = %self.name(),
            gate = %gate.name(),
            gate_id = %gate.id(),
            "built condition gate"
        );

        Some(gate)
    }

    /// Exclusivity categories declared at construction.
    pub fn exclusivity_categories(&self) -> &[String] {
        &self.inner.exclusive
    }

    // ---------------------------------------------------------------------
    // Scheduling hint
    // ---------------------------------------------------------------------

    pub fn scheduling_intent(&self) -> SchedulingIntent {
        lock(&self.inner.lifecycle).intent
    }

    /// Faults once the task is `Executing` or later.
    pub fn set_scheduling_intent(&self, intent: SchedulingIntent) {
        let violation = {
            let mut lc = lock(&self.inner.lifecycle);
            if lc.state < TaskState::Executing {
                lc.intent = intent;
                None
            } else {
                Some(LifecycleViolation::IntentFrozen { state: lc.state })
            }
        };
        if let Some(violation) = violation {
            fatal(self.name(), violation);
        }
    }

    // ---------------------------------------------------------------------
    // Observers and production
    // ---------------------------------------------------------------------

    /// Register an observer and immediately call its `will_attach`.
    ///
    /// Phases that already happened are not replayed.
    pub fn add_observer(&self, observer: impl Observer + 'static) {
        self.add_shared_observer(Arc::new(observer));
    }

    pub fn add_shared_observer(&self, observer: Arc<dyn Observer>) {
        let capabilities = self.inner.observers.register(Arc::clone(&observer));
        if capabilities.contains(Capabilities::WILL_ATTACH) {
            observer.will_attach(self);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Announce a new task created by this one. The engine observing
    /// `did_produce_task` is responsible for scheduling it.
    pub fn produce_task(&self, produced: &Task) {
        self.require_state(
            |s| s > TaskState::Initialized,
            |_| LifecycleViolation::ProduceBeforeScheduled,
        );

        debug!(
            task = %self.name(),
            task_id = %self.id(),
            produced = %produced.name(),
            "task produced a new task"
        );

        for observer in self.inner.observers.snapshot(Capabilities::DID_PRODUCE_TASK) {
            observer.did_produce_task(self, produced);
        }
    }

    // ---------------------------------------------------------------------
    // Cancellation and termination
    // ---------------------------------------------------------------------

    pub fn cancel(&self) {
        self.cancel_with_errors(Vec::new());
    }

    pub fn cancel_with_error(&self, error: Option<TaskError>) {
        self.cancel_with_errors(error.into_iter().collect());
    }

    /// Record `errors` and request cancellation.
    ///
    /// The false -> true edge on `cancelled` is detected and applied under
    /// the lifecycle lock, so only one caller notifies `will_cancel` /
    /// `did_cancel`; later calls just add their errors. Does nothing once the
    /// task has started finishing. Cancelling an executing task drives it to
    /// `Finished`.
    ///
    /// A `finish` issued while the cancel callbacks run (from a callback or
    /// from another thread) is deferred until `did_cancel` has been
    /// dispatched, so observers always see the cancel phases first.
    pub fn cancel_with_errors(&self, errors: Vec<TaskError>) {
        let snapshot = {
            let mut lc = lock(&self.inner.lifecycle);
            if lc.finished_already {
                debug!(
                    task = %self.name(),
                    task_id = %self.id(),
                    "cancel ignored; task already finishing"
                );
                return;
            }
            lc.errors.extend(errors);
            if lc.cancelled {
                return;
            }

            trace!(task = %self.name(), task_id = %self.id(), "task cancellation will change");
            lc.cancelled = true;
            lc.notifying_cancel = true;
            self.inner.status_tx.send_replace(lc.status());
            info!(
                task = %self.name(),
                task_id = %self.id(),
                state = %lc.state,
                errors = lc.errors.len(),
                "task cancelled"
            );
            lc.errors.clone()
        };

        if let Some(hook) = &self.inner.hooks.will_cancel {
            hook(self, &snapshot);
        }
        for observer in self.inner.observers.snapshot(Capabilities::WILL_CANCEL) {
            observer.will_cancel(self, &snapshot);
        }

        if let Some(hook) = &self.inner.hooks.did_cancel {
            hook(self);
        }
        for observer in self.inner.observers.snapshot(Capabilities::DID_CANCEL) {
            observer.did_cancel(self);
        }

        let (deferred, was_executing) = {
            let mut lc = lock(&self.inner.lifecycle);
            lc.notifying_cancel = false;
            (lc.deferred_finish.take(), lc.state == TaskState::Executing)
        };

        match deferred {
            Some(errors) => self.finish(errors),
            None if was_executing => self.finish(Vec::new()),
            None => {}
        }
    }

    pub fn finish_with_error(&self, error: Option<TaskError>) {
        self.finish(error.into_iter().collect());
    }

    /// Termination entry point.
    ///
    /// Runs its body exactly once no matter how many callers race here:
    /// `Finishing`, merge `errors`, `will_finish` hook and observers,
    /// `Finished`, `did_finish` hook and observers. This is the only path to
    /// `Finished`.
    ///
    /// While cancel callbacks are running, the call is handed to the
    /// canceller and returns before the task is `Finished`.
    pub fn finish(&self, errors: Vec<TaskError>) {
        let result = {
            let mut lc = lock(&self.inner.lifecycle);
            if lc.finished_already {
                return;
            }
            if lc.notifying_cancel {
                if lc.deferred_finish.is_none() {
                    debug!(
                        task = %self.name(),
                        task_id = %self.id(),
                        "finish deferred until cancel callbacks complete"
                    );
                    lc.deferred_finish = Some(errors);
                }
                return;
            }
            match self.transition_locked(&mut lc, TaskState::Finishing) {
                Ok(()) => {
                    lc.finished_already = true;
                    lc.errors.extend(errors);
                    Ok(lc.errors.clone())
                }
                Err(violation) => Err(violation),
            }
        };

        let all_errors = match result {
            Ok(all) => all,
            Err(violation) => fatal(self.name(), violation),
        };

        if let Some(hook) = &self.inner.hooks.will_finish {
            hook(self, &all_errors);
        }
        for observer in self.inner.observers.snapshot(Capabilities::WILL_FINISH) {
            observer.will_finish(self, &all_errors);
        }

        self.transition(TaskState::Finished);

        info!(
            task = %self.name(),
            task_id = %self.id(),
            errors = all_errors.len(),
            "task finished"
        );

        if let Some(hook) = &self.inner.hooks.did_finish {
            hook(self, &all_errors);
        }
        for observer in self.inner.observers.snapshot(Capabilities::DID_FINISH) {
            observer.did_finish(self, &all_errors);
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status();
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &status.state)
            .field("cancelled", &status.cancelled)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Task`].
pub struct TaskBuilder {
    name: String,
    work: Box<dyn Work>,
    intent: SchedulingIntent,
    exclusive: Vec<String>,
    hooks: Hooks,
}

impl TaskBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            work: Box::new(Noop),
            intent: SchedulingIntent::None,
            exclusive: Vec::new(),
            hooks: Hooks::default(),
        }
    }

    pub fn work(mut self, work: impl Work + 'static) -> Self {
        self.work = Box::new(work);
        self
    }

    /// Closure form of [`TaskBuilder::work`].
    pub fn work_fn(self, f: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        self.work(f)
    }

    pub fn intent(mut self, intent: SchedulingIntent) -> Self {
        self.intent = intent;
        self
    }

    /// Serialize this task with every other task in `category`.
    pub fn exclusive(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        if !self.exclusive.contains(&category) {
            self.exclusive.push(category);
        }
        self
    }

    pub fn on_will_cancel(
        mut self,
        f: impl Fn(&Task, &[TaskError]) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.will_cancel = Some(Box::new(f));
        self
    }

    pub fn on_did_cancel(mut self, f: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        self.hooks.did_cancel = Some(Box::new(f));
        self
    }

    /// Runs at `Finishing` with the full error list, before `will_finish`
    /// observers.
    pub fn on_will_finish(
        mut self,
        f: impl Fn(&Task, &[TaskError]) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.will_finish = Some(Box::new(f));
        self
    }

    /// Runs once the task is `Finished`, before `did_finish` observers.
    pub fn on_did_finish(
        mut self,
        f: impl Fn(&Task, &[TaskError]) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.did_finish = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Task {
        let lifecycle = Lifecycle {
            state: TaskState::Initialized,
            cancelled: false,
            notifying_cancel: false,
            deferred_finish: None,
            finished_already: false,
            errors: Vec::new(),
            intent: self.intent,
        };
        let (status_tx, _) = watch::channel(lifecycle.status());

        let task = Task {
            inner: Arc::new(TaskInner {
                id: TaskId::next(),
                name: self.name,
                work: self.work,
                hooks: self.hooks,
                exclusive: self.exclusive,
                lifecycle: Mutex::new(lifecycle),
                status_tx,
                edges: Mutex::new(Edges::default()),
                conditions: Mutex::new(Vec::new()),
                observers: ObserverRegistry::new(),
            }),
        };

        trace!(task = %task.name(), task_id = %task.id(), "task created");
        task
    }
}
