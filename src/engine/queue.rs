// src/engine/queue.rs

//! Handing tasks to the engine and driving them to completion.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, error, warn};

use crate::engine::{EngineEvent, EngineOptions, ExclusivityController};
use crate::task::{FnObserver, Task, TaskError, TaskId, TaskState, TaskStatus};

struct Shared {
    handle: Handle,
    options: EngineOptions,
    permits: Arc<Semaphore>,
    events: mpsc::UnboundedSender<EngineEvent>,
    exclusivity: ExclusivityController,
    known: Mutex<HashSet<TaskId>>,
    closed: AtomicBool,
}

/// Cloneable handle for submitting tasks to an [`Engine`](crate::engine::Engine).
///
/// Usable from any thread, including from inside a running work body.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("options", &self.shared.options)
            .field("closed", &self.shared.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl TaskQueue {
    pub(crate) fn new(
        handle: Handle,
        options: EngineOptions,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
        Self {
            shared: Arc::new(Shared {
                handle,
                options,
                permits,
                events,
                exclusivity: ExclusivityController::new(),
                known: Mutex::new(HashSet::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> EngineOptions {
        self.shared.options
    }

    pub fn exclusivity(&self) -> &ExclusivityController {
        &self.shared.exclusivity
    }

    /// Hand `task` to the engine.
    ///
    /// The task must still be `Initialized`. Adding a task the queue already
    /// knows is a no-op. Its condition gate (if any) is scheduled first; any
    /// dependency that was never handed over is picked up by the driver.
    pub fn add_task(&self, task: Task) {
        let first_time = self
            .shared
            .known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.id());
        if !first_time {
            debug!(task = %task.name(), task_id = %task.id(), "task already queued");
            return;
        }

        if task.has_conditions() {
            if let Some(gate) = task.evaluate_conditions() {
                self.add_task(gate);
            }
        }

        self.shared
            .exclusivity
            .register(&task, task.exclusivity_categories());

        task.add_observer(self.engine_observer());
        task.will_enqueue();

        debug!(
            task = %task.name(),
            task_id = %task.id(),
            priority = %task.scheduling_intent().priority_class(),
            "task enqueued"
        );
        self.send(EngineEvent::TaskEnqueued(task.clone()));

        if self.is_closed() {
            task.cancel();
        }

        self.shared.handle.spawn(drive(self.clone(), task));
    }

    /// Ask the engine to cancel everything and drain.
    pub fn shutdown(&self) {
        self.send(EngineEvent::ShutdownRequested);
    }

    /// Mark the queue closed: tasks added from now on are cancelled on arrival.
    pub(crate) fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn send(&self, event: EngineEvent) {
        if self.shared.events.send(event).is_err() {
            debug!("engine loop is gone; dropping event");
        }
    }

    /// Observer wiring the task back into the engine: produced tasks are
    /// scheduled, finished tasks are reported.
    fn engine_observer(&self) -> FnObserver {
        let producer = self.clone();
        let reporter = self.clone();

        FnObserver::new()
            .on_did_produce_task(move |_parent, produced| {
                producer.add_task(produced.clone());
            })
            .on_did_finish(move |task, errors| {
                reporter.shared.exclusivity.release(task);
                reporter.send(EngineEvent::TaskFinished {
                    task: task.clone(),
                    errors: errors.to_vec(),
                });
            })
    }
}

/// Resolve once the watched task is `Finished`.
async fn finished(mut rx: watch::Receiver<TaskStatus>) {
    let _ = rx.wait_for(TaskStatus::is_finished).await;
}

/// Resolve once the watched task is cancelled.
async fn cancelled(mut rx: watch::Receiver<TaskStatus>) {
    let _ = rx.wait_for(|s| s.cancelled).await;
}

/// Per-task driver: wait for the wait graph, then run the entry point.
async fn drive(queue: TaskQueue, task: Task) {
    // Recomputed every round: dependencies may still be added while pending.
    loop {
        let Some(dep) = task
            .wait_dependencies()
            .into_iter()
            .find(|d| !d.is_finished())
        else {
            break;
        };

        if dep.state() == TaskState::Initialized {
            queue.add_task(dep.clone());
        }

        tokio::select! {
            _ = finished(dep.subscribe()) => {}
            _ = cancelled(task.subscribe()) => {
                debug!(task = %task.name(), "cancelled while waiting for dependencies");
                break;
            }
        }
    }

    // Shutdown may have finished a dependency by cancelling it before this
    // task's own cancellation arrived.
    if queue.is_closed() && !task.is_cancelled() {
        task.cancel();
    }

    if queue.options().cancel_dependents_on_failure && !task.is_cancelled() {
        let failed_parent = task
            .dependencies()
            .into_iter()
            .find(|d| !d.errors().is_empty());
        if let Some(parent) = failed_parent {
            warn!(
                task = %task.name(),
                parent = %parent.name(),
                "dependency finished with errors; cancelling dependent"
            );
            task.cancel_with_error(Some(TaskError::ParentCancelled {
                errors: parent.errors(),
            }));
        }
    }

    // Cancelled tasks only run the termination sequence; no permit needed.
    let _permit = if task.is_cancelled() {
        None
    } else {
        match Arc::clone(&queue.shared.permits).acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(err) => {
                warn!(task = %task.name(), error = %err, "concurrency limiter closed");
                None
            }
        }
    };

    let runner = task.clone();
    if let Err(err) = tokio::task::spawn_blocking(move || runner.start()).await {
        error!(
            task = %task.name(),
            task_id = %task.id(),
            error = %err,
            "task entry point aborted"
        );
        queue.send(EngineEvent::TaskAborted {
            task: task.clone(),
            reason: err.to_string(),
        });
        return;
    }

    // The work body may hand `finish` off to another thread; hold the permit
    // until the task is actually terminal.
    finished(task.subscribe()).await;
}
