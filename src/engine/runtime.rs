// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::{EngineEvent, EngineOptions, RunSummary, TaskQueue, TaskReport};
use crate::errors::{Result, TaskgateError};
use crate::task::{Task, TaskId};

/// Event loop tracking every task handed to its [`TaskQueue`].
///
/// Tasks run on their own driver futures; the engine only listens for
/// enqueue / finish events, so `run` returns as soon as nothing is
/// outstanding.
pub struct Engine {
    events: mpsc::UnboundedReceiver<EngineEvent>,
    queue: TaskQueue,
    outstanding: HashMap<TaskId, Task>,
    reports: Vec<TaskReport>,
    aborted: Vec<String>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("outstanding", &self.outstanding.len())
            .field("finished", &self.reports.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine and its queue. Must be called inside a tokio runtime.
    pub fn new(options: EngineOptions) -> Result<(Engine, TaskQueue)> {
        if options.max_concurrency == 0 {
            return Err(TaskgateError::ConfigError(
                "max_concurrency must be >= 1 (got 0)".to_string(),
            ));
        }

        let handle = Handle::try_current()
            .map_err(|e| TaskgateError::Runtime(format!("engine needs a tokio runtime: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let queue = TaskQueue::new(handle, options, tx);

        let engine = Engine {
            events: rx,
            queue: queue.clone(),
            outstanding: HashMap::new(),
            reports: Vec::new(),
            aborted: Vec::new(),
        };

        Ok((engine, queue))
    }

    /// Main event loop.
    ///
    /// Hand tasks over (through [`TaskQueue::add_task`]) before awaiting
    /// `run`: with nothing outstanding and no event pending, the loop returns
    /// an empty summary straight away.
    ///
    /// - Consumes `EngineEvent`s.
    /// - Tracks outstanding tasks; exits once none are left and no event is
    ///   pending.
    /// - On shutdown (or an aborted task) cancels everything outstanding and
    ///   keeps draining until each task is `Finished`.
    pub async fn run(mut self) -> Result<RunSummary> {
        info!(
            max_concurrency = self.queue.options().max_concurrency,
            "taskgate engine started"
        );

        loop {
            let event = if self.outstanding.is_empty() {
                match self.events.try_recv() {
                    Ok(event) => event,
                    Err(_) => break,
                }
            } else {
                match self.events.recv().await {
                    Some(event) => event,
                    None => {
                        warn!("engine event channel closed with tasks outstanding");
                        break;
                    }
                }
            };

            debug!(?event, "engine received event");
            self.handle(event);
        }

        info!(tasks = self.reports.len(), "engine idle; exiting");

        if !self.aborted.is_empty() {
            return Err(TaskgateError::Runtime(self.aborted.join("; ")));
        }

        Ok(RunSummary {
            reports: self.reports,
        })
    }

    fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::TaskEnqueued(task) => {
                self.outstanding.insert(task.id(), task);
            }
            EngineEvent::TaskFinished { task, errors } => {
                self.outstanding.remove(&task.id());
                self.reports.push(TaskReport {
                    id: task.id(),
                    name: task.name().to_string(),
                    priority: task.scheduling_intent().priority_class(),
                    cancelled: task.is_cancelled(),
                    errors,
                });
            }
            EngineEvent::TaskAborted { task, reason } => {
                error!(task = %task.name(), %reason, "task aborted; shutting down");
                self.outstanding.remove(&task.id());
                self.aborted
                    .push(format!("task '{}' aborted: {}", task.name(), reason));
                self.cancel_outstanding();
            }
            EngineEvent::ShutdownRequested => {
                info!(outstanding = self.outstanding.len(), "shutdown requested");
                self.cancel_outstanding();
            }
        }
    }

    fn cancel_outstanding(&self) {
        self.queue.close();
        for task in self.outstanding.values() {
            task.cancel();
        }
    }
}
