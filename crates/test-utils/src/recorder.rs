//! Observer that records every lifecycle phase it sees.

use std::sync::{Arc, Mutex};

use taskgate::task::{Capabilities, Observer, Task, TaskError, TaskState};

/// One recorded callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    WillAttach,
    /// State observed while the callback ran.
    WillExecute(TaskState),
    WillCancel(Vec<TaskError>),
    DidCancel,
    DidProduceTask(String),
    WillFinish(Vec<TaskError>),
    DidFinish(Vec<TaskError>),
}

/// Cloneable recorder; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    phases: Arc<Mutex<Vec<(String, Phase)>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, task: &Task, phase: Phase) {
        self.phases
            .lock()
            .expect("recorder lock poisoned")
            .push((task.name().to_string(), phase));
    }

    /// All phases, across every task observed.
    pub fn phases(&self) -> Vec<Phase> {
        self.entries().into_iter().map(|(_, p)| p).collect()
    }

    /// Phases recorded for one task.
    pub fn phases_of(&self, task: &str) -> Vec<Phase> {
        self.entries()
            .into_iter()
            .filter(|(name, _)| name == task)
            .map(|(_, p)| p)
            .collect()
    }

    pub fn entries(&self) -> Vec<(String, Phase)> {
        self.phases.lock().expect("recorder lock poisoned").clone()
    }

    pub fn count(&self, matches: impl Fn(&Phase) -> bool) -> usize {
        self.phases().iter().filter(|p| matches(p)).count()
    }

    /// Task names in the order their `did_finish` was recorded.
    pub fn finish_order(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(_, p)| matches!(p, Phase::DidFinish(_)))
            .map(|(name, _)| name)
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn will_attach(&self, task: &Task) {
        self.push(task, Phase::WillAttach);
    }

    fn will_execute(&self, task: &Task) {
        self.push(task, Phase::WillExecute(task.state()));
    }

    fn will_cancel(&self, task: &Task, errors: &[TaskError]) {
        self.push(task, Phase::WillCancel(errors.to_vec()));
    }

    fn did_cancel(&self, task: &Task) {
        self.push(task, Phase::DidCancel);
    }

    fn did_produce_task(&self, task: &Task, produced: &Task) {
        self.push(task, Phase::DidProduceTask(produced.name().to_string()));
    }

    fn will_finish(&self, task: &Task, errors: &[TaskError]) {
        self.push(task, Phase::WillFinish(errors.to_vec()));
    }

    fn did_finish(&self, task: &Task, errors: &[TaskError]) {
        self.push(task, Phase::DidFinish(errors.to_vec()));
    }
}
