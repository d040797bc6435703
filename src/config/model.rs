// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::engine::EngineOptions;
use crate::types::SchedulingIntent;

/// Plan file as read from TOML, before validation.
///
/// ```toml
/// [engine]
/// max_concurrency = 2
///
/// [condition.online]
/// outcome = "pass"
/// after = "probe"
///
/// [task.probe]
/// duration_ms = 5
///
/// [task.fetch]
/// after = ["probe"]
/// conditions = ["online"]
/// exclusive = ["network"]
/// ```
///
/// All sections are optional; validation requires at least one task.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawPlanFile {
    #[serde(default)]
    pub engine: EngineSection,

    /// Conditions from `[condition.<name>]`, referenced by tasks.
    #[serde(default)]
    pub condition: BTreeMap<String, ConditionSpec>,

    /// Tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskSpec>,
}

/// Validated plan. Only constructed through `TryFrom<RawPlanFile>`.
#[derive(Debug, Clone)]
pub struct PlanFile {
    pub engine: EngineSection,
    pub condition: BTreeMap<String, ConditionSpec>,
    pub task: BTreeMap<String, TaskSpec>,
}

impl PlanFile {
    pub(crate) fn new_unchecked(
        engine: EngineSection,
        condition: BTreeMap<String, ConditionSpec>,
        task: BTreeMap<String, TaskSpec>,
    ) -> Self {
        Self {
            engine,
            condition,
            task,
        }
    }

    /// Engine options from `[engine]`, with an optional CLI override.
    pub fn engine_options(&self, max_concurrency: Option<usize>) -> EngineOptions {
        EngineOptions {
            max_concurrency: max_concurrency.unwrap_or(self.engine.max_concurrency),
            cancel_dependents_on_failure: self.engine.cancel_dependents_on_failure,
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Work bodies allowed to run at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Cancel tasks whose dependencies finished with errors.
    #[serde(default)]
    pub cancel_dependents_on_failure: bool,
}

fn default_max_concurrency() -> usize {
    EngineOptions::default().max_concurrency
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            cancel_dependents_on_failure: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Pass,
    Fail,
}

/// `[condition.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConditionSpec {
    #[serde(default)]
    pub outcome: Outcome,

    /// Failure reason reported when `outcome = "fail"`.
    #[serde(default)]
    pub reason: Option<String>,

    /// Task that must finish before the condition is evaluated.
    #[serde(default)]
    pub after: Option<String>,

    /// Fail with a timeout if evaluation starts later than this many
    /// milliseconds after the plan started running.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[default]
    Succeed,
    Fail,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    #[serde(default)]
    pub action: Action,

    /// Failure message when `action = "fail"`.
    #[serde(default)]
    pub message: Option<String>,

    /// Simulated work time. The body polls for cancellation while it waits.
    #[serde(default)]
    pub duration_ms: u64,

    /// Direct dependencies: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Names of `[condition.<name>]` sections gating this task.
    #[serde(default)]
    pub conditions: Vec<String>,

    /// Exclusivity categories; tasks sharing one never overlap.
    #[serde(default)]
    pub exclusive: Vec<String>,

    #[serde(default)]
    pub intent: SchedulingIntent,

    /// Number of child tasks produced while executing.
    #[serde(default)]
    pub produce: usize,
}

impl TaskSpec {
    /// Message used when the task fails.
    pub fn failure_message(&self, name: &str) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| format!("task '{name}' failed"))
    }
}
