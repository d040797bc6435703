use taskgate::config::{
    Action, ConditionSpec, EngineSection, Outcome, PlanFile, RawPlanFile, TaskSpec,
};
use taskgate::errors::Result;
use taskgate::types::SchedulingIntent;

/// Builder for `PlanFile` to simplify test setup.
pub struct PlanFileBuilder {
    plan: RawPlanFile,
}

impl PlanFileBuilder {
    pub fn new() -> Self {
        Self {
            plan: RawPlanFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskSpec) -> Self {
        self.plan.task.insert(name.to_string(), task);
        self
    }

    pub fn with_condition(mut self, name: &str, condition: ConditionSpec) -> Self {
        self.plan.condition.insert(name.to_string(), condition);
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.plan.engine.max_concurrency = n;
        self
    }

    pub fn cancel_dependents_on_failure(mut self, val: bool) -> Self {
        self.plan.engine.cancel_dependents_on_failure = val;
        self
    }

    pub fn engine(mut self, engine: EngineSection) -> Self {
        self.plan.engine = engine;
        self
    }

    pub fn raw(self) -> RawPlanFile {
        self.plan
    }

    pub fn try_build(self) -> Result<PlanFile> {
        PlanFile::try_from(self.plan)
    }

    pub fn build(self) -> PlanFile {
        self.try_build()
            .expect("Failed to build valid plan from builder")
    }
}

impl Default for PlanFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskSpec`.
pub struct TaskSpecBuilder {
    task: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskSpec::default(),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn condition(mut self, name: &str) -> Self {
        self.task.conditions.push(name.to_string());
        self
    }

    pub fn exclusive(mut self, category: &str) -> Self {
        self.task.exclusive.push(category.to_string());
        self
    }

    pub fn fail(mut self, message: &str) -> Self {
        self.task.action = Action::Fail;
        self.task.message = Some(message.to_string());
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.task.duration_ms = ms;
        self
    }

    pub fn intent(mut self, intent: SchedulingIntent) -> Self {
        self.task.intent = intent;
        self
    }

    pub fn produce(mut self, n: usize) -> Self {
        self.task.produce = n;
        self
    }

    pub fn build(self) -> TaskSpec {
        self.task
    }
}

impl Default for TaskSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ConditionSpec`.
pub struct ConditionSpecBuilder {
    condition: ConditionSpec,
}

impl ConditionSpecBuilder {
    pub fn passing() -> Self {
        Self {
            condition: ConditionSpec::default(),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            condition: ConditionSpec {
                outcome: Outcome::Fail,
                reason: Some(reason.to_string()),
                ..ConditionSpec::default()
            },
        }
    }

    pub fn after(mut self, task: &str) -> Self {
        self.condition.after = Some(task.to_string());
        self
    }

    pub fn deadline_ms(mut self, ms: u64) -> Self {
        self.condition.deadline_ms = Some(ms);
        self
    }

    pub fn build(self) -> ConditionSpec {
        self.condition
    }
}
