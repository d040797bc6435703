// src/config/mod.rs

//! Plan file loading and validation for taskgate.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a plan file from disk (`loader.rs`).
//! - Validate references and graph shape (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_plan_path, load_and_validate, load_from_path};
pub use model::{
    Action, ConditionSpec, EngineSection, Outcome, PlanFile, RawPlanFile, TaskSpec,
};
pub use validate::task_order;
