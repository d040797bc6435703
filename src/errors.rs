// src/errors.rs

//! Crate-wide error types.
//!
//! `TaskgateError` covers everything that can go wrong *around* tasks: loading
//! a plan, validating it, wiring the engine. Failures *of* tasks are plain
//! values ([`crate::task::TaskError`]) accumulated on the task itself.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskgateError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown {kind} referenced by '{from}': {name}")]
    UnknownReference {
        kind: &'static str,
        from: String,
        name: String,
    },

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskgateError>;
