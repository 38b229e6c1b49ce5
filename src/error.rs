use thiserror::Error;

use crate::core::task::TaskStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown dependency: {0}")]
    UnknownDependency(String),

    #[error("Dependency of {task} on {dependency} would create a cycle")]
    DependencyCycle { task: String, dependency: String },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Invalid task id: {0}")]
    InvalidTaskId(String),

    #[error("LLM error: {0}")]
    Llm(String),
}

pub type Result<T> = std::result::Result<T, Error>;
