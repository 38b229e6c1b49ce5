//! crew: an in-process orchestrator that fans a task out to concurrent
//! sub-agents and merges their results.

pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod plan;

pub use config::CrewConfig;
pub use error::{Error, Result};
pub use plan::{Plan, PlanTask};
