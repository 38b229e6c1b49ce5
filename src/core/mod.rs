//! Core domain models for crew orchestration.
//!
//! This module contains the task record and the dependency graph that
//! decides which tasks may start and which can never run.

pub mod dag;
pub mod task;

pub use dag::DependencyGraph;
pub use task::{TaskId, TaskRecord, TaskStatus};
