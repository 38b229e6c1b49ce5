//! Orchestration layer.
//!
//! Runs delegated tasks on concurrent workers, lets the caller wait for
//! and cancel them, and synthesizes their results when the session ends.

pub mod completion;
pub mod llm;
pub mod pool;
mod scheduler;
pub mod strategy;
pub mod synthesis;
pub mod tool;
pub mod toolbox;
pub mod worker;

pub use completion::{CompletionReport, FinishTool, ReportStatus};
pub use llm::{ChatMessage, LlmClient, LlmResponse, Role, Usage};
pub use pool::{WorkerPool, DEFAULT_MAX_CONCURRENT};
pub use strategy::{formulate_strategy, Candidate, Risk, StrategyRequest};
pub use synthesis::{Synthesizer, DEFAULT_SYSTEM_PROMPT, NO_AGENTS_SUMMARY, NO_RESULTS_SUMMARY};
pub use tool::{Tool, ToolOutput, ToolSpec};
pub use toolbox::{CrewCall, CrewToolbox};
pub use worker::{AgentError, AgentLoop, ToolLog, Worker, WorkerContext, WorkerOutcome, WorkerStatus};
