//! Worker execution wrapper.
//!
//! A `Worker` drives one externally supplied `AgentLoop` for exactly one
//! task. Whatever the loop does (returns, errors, panics or observes a
//! cancellation) is folded into a `WorkerOutcome`; nothing escapes to the
//! scheduler.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::task::TaskId;
use crate::orchestration::llm::{ChatMessage, LlmClient, LlmResponse};
use crate::orchestration::tool::{Tool, ToolOutput, ToolSpec};

/// Why an agent loop stopped without a result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// Cancellation was observed at a yield point.
    #[error("cancelled")]
    Cancelled,
    /// Unrecoverable failure.
    #[error("{0}")]
    Failed(String),
}

impl AgentError {
    pub fn failed(msg: impl std::fmt::Display) -> Self {
        AgentError::Failed(msg.to_string())
    }
}

/// The per-task reasoning loop.
///
/// The orchestrator treats it as opaque: it decides which tools to call and
/// when, and eventually returns a result text or an `AgentError`. It should
/// reach its yield points through the `WorkerContext` so that cancellation
/// is honoured.
#[async_trait]
pub trait AgentLoop: Send + Sync {
    async fn run(&self, ctx: WorkerContext) -> Result<String, AgentError>;
}

/// Ordered log of tool names a worker invoked.
///
/// Shared between the worker and the pool so a running task's progress
/// is visible in status snapshots.
#[derive(Debug, Clone, Default)]
pub struct ToolLog(Arc<Mutex<Vec<String>>>);

impl ToolLog {
    pub fn record(&self, name: &str) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Handle given to an agent loop for the duration of one task.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    task_id: TaskId,
    description: String,
    cancel: CancellationToken,
    tools: ToolLog,
}

impl WorkerContext {
    pub fn new(
        task_id: TaskId,
        description: &str,
        cancel: CancellationToken,
        tools: ToolLog,
    ) -> Self {
        Self {
            task_id,
            description: description.to_string(),
            cancel,
            tools,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Yield point: fails with `AgentError::Cancelled` once cancellation was
    /// requested.
    pub fn checkpoint(&self) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            debug!(task_id = %self.task_id, "cancellation observed");
            return Err(AgentError::Cancelled);
        }
        Ok(())
    }

    /// Invoke a collaborator tool.
    ///
    /// Cancellation is checked before the call; a call already in flight is
    /// never interrupted.
    pub async fn call_tool(&self, tool: &dyn Tool, arguments: Value) -> Result<ToolOutput, AgentError> {
        self.checkpoint()?;
        self.tools.record(tool.name());
        debug!(task_id = %self.task_id, tool = tool.name(), "calling tool");
        Ok(tool.execute(arguments).await)
    }

    /// Call the LLM collaborator, checking cancellation first.
    pub async fn generate(
        &self,
        llm: &dyn LlmClient,
        system_prompt: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<LlmResponse, AgentError> {
        self.checkpoint()?;
        llm.generate(system_prompt, messages, tools)
            .await
            .map_err(AgentError::failed)
    }
}

/// How a worker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    Completed { result: String },
    Failed { error: String },
    Cancelled,
}

/// Final report of a worker, including the tools it used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub status: WorkerStatus,
    pub tools_used: Vec<String>,
}

/// Owns the execution of exactly one task.
pub struct Worker {
    task_id: TaskId,
    description: String,
    cancel: CancellationToken,
    tools: ToolLog,
    agent: Arc<dyn AgentLoop>,
}

impl Worker {
    pub fn new(
        task_id: TaskId,
        description: &str,
        cancel: CancellationToken,
        tools: ToolLog,
        agent: Arc<dyn AgentLoop>,
    ) -> Self {
        Self {
            task_id,
            description: description.to_string(),
            cancel,
            tools,
            agent,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Run the agent loop to completion.
    pub async fn execute(self) -> WorkerOutcome {
        let ctx = WorkerContext::new(
            self.task_id,
            &self.description,
            self.cancel.clone(),
            self.tools.clone(),
        );

        let run = AssertUnwindSafe(self.agent.run(ctx)).catch_unwind().await;

        let status = match run {
            Ok(Ok(result)) => WorkerStatus::Completed { result },
            Ok(Err(AgentError::Cancelled)) => WorkerStatus::Cancelled,
            Ok(Err(AgentError::Failed(error))) => WorkerStatus::Failed { error },
            Err(panic) => {
                let error = format!("worker panicked: {}", panic_message(panic.as_ref()));
                warn!(task_id = %self.task_id, %error, "agent loop panicked");
                WorkerStatus::Failed { error }
            }
        };

        WorkerOutcome {
            status,
            tools_used: self.tools.snapshot(),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
