//! Collaborator tool interface.
//!
//! Tools are the external capabilities a worker's agent loop can invoke
//! (code search, file access, ...). Their implementations live outside the
//! orchestrator; only the contract is defined here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::orchestration::completion::CompletionReport;

/// Schema advertised to the model for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool arguments.
    pub parameters: Value,
}

/// What a tool invocation produced.
///
/// Finishing is an explicit variant so that loop termination never depends
/// on the text a tool happens to print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolOutput {
    /// Ordinary tool output, including error descriptions.
    Text(String),
    /// The agent declared its task finished.
    Complete(CompletionReport),
}

impl ToolOutput {
    /// The completion report, if this output ends the agent loop.
    pub fn completion(&self) -> Option<&CompletionReport> {
        match self {
            ToolOutput::Complete(report) => Some(report),
            ToolOutput::Text(_) => None,
        }
    }

    /// Text to feed back to the model.
    pub fn to_text(&self) -> String {
        match self {
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Complete(report) => report.format_display(),
        }
    }
}

/// A collaborator tool.
///
/// `execute` never fails: problems are reported as `ToolOutput::Text`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn spec(&self) -> ToolSpec;

    async fn execute(&self, arguments: Value) -> ToolOutput;
}
