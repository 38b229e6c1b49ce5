//! Orchestration tools offered to the top-level agent.
//!
//! The top-level agent drives a session through six tools: `spawn_agent`,
//! `wait_for_agents`, `get_agent_status`, `cancel_agent`, `finish` and
//! `formulate_strategy`. A call is parsed once into a `CrewCall` and then
//! executed against the session's `WorkerPool`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::core::task::{TaskId, TaskRecord, TaskStatus};
use crate::error::{Error, Result};
use crate::orchestration::completion::{CompletionReport, ReportStatus};
use crate::orchestration::pool::WorkerPool;
use crate::orchestration::strategy::{formulate_strategy, StrategyRequest};
use crate::orchestration::synthesis::Synthesizer;
use crate::orchestration::tool::{ToolOutput, ToolSpec};

fn default_priority() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnArgs {
    pub task: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitArgs {
    /// `None` waits for every task.
    #[serde(default)]
    pub agent_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRef {
    pub agent_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishArgs {
    #[serde(default)]
    pub context: Option<String>,
}

/// A validated orchestration tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum CrewCall {
    SpawnAgent(SpawnArgs),
    WaitForAgents(WaitArgs),
    GetAgentStatus(AgentRef),
    CancelAgent(AgentRef),
    Finish(FinishArgs),
    FormulateStrategy(StrategyRequest),
}

impl CrewCall {
    /// Parse a call from a tool name and its JSON arguments.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for unknown tool names or arguments
    /// that do not match the tool's schema.
    pub fn parse(name: &str, arguments: Value) -> Result<Self> {
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        serde_json::from_value(json!({ "tool": name, "arguments": arguments }))
            .map_err(|e| Error::Validation(format!("invalid call to '{}': {}", name, e)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            CrewCall::SpawnAgent(_) => "spawn_agent",
            CrewCall::WaitForAgents(_) => "wait_for_agents",
            CrewCall::GetAgentStatus(_) => "get_agent_status",
            CrewCall::CancelAgent(_) => "cancel_agent",
            CrewCall::Finish(_) => "finish",
            CrewCall::FormulateStrategy(_) => "formulate_strategy",
        }
    }
}

/// The orchestration tools bound to one session.
#[derive(Debug)]
pub struct CrewToolbox {
    pool: WorkerPool,
    synthesizer: Synthesizer,
}

impl CrewToolbox {
    pub fn new(pool: WorkerPool, synthesizer: Synthesizer) -> Self {
        Self { pool, synthesizer }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Parse and execute a call in one step.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        let call = CrewCall::parse(name, arguments)?;
        self.execute(call).await
    }

    pub async fn execute(&self, call: CrewCall) -> Result<ToolOutput> {
        debug!(tool = call.name(), "executing crew tool");
        match call {
            CrewCall::SpawnAgent(args) => {
                let deps = args
                    .depends_on
                    .iter()
                    .map(|id| id.parse::<TaskId>())
                    .collect::<Result<Vec<_>>>()?;
                let id = self.pool.spawn(&args.task, args.priority, &deps)?;
                Ok(ToolOutput::Text(format!("Spawned {}: {}", id, args.task)))
            }
            CrewCall::WaitForAgents(args) => {
                let ids: Option<Vec<TaskId>> = args
                    .agent_ids
                    .map(|ids| ids.iter().filter_map(|id| id.parse().ok()).collect());
                let results = self.pool.wait_for(ids.as_deref()).await;
                if results.is_empty() {
                    return Ok(ToolOutput::Text("No agents to wait for.".to_string()));
                }
                let text = results
                    .values()
                    .map(render_outcome)
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(ToolOutput::Text(text))
            }
            CrewCall::GetAgentStatus(AgentRef { agent_id }) => {
                let record = agent_id
                    .parse::<TaskId>()
                    .ok()
                    .and_then(|id| self.pool.get_status(&id));
                match record {
                    Some(record) => Ok(ToolOutput::Text(serde_json::to_string_pretty(&record)?)),
                    None => Ok(ToolOutput::Text(format!("Agent {} not found.", agent_id))),
                }
            }
            CrewCall::CancelAgent(AgentRef { agent_id }) => {
                let cancelled = agent_id
                    .parse::<TaskId>()
                    .is_ok_and(|id| self.pool.cancel(&id));
                let text = if cancelled {
                    format!("Cancelled {}", agent_id)
                } else {
                    format!("Could not cancel {} (not running or not found)", agent_id)
                };
                Ok(ToolOutput::Text(text))
            }
            CrewCall::Finish(args) => {
                let summary = self
                    .synthesizer
                    .finish(&self.pool, args.context.as_deref())
                    .await?;
                let status = session_status(&self.pool.get_workers());
                Ok(ToolOutput::Complete(CompletionReport::new(status, summary)))
            }
            CrewCall::FormulateStrategy(request) => {
                Ok(ToolOutput::Text(formulate_strategy(&request)?))
            }
        }
    }

    /// Schemas of the six orchestration tools.
    pub fn specs(&self) -> Vec<ToolSpec> {
        crew_tool_specs()
    }
}

/// One `wait_for_agents` block, terminated by an empty line.
fn render_outcome(record: &TaskRecord) -> String {
    let mut lines = vec![
        format!("## {}: {}", record.id, record.description),
        format!("Status: {}", record.status),
    ];
    if !record.tools_used.is_empty() {
        lines.push(format!("Tools used: {}", record.tools_used.join(", ")));
    }
    if let Some(result) = record.result.as_deref().filter(|r| !r.is_empty()) {
        lines.push(format!("Result:\n{}", result));
    }
    if let Some(error) = record.error.as_deref().filter(|e| !e.is_empty()) {
        lines.push(format!("Error: {}", error));
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Overall status of a finished session.
fn session_status(workers: &[TaskRecord]) -> ReportStatus {
    let completed = workers
        .iter()
        .filter(|w| w.status == TaskStatus::Completed)
        .count();
    if completed == workers.len() {
        ReportStatus::Success
    } else if completed == 0 {
        ReportStatus::Failed
    } else {
        ReportStatus::Partial
    }
}

fn crew_tool_specs() -> Vec<ToolSpec> {
    let agent_id = |description: &str| {
        json!({
            "type": "object",
            "properties": {
                "agent_id": {
                    "type": "string",
                    "description": description,
                }
            },
            "required": ["agent_id"],
        })
    };

    vec![
        ToolSpec {
            name: "spawn_agent".to_string(),
            description: "Spawn a new agent to work on a specific task. Each agent runs \
                          independently with access to all worker tools."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "task": {
                        "type": "string",
                        "description": "Clear, action-oriented task description.",
                    },
                    "priority": {
                        "type": "integer",
                        "description": "Execution priority (higher = runs sooner). Default 1.",
                    },
                    "depends_on": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Agent IDs that must complete before this agent starts.",
                    },
                },
                "required": ["task"],
            }),
        },
        ToolSpec {
            name: "wait_for_agents".to_string(),
            description: "Wait for spawned agents to complete and retrieve their results."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "agent_ids": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Agent IDs to wait for. Omit to wait for all agents.",
                    }
                },
                "required": [],
            }),
        },
        ToolSpec {
            name: "get_agent_status".to_string(),
            description: "Check the current status of a specific agent.".to_string(),
            parameters: agent_id("The agent ID to check (e.g., 'agent-0')"),
        },
        ToolSpec {
            name: "cancel_agent".to_string(),
            description: "Cancel a pending or running agent.".to_string(),
            parameters: agent_id("The agent ID to cancel (e.g., 'agent-0')"),
        },
        ToolSpec {
            name: "finish".to_string(),
            description: "Complete the session. Waits for all agents, synthesizes their \
                          results and returns the final summary."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "context": {
                        "type": "string",
                        "description": "Optional context that frames the summary.",
                    }
                },
                "required": [],
            }),
        },
        ToolSpec {
            name: "formulate_strategy".to_string(),
            description: "Define and select a strategic course of action. Set feasible=false \
                          to terminate if no options exist."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "problem": {"type": "string"},
                    "feasible": {"type": "boolean", "default": true},
                    "candidates": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": {"type": "string"},
                                "name": {"type": "string"},
                                "pros": {"type": "string"},
                                "cons": {"type": "string"},
                                "risk": {
                                    "type": "string",
                                    "enum": ["Low", "Medium", "High", "Critical"],
                                },
                            },
                            "required": ["id", "name", "pros", "cons", "risk"],
                        },
                    },
                    "selected_id": {"type": "string"},
                    "rationale": {"type": "string"},
                },
                "required": ["problem", "rationale"],
            }),
        },
    ]
}
