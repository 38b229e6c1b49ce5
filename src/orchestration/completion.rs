//! Structured completion reports.
//!
//! An agent loop ends by calling the `finish` tool, which turns its
//! arguments into a `CompletionReport` and hands it back as
//! `ToolOutput::Complete`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;
use crate::orchestration::tool::{Tool, ToolOutput, ToolSpec};

/// Overall outcome claimed by a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// All objectives met.
    #[default]
    Success,
    /// Some objectives met.
    Partial,
    /// Unable to complete.
    Failed,
}

impl ReportStatus {
    fn icon(&self) -> &'static str {
        match self {
            ReportStatus::Success => "✓",
            ReportStatus::Partial => "◐",
            ReportStatus::Failed => "✗",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReportStatus::Success => "success",
            ReportStatus::Partial => "partial",
            ReportStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Structured report of what a task accomplished.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompletionReport {
    pub status: ReportStatus,
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl CompletionReport {
    pub fn new(status: ReportStatus, summary: impl Into<String>) -> Self {
        Self {
            status,
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Human-readable rendering; empty sections are omitted.
    pub fn format_display(&self) -> String {
        let mut lines = vec![
            format!(
                "{} Status: {}",
                self.status.icon(),
                self.status.to_string().to_uppercase()
            ),
            String::new(),
            format!("Summary: {}", self.summary),
        ];

        let sections = [
            ("Findings", "•", &self.findings),
            ("Artifacts", "-", &self.artifacts),
            ("Recommendations", "→", &self.recommendations),
        ];
        for (title, bullet, items) in sections {
            if items.is_empty() {
                continue;
            }
            lines.push(String::new());
            lines.push(format!("{}:", title));
            lines.extend(items.iter().map(|item| format!("  {} {}", bullet, item)));
        }

        lines.join("\n")
    }
}

/// The `finish` tool offered to worker agent loops.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinishTool;

#[derive(Debug, Deserialize)]
struct FinishArgs {
    #[serde(default)]
    status: ReportStatus,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    findings: Vec<String>,
    #[serde(default)]
    artifacts: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
}

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &str {
        "finish"
    }

    fn spec(&self) -> ToolSpec {
        let list = |description: &str| {
            json!({
                "type": "array",
                "items": {"type": "string"},
                "description": description,
            })
        };
        ToolSpec {
            name: self.name().to_string(),
            description: "Signal that the current task is finished. Call this once every step of \
                          the task is done, with a structured report of what was accomplished."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "status": {
                        "type": "string",
                        "enum": ["success", "partial", "failed"],
                        "description": "Overall task status",
                    },
                    "summary": {
                        "type": "string",
                        "description": "Brief summary of what was accomplished",
                    },
                    "findings": list("Key findings or observations"),
                    "artifacts": list("Files created while working"),
                    "recommendations": list("Suggested follow-up actions"),
                },
                "required": ["status", "summary"],
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolOutput {
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        match serde_json::from_value::<FinishArgs>(arguments) {
            Ok(args) => ToolOutput::Complete(CompletionReport {
                status: args.status,
                summary: args.summary.unwrap_or_else(|| "Task completed.".to_string()),
                findings: args.findings,
                artifacts: args.artifacts,
                recommendations: args.recommendations,
            }),
            Err(e) => ToolOutput::Text(format!("Error: invalid finish arguments: {}", e)),
        }
    }
}
