//! Result synthesis.
//!
//! Ends an orchestration session: drains the pool, then asks the LLM to
//! merge every worker's output into one summary.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::CrewConfig;
use crate::core::task::TaskRecord;
use crate::error::{Error, Result};
use crate::orchestration::llm::{ChatMessage, LlmClient};
use crate::orchestration::pool::WorkerPool;

/// System instruction used for the synthesis call.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are synthesizing the results of delegated agent tasks. Be factual, clear, and concise.";

/// Returned when the session never spawned a task.
pub const NO_AGENTS_SUMMARY: &str = "Task completed. No agents were spawned.";

/// Returned when tasks ran but none produced a result or an error.
pub const NO_RESULTS_SUMMARY: &str = "Task completed. Agents ran but produced no results.";

const FALLBACK_CONTEXT: &str = "Delegated task completed.";

/// Merges worker outputs into a final summary.
pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    default_context: Option<String>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            default_context: None,
        }
    }

    pub fn from_config(config: &CrewConfig, llm: Arc<dyn LlmClient>) -> Self {
        let mut synthesizer = Self::new(llm);
        if let Some(prompt) = &config.synthesis_prompt {
            synthesizer.system_prompt = prompt.clone();
        }
        synthesizer.default_context = config.default_context.clone();
        synthesizer
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Wait for every task, then produce the session summary.
    ///
    /// When no task produced output the context (or a fixed sentence) is
    /// returned and the LLM is not called. Otherwise the LLM's answer is
    /// returned and its token usage is added to the pool's
    /// `finish_tokens`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Llm` if the synthesis call fails.
    pub async fn finish(&self, pool: &WorkerPool, context: Option<&str>) -> Result<String> {
        pool.wait_for(None).await;

        let context = context
            .filter(|c| !c.is_empty())
            .or(self.default_context.as_deref().filter(|c| !c.is_empty()));

        let workers = pool.get_workers();
        if workers.is_empty() {
            debug!("no tasks were spawned, skipping synthesis");
            return Ok(context.unwrap_or(NO_AGENTS_SUMMARY).to_string());
        }

        let blocks: Vec<String> = workers.iter().filter_map(render_block).collect();
        if blocks.is_empty() {
            debug!(tasks = workers.len(), "no task output, skipping synthesis");
            return Ok(context.unwrap_or(NO_RESULTS_SUMMARY).to_string());
        }

        let prompt = format!(
            "Synthesize these agent findings into a clear, concise summary.\n\n\
             Context: {}\n\n\
             Agent Results:\n{}\n\n\
             Provide a unified summary of what was accomplished and key findings.",
            context.unwrap_or(FALLBACK_CONTEXT),
            blocks.join("\n")
        );

        info!(tasks = workers.len(), blocks = blocks.len(), "synthesizing results");
        let response = self
            .llm
            .generate(&self.system_prompt, &[ChatMessage::user(prompt)], &[])
            .await
            .map_err(|e| {
                warn!(error = %e, "synthesis call failed");
                match e {
                    Error::Llm(msg) => Error::Llm(msg),
                    other => Error::Llm(other.to_string()),
                }
            })?;

        pool.add_finish_tokens(response.total_tokens());
        debug!(tokens = response.total_tokens(), "synthesis complete");

        Ok(response.content)
    }
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("system_prompt", &self.system_prompt)
            .field("default_context", &self.default_context)
            .finish_non_exhaustive()
    }
}

/// `## <id>: <task>` followed by the result, or by `Error: <error>`.
fn render_block(record: &TaskRecord) -> Option<String> {
    match (&record.result, &record.error) {
        (Some(result), _) if !result.is_empty() => Some(format!(
            "## {}: {}\n{}",
            record.id, record.description, result
        )),
        (_, Some(error)) if !error.is_empty() => Some(format!(
            "## {}: {}\nError: {}",
            record.id, record.description, error
        )),
        _ => None,
    }
}
