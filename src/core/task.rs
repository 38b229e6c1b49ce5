//! Task record data model.
//!
//! A `TaskRecord` is the passive record of one unit of delegated work. The
//! pool owns every record; workers only report outcomes back through it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const ID_PREFIX: &str = "agent-";

/// Identifier of a task within one orchestration session.
///
/// Ids come from a monotonically increasing sequence and render as
/// `agent-<n>`. Ordering follows the sequence, so sorting by id is the
/// same as sorting by spawn order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(u64);

impl TaskId {
    /// Build the id for the given spawn sequence number.
    pub fn from_seq(seq: u64) -> Self {
        Self(seq)
    }

    /// The spawn sequence number behind this id.
    pub fn seq(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", ID_PREFIX, self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // Only the canonical spelling is accepted, so one task has one id.
        s.trim()
            .strip_prefix(ID_PREFIX)
            .and_then(|n| n.parse::<u64>().ok().filter(|seq| seq.to_string() == n))
            .map(Self)
            .ok_or_else(|| Error::InvalidTaskId(s.to_string()))
    }
}

impl TryFrom<String> for TaskId {
    type Error = Error;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.to_string()
    }
}

/// Task status in its lifecycle.
///
/// `Pending` is the only initial state. `Completed`, `Failed`, `Cancelled`
/// and `Blocked` are terminal and never left again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Registered, waiting for dependencies or a free worker slot.
    #[default]
    Pending,
    /// A worker is executing the task.
    Running,
    /// The worker produced a result.
    Completed,
    /// The worker hit an unrecoverable error.
    Failed,
    /// Cancelled before starting, or cancellation acknowledged by the worker.
    Cancelled,
    /// A dependency failed or was cancelled; the task will never run.
    Blocked,
}

impl TaskStatus {
    /// Check if the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Blocked
        )
    }

    /// Check if a dependent of a task in this status must be blocked.
    pub fn blocks_dependents(&self) -> bool {
        matches!(
            self,
            TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Blocked
        )
    }

    fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Pending, Blocked)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// One unit of delegated work.
///
/// `id`, `description`, `priority` and `dependencies` are fixed at spawn
/// time. The remaining fields only change through the transition methods,
/// which enforce the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// What the worker is asked to do.
    pub description: String,
    /// Higher runs sooner.
    pub priority: i32,
    /// Tasks that must complete before this one may start.
    pub dependencies: Vec<TaskId>,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Output of a successful run.
    pub result: Option<String>,
    /// Why the task failed or was blocked.
    pub error: Option<String>,
    /// Tool names invoked by the worker, in call order.
    pub tools_used: Vec<String>,
    /// When the task was spawned.
    pub created_at: DateTime<Utc>,
    /// When a worker was launched for the task.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Create a pending record.
    pub fn new(id: TaskId, description: &str, priority: i32, dependencies: Vec<TaskId>) -> Self {
        Self {
            id,
            description: description.to_string(),
            priority,
            dependencies,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            tools_used: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Transition `pending → running`.
    pub fn start(&mut self) -> Result<()> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Transition `running → completed`, storing the result.
    pub fn complete(&mut self, result: String, tools_used: Vec<String>) -> Result<()> {
        self.transition(TaskStatus::Completed)?;
        self.result = Some(result);
        self.error = None;
        self.tools_used = tools_used;
        self.finish();
        Ok(())
    }

    /// Transition `running → failed`, storing the error.
    pub fn fail(&mut self, error: &str, tools_used: Vec<String>) -> Result<()> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.to_string());
        self.tools_used = tools_used;
        self.finish();
        Ok(())
    }

    /// Transition to `cancelled` from `pending` or `running`.
    ///
    /// Tools recorded before the cancellation was observed are kept.
    pub fn cancel(&mut self, tools_used: Vec<String>) -> Result<()> {
        self.transition(TaskStatus::Cancelled)?;
        self.tools_used = tools_used;
        self.finish();
        Ok(())
    }

    /// Transition `pending → blocked`.
    pub fn block(&mut self, reason: &str) -> Result<()> {
        self.transition(TaskStatus::Blocked)?;
        self.error = Some(reason.to_string());
        self.finish();
        Ok(())
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if the task has produced output worth reporting.
    pub fn has_output(&self) -> bool {
        self.result.as_deref().is_some_and(|r| !r.is_empty())
            || self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}
