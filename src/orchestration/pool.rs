//! Worker pool for multi-agent management.
//!
//! The `WorkerPool` owns every task record of an orchestration session. It
//! admits tasks (`spawn`), answers status queries, forwards cancellation
//! requests and lets callers wait for tasks to finish. Launching workers
//! is left to the scheduling loop in `scheduler.rs`, which the pool wakes
//! through a channel whenever the task set changes.
//!
//! All status transitions happen under a single mutex. It is never held
//! across an `.await`, so `spawn`, `cancel` and `get_status` do not suspend.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::CrewConfig;
use crate::core::dag::DependencyGraph;
use crate::core::task::{TaskId, TaskRecord, TaskStatus};
use crate::error::{Error, Result};
use crate::orchestration::scheduler::{Scheduler, SchedulerEvent};
use crate::orchestration::worker::{AgentLoop, ToolLog};

/// Default maximum number of concurrently running workers.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Bookkeeping for a task that currently has a worker.
pub(crate) struct RunningTask {
    pub(crate) cancel: CancellationToken,
    pub(crate) tools: ToolLog,
}

/// Everything guarded by the pool's critical section.
#[derive(Default)]
pub(crate) struct PoolState {
    pub(crate) records: BTreeMap<TaskId, TaskRecord>,
    pub(crate) graph: DependencyGraph,
    pub(crate) running: HashMap<TaskId, RunningTask>,
    pub(crate) next_seq: u64,
}

impl PoolState {
    /// Copy of a record, with the live tool log of a running worker.
    fn snapshot(&self, id: &TaskId) -> Option<TaskRecord> {
        let mut record = self.records.get(id)?.clone();
        if let Some(running) = self.running.get(id) {
            record.tools_used = running.tools.snapshot();
        }
        Some(record)
    }
}

/// State shared between the pool handles, the scheduler and the workers.
pub(crate) struct Shared {
    pub(crate) state: Mutex<PoolState>,
    /// One permit per worker slot.
    pub(crate) permits: Arc<Semaphore>,
    pub(crate) agent: Arc<dyn AgentLoop>,
    pub(crate) session_id: Uuid,
    max_concurrent: usize,
    events: mpsc::UnboundedSender<SchedulerEvent>,
    /// Bumped on every status change that can satisfy a waiter.
    progress: watch::Sender<u64>,
    finish_tokens: AtomicU64,
}

impl Shared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notify_progress(&self) {
        self.progress.send_modify(|version| *version += 1);
    }

    pub(crate) fn notify_scheduler(&self, event: SchedulerEvent) {
        // The receiver only goes away with the runtime.
        let _ = self.events.send(event);
    }
}

/// Manages the tasks and workers of one orchestration session.
///
/// Cloning a `WorkerPool` yields another handle to the same session.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use crew::orchestration::WorkerPool;
///
/// let pool = WorkerPool::new(3, Arc::new(MyAgentLoop));
/// let scan = pool.spawn("Scan ports on 10.0.0.5", 5, &[])?;
/// let report = pool.spawn("Summarize exposed services", 1, &[scan])?;
/// let outcomes = pool.wait_for(Some(&[report])).await;
/// ```
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Create a pool and start its scheduling loop.
    ///
    /// Must be called from within a Tokio runtime. A `max_concurrent` of
    /// zero selects `DEFAULT_MAX_CONCURRENT`.
    pub fn new(max_concurrent: usize, agent: Arc<dyn AgentLoop>) -> Self {
        let limit = if max_concurrent == 0 {
            DEFAULT_MAX_CONCURRENT
        } else {
            max_concurrent
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (progress, _) = watch::channel(0);

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState::default()),
            permits: Arc::new(Semaphore::new(limit)),
            agent,
            session_id: Uuid::new_v4(),
            max_concurrent: limit,
            events: events_tx,
            progress,
            finish_tokens: AtomicU64::new(0),
        });

        info!(session = %shared.session_id, max_concurrent = limit, "WorkerPool created");
        Scheduler::new(&shared, events_rx).spawn();

        Self { shared }
    }

    /// Create a pool sized from configuration.
    pub fn from_config(config: &CrewConfig, agent: Arc<dyn AgentLoop>) -> Self {
        Self::new(config.max_concurrent, agent)
    }

    /// Maximum number of concurrently running workers.
    pub fn max_concurrent(&self) -> usize {
        self.shared.max_concurrent
    }

    /// Register a new task and return its id without waiting for it to run.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the description is empty, or if a
    /// dependency is unknown or would form a cycle. A rejected task is
    /// never added to the pool.
    pub fn spawn(&self, description: &str, priority: i32, dependencies: &[TaskId]) -> Result<TaskId> {
        if description.trim().is_empty() {
            return Err(Error::Validation("task description is required".to_string()));
        }

        let mut deps: Vec<TaskId> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !deps.contains(dep) {
                deps.push(*dep);
            }
        }

        let task_id = {
            let mut guard = self.shared.lock_state();
            let state = &mut *guard;
            let task_id = TaskId::from_seq(state.next_seq);
            state.graph.admit(task_id, &deps)?;
            state
                .records
                .insert(task_id, TaskRecord::new(task_id, description, priority, deps));
            state.next_seq += 1;
            task_id
        };

        info!(task_id = %task_id, priority, "task spawned");
        self.shared
            .notify_scheduler(SchedulerEvent::TaskSpawned(task_id));
        Ok(task_id)
    }

    /// Wait until the given tasks, or every task when `ids` is `None`,
    /// reach a terminal status.
    ///
    /// Unknown ids are ignored. With `None`, tasks spawned while waiting
    /// are waited for as well.
    pub async fn wait_for(&self, ids: Option<&[TaskId]>) -> BTreeMap<TaskId, TaskRecord> {
        let mut progress = self.shared.progress.subscribe();

        loop {
            {
                let state = self.shared.lock_state();
                let targets: Vec<TaskId> = match ids {
                    Some(ids) => ids
                        .iter()
                        .filter(|id| state.records.contains_key(*id))
                        .copied()
                        .collect(),
                    None => state.records.keys().copied().collect(),
                };

                let done = targets
                    .iter()
                    .all(|id| state.records.get(id).is_some_and(TaskRecord::is_terminal));

                if done {
                    return targets
                        .iter()
                        .filter_map(|id| state.snapshot(id).map(|r| (*id, r)))
                        .collect();
                }
            }

            debug!("waiting for tasks to finish");
            if progress.changed().await.is_err() {
                // Sender lives in `shared`, which we hold; unreachable in practice.
                return BTreeMap::new();
            }
        }
    }

    /// Current state of a task, without waiting.
    pub fn get_status(&self, id: &TaskId) -> Option<TaskRecord> {
        self.shared.lock_state().snapshot(id)
    }

    /// Request cancellation of a task.
    ///
    /// A pending task is cancelled immediately and will never run. For a
    /// running task the worker's cancellation flag is raised; the worker
    /// stops at its next yield point. Returns `false` for unknown or
    /// already finished tasks.
    pub fn cancel(&self, id: &TaskId) -> bool {
        let mut guard = self.shared.lock_state();
        let state = &mut *guard;

        let Some(record) = state.records.get_mut(id) else {
            return false;
        };

        match record.status {
            TaskStatus::Pending => {
                if record.cancel(Vec::new()).is_err() {
                    return false;
                }
                drop(guard);
                info!(task_id = %id, "pending task cancelled");
                self.shared.notify_progress();
                self.shared
                    .notify_scheduler(SchedulerEvent::TaskCancelled(*id));
                true
            }
            TaskStatus::Running => match state.running.get(id) {
                Some(running) => {
                    running.cancel.cancel();
                    info!(task_id = %id, "cancellation requested");
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Every registered task, in spawn order.
    pub fn get_workers(&self) -> Vec<TaskRecord> {
        let state = self.shared.lock_state();
        state
            .records
            .keys()
            .filter_map(|id| state.snapshot(id))
            .collect()
    }

    /// Number of tasks with a running worker.
    pub fn active_count(&self) -> usize {
        self.shared.lock_state().running.len()
    }

    /// Tokens spent by the final synthesis call(s).
    pub fn finish_tokens(&self) -> u64 {
        self.shared.finish_tokens.load(Ordering::SeqCst)
    }

    /// Add to the synthesis token accumulator.
    pub fn add_finish_tokens(&self, tokens: u64) {
        self.shared.finish_tokens.fetch_add(tokens, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock_state();
        f.debug_struct("WorkerPool")
            .field("session", &self.shared.session_id)
            .field("max_concurrent", &self.shared.max_concurrent)
            .field("tasks", &state.records.len())
            .field("running", &state.running.len())
            .finish()
    }
}
