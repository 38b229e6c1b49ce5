//! Scheduling loop for the worker pool.
//!
//! The scheduler reacts to pool events (a task was spawned, cancelled or
//! finished) by making one dispatch pass:
//!
//! 1. Pending tasks whose dependencies can no longer complete are marked
//!    `Blocked`, transitively.
//! 2. Ready tasks are launched in priority order (ties by spawn order)
//!    while a worker slot is free.
//!
//! Workers report back through `handle_outcome`, which records the result
//! and wakes the scheduler again.

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::core::task::{TaskId, TaskStatus};
use crate::orchestration::pool::{PoolState, RunningTask, Shared};
use crate::orchestration::worker::{ToolLog, Worker, WorkerOutcome, WorkerStatus};

/// Pool events that may change what can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SchedulerEvent {
    TaskSpawned(TaskId),
    TaskCancelled(TaskId),
    TaskFinished(TaskId),
}

/// Background loop that launches workers for ready tasks.
///
/// Holds only a weak reference to the pool, so it shuts down once every
/// pool handle and worker is gone.
pub(crate) struct Scheduler {
    shared: Weak<Shared>,
    events: mpsc::UnboundedReceiver<SchedulerEvent>,
}

impl Scheduler {
    pub(crate) fn new(shared: &Arc<Shared>, events: mpsc::UnboundedReceiver<SchedulerEvent>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            events,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            debug!(?event, "scheduler event");

            // Coalesce a burst of events into one pass.
            while self.events.try_recv().is_ok() {}

            let Some(shared) = self.shared.upgrade() else {
                break;
            };
            dispatch_ready_tasks(&shared);
        }
        debug!("scheduler stopped");
    }
}

/// Block unrunnable tasks and launch as many ready tasks as there are free
/// slots. Returns the number of workers launched.
pub(crate) fn dispatch_ready_tasks(shared: &Arc<Shared>) -> usize {
    let mut launched: Vec<(Worker, OwnedSemaphorePermit)> = Vec::new();

    let blocked = {
        let mut guard = shared.lock_state();
        let state = &mut *guard;
        let blocked = block_unrunnable(state);

        for task_id in state.graph.ready_tasks(&state.records) {
            let Ok(permit) = Arc::clone(&shared.permits).try_acquire_owned() else {
                debug!(task_id = %task_id, "no free worker slot");
                break;
            };
            let Some(record) = state.records.get_mut(&task_id) else {
                continue;
            };
            if let Err(e) = record.start() {
                warn!(task_id = %task_id, error = %e, "could not start task");
                continue;
            }

            let cancel = CancellationToken::new();
            let tools = ToolLog::default();
            let worker = Worker::new(
                task_id,
                &record.description,
                cancel.clone(),
                tools.clone(),
                Arc::clone(&shared.agent),
            );
            info!(task_id = %task_id, priority = record.priority, "launching worker");

            state.running.insert(task_id, RunningTask { cancel, tools });
            launched.push((worker, permit));
        }

        blocked
    };

    if blocked > 0 || !launched.is_empty() {
        shared.notify_progress();
    }

    let count = launched.len();
    for (worker, permit) in launched {
        let span = info_span!("worker", session = %shared.session_id, task_id = %worker.task_id());
        tokio::spawn(run_worker(Arc::clone(shared), worker, permit).instrument(span));
    }
    count
}

/// Mark every pending task with a failed, cancelled or blocked ancestor as
/// `Blocked`. Returns how many tasks changed.
fn block_unrunnable(state: &mut PoolState) -> usize {
    let blocked = state.graph.blocked_tasks(&state.records);

    for (task_id, cause) in &blocked {
        let cause_status = state
            .records
            .get(cause)
            .map(|r| r.status)
            .unwrap_or(TaskStatus::Blocked);
        let reason = format!("dependency {} {}", cause, describe_cause(cause_status));

        if let Some(record) = state.records.get_mut(task_id) {
            match record.block(&reason) {
                Ok(()) => info!(task_id = %task_id, %reason, "task blocked"),
                Err(e) => warn!(task_id = %task_id, error = %e, "could not block task"),
            }
        }
    }

    blocked.len()
}

fn describe_cause(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "was cancelled",
        _ => "is blocked",
    }
}

async fn run_worker(shared: Arc<Shared>, worker: Worker, permit: OwnedSemaphorePermit) {
    let task_id = worker.task_id();
    let outcome = worker.execute().await;

    handle_outcome(&shared, task_id, outcome);
    drop(permit);

    shared.notify_progress();
    shared.notify_scheduler(SchedulerEvent::TaskFinished(task_id));
}

/// Record a worker's outcome on its task.
fn handle_outcome(shared: &Shared, task_id: TaskId, outcome: WorkerOutcome) {
    let mut guard = shared.lock_state();
    let state = &mut *guard;
    state.running.remove(&task_id);

    let Some(record) = state.records.get_mut(&task_id) else {
        warn!(task_id = %task_id, "outcome for unknown task");
        return;
    };

    let WorkerOutcome { status, tools_used } = outcome;
    let applied = match status {
        WorkerStatus::Completed { result } => {
            info!(task_id = %task_id, tools = tools_used.len(), "task completed");
            record.complete(result, tools_used)
        }
        WorkerStatus::Failed { error } => {
            warn!(task_id = %task_id, %error, "task failed");
            record.fail(&error, tools_used)
        }
        WorkerStatus::Cancelled => {
            info!(task_id = %task_id, "task cancelled");
            record.cancel(tools_used)
        }
    };

    if let Err(e) = applied {
        warn!(task_id = %task_id, error = %e, "could not record outcome");
    }
}
