//! Task Lifecycle Events
//!
//! The closed set of events a worker (or the manager itself) can emit about a
//! task, and the single transition function that applies them to a stored
//! `Task`. Event application is the only way a persisted task mutates.

use super::types::{now_ms, Task, TaskError, TaskId, TaskState};
use serde::{Deserialize, Serialize};

/// Lifecycle event for a single task.
///
/// Shipped on the MANAGER_EVENT queue from workers to the manager. The set is
/// closed on purpose: every variant maps to exactly one state transition in
/// [`Task::apply`], so a new event kind cannot be introduced without extending
/// the transition function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEvent {
    /// The bus accepted the task message.
    Queued { task_id: TaskId },
    /// A worker reported progress in `[0, 1]`. The first progress event also
    /// acts as the start signal (`Queued -> Running`).
    Progress { task_id: TaskId, progress: f64 },
    /// The worker finished and produced a result.
    Result {
        task_id: TaskId,
        result: serde_json::Value,
    },
    /// The worker failed with a structured error.
    Error { task_id: TaskId, error: TaskError },
    /// The worker acknowledged a cancellation. With `requeue` the manager
    /// resurrects the task as freshly queued instead of marking it cancelled.
    Cancelled { task_id: TaskId, requeue: bool },
}

impl TaskEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            TaskEvent::Queued { task_id }
            | TaskEvent::Progress { task_id, .. }
            | TaskEvent::Result { task_id, .. }
            | TaskEvent::Error { task_id, .. }
            | TaskEvent::Cancelled { task_id, .. } => task_id,
        }
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskEvent::Queued { .. } => "queued",
            TaskEvent::Progress { .. } => "progress",
            TaskEvent::Result { .. } => "result",
            TaskEvent::Error { .. } => "error",
            TaskEvent::Cancelled { .. } => "cancelled",
        }
    }
}

/// Outcome of applying an event to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The task changed state; the new value must be persisted.
    Applied,
    /// The event was a no-op (stale, duplicate, or out of order) and the task
    /// is unchanged. The reason is meant for a log line, not an error.
    Dropped(&'static str),
}

impl Task {
    /// Applies one lifecycle event to this task.
    ///
    /// Terminal tasks absorb every event (first terminal event wins — the
    /// fixed tie-break for a cancellation racing a late result). Progress is
    /// clamped to `[0, 1]` and never decreases while running; a cancellation
    /// resets it to 0.
    pub fn apply(&mut self, event: &TaskEvent) -> Applied {
        if self.is_terminal() {
            return Applied::Dropped("task is terminal");
        }

        let applied = match event {
            TaskEvent::Queued { .. } => match self.state {
                TaskState::Created => {
                    self.state = TaskState::Queued;
                    Applied::Applied
                }
                TaskState::Queued => Applied::Dropped("already queued"),
                _ => Applied::Dropped("queued event after start"),
            },
            TaskEvent::Progress { progress, .. } => {
                self.state = TaskState::Running;
                let clamped = progress.clamp(0.0, 1.0);
                if clamped > self.progress {
                    self.progress = clamped;
                }
                Applied::Applied
            }
            TaskEvent::Result { result, .. } => {
                self.state = TaskState::Done;
                self.progress = 1.0;
                self.result = Some(result.clone());
                self.error = None;
                Applied::Applied
            }
            TaskEvent::Error { error, .. } => {
                self.state = TaskState::Error;
                self.error = Some(error.clone());
                self.result = None;
                Applied::Applied
            }
            TaskEvent::Cancelled { requeue: false, .. } => {
                self.state = TaskState::Cancelled;
                self.progress = 0.0;
                Applied::Applied
            }
            // Requeue: the task comes back as a fresh queued message, the
            // caller republishes it on the TASK queue.
            TaskEvent::Cancelled { requeue: true, .. } => {
                self.state = TaskState::Queued;
                self.progress = 0.0;
                self.result = None;
                self.error = None;
                Applied::Applied
            }
        };

        if applied == Applied::Applied {
            self.modified_at = now_ms();
        }
        applied
    }
}
