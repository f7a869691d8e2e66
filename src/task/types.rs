use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a task.
///
/// Wrapper around a UUID string assigned at creation and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generates a new random UUID v4-based TaskId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Represents the lifecycle state of a task.
///
/// Transitions follow a strict partial order:
/// `Created -> Queued -> Running -> {Done | Error | Cancelled}`, with
/// `Queued -> Cancelled` also allowed. `Done`, `Error` and `Cancelled` are
/// terminal; no event mutates a terminal task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskState {
    /// Task was created by the manager but not yet accepted by the bus.
    Created,
    /// The bus accepted the task message; no worker picked it up yet.
    Queued,
    /// A worker is processing the task. Progress updates arrive in this state.
    Running,
    /// Task finished successfully. `result` is set.
    Done,
    /// Task execution failed. `error` is set.
    Error,
    /// Task was cancelled. Progress is reset to 0.
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Error | TaskState::Cancelled)
    }
}

/// Structured failure description shipped from a worker to the manager.
///
/// Carries the failure message plus an optional cause chain, so the manager
/// side keeps the same diagnostic depth the worker saw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<TaskError>>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: TaskError) -> Self {
        Self {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Builds the full cause chain from an `anyhow` error.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let mut messages: Vec<String> = err.chain().map(|cause| cause.to_string()).collect();
        // Wrap from the innermost cause outwards
        let mut error = TaskError::new(messages.pop().unwrap_or_default());
        while let Some(message) = messages.pop() {
            error = TaskError::with_cause(message, error);
        }
        error
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

/// The definition and live state of a unit of work.
///
/// `name` identifies the handler type on the worker side; `args` is the
/// argument mapping handed to that handler. Exactly one of `result`/`error`
/// is set once the task leaves `Running`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub user: String,
    pub args: HashMap<String, serde_json::Value>,
    pub state: TaskState,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub created_at: u64,
    pub modified_at: u64,
}

impl Task {
    /// Creates a task in the `Created` state with a fresh id.
    pub fn new(
        name: impl Into<String>,
        user: impl Into<String>,
        args: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: TaskId::new(),
            name: name.into(),
            user: user.into(),
            args,
            state: TaskState::Created,
            progress: 0.0,
            result: None,
            error: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
