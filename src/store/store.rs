//! Task Store Contract
//!
//! Access contract: `put`, `get`, `remove`, `values` are safe under
//! single-writer/multi-reader concurrency. Values are serialized tasks; the
//! codec preserves the result-vs-error discriminated union and rejects
//! payloads it cannot deserialize instead of silently truncating state.

use crate::error::{Error, Result};
use crate::task::types::{Task, TaskId};
use async_trait::async_trait;

/// Durable mapping of task id to serialized task.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts or replaces the task under its id.
    async fn put(&self, task: &Task) -> Result<()>;

    /// Reads one task. Fails fast on a corrupt payload.
    async fn get(&self, id: &TaskId) -> Result<Option<Task>>;

    /// Removes and returns one task.
    async fn remove(&self, id: &TaskId) -> Result<Option<Task>>;

    /// Snapshot of every stored task. A corrupt entry is skipped with an
    /// error log; it must not abort the scan of the other tasks.
    async fn values(&self) -> Result<Vec<Task>>;

    /// Empties the store. Destructive, meant for test/reset flows.
    async fn clear(&self) -> Result<()>;
}

/// Serializes a task for storage.
pub fn encode_task(task: &Task) -> Result<String> {
    Ok(serde_json::to_string(task)?)
}

/// Deserializes a stored payload, tagging the failing id on error.
pub fn decode_task(id: &str, payload: &str) -> Result<Task> {
    serde_json::from_str(payload).map_err(|source| Error::Codec {
        id: id.to_string(),
        source,
    })
}
