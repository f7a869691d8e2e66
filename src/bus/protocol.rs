//! Wire Protocol Definitions
//!
//! Defines the envelopes that cross process boundaries on the bus, and the
//! codec helpers shared by publishers and consumers. Task messages are
//! serialized `Task` values; status messages are serialized `TaskEvent`s;
//! control messages are `WorkerCommand`s.

use crate::error::Result;
use crate::task::types::TaskId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Control signal broadcast from the manager to every worker on the
/// WORKER_EVENT fanout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Request cooperative cancellation of one task. Workers observe the flag
    /// between units of work; acknowledgement comes back as a Cancelled event.
    Cancel { task_id: TaskId, requeue: bool },
    /// Global shutdown signal: suppliers stop consuming after the in-flight
    /// handler finishes.
    Shutdown,
}

/// Serializes a message into its bus payload.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// Deserializes a bus payload.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(payload)?)
}
