//! Crate Error Type
//!
//! Groups the failure modes of the task core: transport errors from the bus,
//! store access/codec errors, and lookups of unknown tasks.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The requested task id is not present in the store.
    #[error("task {0} not found")]
    TaskNotFound(String),

    /// A queue was used before the topology registry declared it.
    #[error("queue {0} is not declared")]
    UnknownQueue(String),

    /// The queue exists but no longer accepts or yields messages.
    #[error("queue {0} is closed")]
    QueueClosed(String),

    /// A stored task payload could not be deserialized. Fatal for that single
    /// read only; bulk scans skip the entry.
    #[error("cannot decode stored task {id}: {source}")]
    Codec {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// Wire-level encode/decode failure.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Store backend failure.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Internal(String),
}
