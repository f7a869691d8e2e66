//! Local Execution Module
//!
//! The non-distributed side of the task core: an in-process fallback executor
//! used when no message bus is configured, and the single-consumer loop
//! pattern used by long-running batch jobs.
//!
//! ## Submodules
//! - **`local`**: `LocalTaskRunner`, a bounded-parallelism executor over
//!   monitorable task handles.
//! - **`batch`**: `BatchLoop`, a poison-pill terminated processing loop over a
//!   shared job queue.

pub mod batch;
pub mod local;
