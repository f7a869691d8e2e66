//! Task Manager Module
//!
//! The manager process side of the task core: issues tasks, owns the
//! authoritative task store, and applies the status events coming back from
//! the workers.
//!
//! ## Architecture Overview
//! 1. **Submission**: `start_task` persists a `Created` task, publishes it on
//!    the TASK queue and returns immediately (fire-and-forget).
//! 2. **Event application**: A single dedicated loop drains MANAGER_EVENT and
//!    applies each event to the stored task. Unknown or terminal-task events
//!    are dropped with a warning, never raised.
//! 3. **Cancellation**: `stop_task` broadcasts a control command on
//!    WORKER_EVENT and optimistically marks the task cancelled; worker-side
//!    interruption is cooperative and best-effort.
//!
//! A manager instance owns exactly one MANAGER_EVENT consumer. Concurrent
//! managers over the same store are not supported.

pub mod manager;
