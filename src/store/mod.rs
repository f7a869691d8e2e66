//! Task Store Module
//!
//! The durable key -> serialized-Task mapping the manager uses as the single
//! source of truth for task state. Tasks must survive a manager restart while
//! workers are still processing them.
//!
//! ## Ownership
//! The manager process is the sole writer; workers never touch the store, they
//! only publish events. Reads may happen concurrently from API threads.
//!
//! ## Submodules
//! - **`store`**: The `TaskStore` trait and the shared JSON codec.
//! - **`memory`**: Concurrent in-memory implementation (tests, bus-less runs).
//! - **`sqlite`**: Durable SQLite-backed implementation.

pub mod memory;
pub mod sqlite;
pub mod store;
