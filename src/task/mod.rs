//! Task Entity and Lifecycle Module
//!
//! Defines the unit of work moved between the manager and the workers, its
//! state machine, and the closed set of lifecycle events that drive it.
//!
//! ## Architecture Overview
//! A `Task` is created by the manager, serialized onto the bus, executed by a
//! worker, and mutated afterwards **only** by applying `TaskEvent`s — never by
//! overwriting the stored value from scratch. This keeps result/error history
//! intact when events arrive duplicated or out of order.
//!
//! ## Submodules
//! - **`types`**: `Task`, `TaskId`, `TaskState` and the structured `TaskError`.
//! - **`event`**: The `TaskEvent` tagged union and the single exhaustive
//!   transition function (`Task::apply`).

pub mod event;
pub mod types;

#[cfg(test)]
mod tests;
