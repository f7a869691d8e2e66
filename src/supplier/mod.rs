//! Worker-Side Task Supplier Module
//!
//! Runs inside each worker process. The supplier consumes task messages from
//! the TASK queue, hands them to a caller-supplied handler, and publishes
//! progress/result/error/cancellation events back to the manager.
//!
//! ## Architecture Overview
//! 1. **Consumption**: One dedicated consumption loop per registered handler.
//!    Worker processes on the same queue compete for deliveries; no two
//!    workers receive the same task message.
//! 2. **Status events**: Each `progress`/`result`/`error`/`canceled` call
//!    publishes exactly one MANAGER_EVENT message, at-least-once.
//! 3. **Cancellation**: Control commands arrive on the WORKER_EVENT fanout and
//!    set a per-task flag; handlers observe it between units of work.
//!
//! ## Submodules
//! - **`supplier`**: The `TaskSupplier` consumption/publication component.
//! - **`registry`**: Maps task names to executable handler closures.

pub mod registry;
pub mod supplier;
