//! Message Bus Module
//!
//! The transport layer between the manager process and the worker processes.
//!
//! ## Architecture Overview
//! The bus follows a **declare-then-use** model:
//! 1. **Topology**: A fixed registry (`BusQueue`) names every exchange, queue
//!    and routing key, including the dead-letter pairing. It is declared once
//!    at process start and declaration is idempotent.
//! 2. **Publish**: Messages are serialized JSON payloads routed by queue entry.
//! 3. **Consume**: Direct queues load-balance deliveries across competing
//!    consumers (each message goes to exactly one); fanout queues broadcast to
//!    every consumer.
//! 4. **Dead-lettering**: A message rejected by a consumer is redirected to the
//!    paired dead-letter queue instead of being requeued indefinitely. Nothing
//!    drains dead-letter queues automatically.
//!
//! ## Submodules
//! - **`topology`**: The queue/exchange/routing-key registry.
//! - **`protocol`**: Wire envelopes (worker control commands) and codec helpers.
//! - **`broker`**: The `Broker` transport seam and the in-process
//!   `MemoryBroker` used for single-host deployments and tests.

pub mod broker;
pub mod protocol;
pub mod topology;

#[cfg(test)]
mod tests;
