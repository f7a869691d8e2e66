//! Bus Topology Registry
//!
//! Enum that provides a registry for all used queues, exchanges and routing
//! keys, and the dead-letter wiring between them. Queue names are fixed at
//! compile time: deployments always agree on the topology without runtime
//! configuration.

use serde::{Deserialize, Serialize};

/// Exchange delivery semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeKind {
    /// Every consumer receives every message.
    Fanout,
    /// Messages are routed by key to one queue; consumers on that queue
    /// compete for deliveries.
    Direct,
}

/// The fixed registry of logical queues.
///
/// `Task` and `ManagerEvent` are each backed by a dead-letter queue of the
/// same shape; dead-letter queues themselves have none (one level of
/// redirection only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusQueue {
    /// Generic broadcast of applied lifecycle events (manager -> observers).
    Event,
    /// Overflow destination for undeliverable/rejected task messages.
    TaskDlq,
    /// Manager -> worker task dispatch (competing consumers).
    Task,
    /// Overflow destination for undeliverable/rejected status events.
    ManagerEventDlq,
    /// Worker -> manager task status events.
    ManagerEvent,
    /// Manager -> all workers control signals (cancellation, shutdown).
    WorkerEvent,
}

impl BusQueue {
    /// Every registry entry, in declaration order. Dead-letter queues come
    /// before the queues that point at them.
    pub const ALL: [BusQueue; 6] = [
        BusQueue::Event,
        BusQueue::TaskDlq,
        BusQueue::Task,
        BusQueue::ManagerEventDlq,
        BusQueue::ManagerEvent,
        BusQueue::WorkerEvent,
    ];

    pub fn exchange(&self) -> &'static str {
        match self {
            BusQueue::Event => "exchange.main.events",
            BusQueue::TaskDlq => "exchange.dlq.tasks",
            BusQueue::Task => "exchange.main.tasks",
            BusQueue::ManagerEventDlq => "exchange.dlq.manager-events",
            BusQueue::ManagerEvent => "exchange.main.manager-events",
            BusQueue::WorkerEvent => "exchange.main.worker-events",
        }
    }

    pub fn routing_key(&self) -> &'static str {
        match self {
            BusQueue::Event => "routing.main.events",
            BusQueue::TaskDlq => "routing.dlq.tasks",
            BusQueue::Task => "routing.main.tasks",
            BusQueue::ManagerEventDlq => "routing.dlq.manager-events",
            BusQueue::ManagerEvent => "routing.main.manager-events",
            BusQueue::WorkerEvent => "routing.main.worker-events",
        }
    }

    /// Deterministic durable queue name bound to the exchange.
    pub fn queue_name(&self) -> &'static str {
        match self {
            BusQueue::Event => "queue.main.events",
            BusQueue::TaskDlq => "queue.dlq.tasks",
            BusQueue::Task => "queue.main.tasks",
            BusQueue::ManagerEventDlq => "queue.dlq.manager-events",
            BusQueue::ManagerEvent => "queue.main.manager-events",
            BusQueue::WorkerEvent => "queue.main.worker-events",
        }
    }

    pub fn kind(&self) -> ExchangeKind {
        match self {
            BusQueue::Event | BusQueue::WorkerEvent => ExchangeKind::Fanout,
            BusQueue::TaskDlq
            | BusQueue::Task
            | BusQueue::ManagerEventDlq
            | BusQueue::ManagerEvent => ExchangeKind::Direct,
        }
    }

    /// The paired dead-letter queue, if this entry has one.
    pub fn dead_letter(&self) -> Option<BusQueue> {
        match self {
            BusQueue::Task => Some(BusQueue::TaskDlq),
            BusQueue::ManagerEvent => Some(BusQueue::ManagerEventDlq),
            _ => None,
        }
    }
}

impl std::fmt::Display for BusQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}: {}/{}]", self, self.exchange(), self.routing_key())
    }
}
