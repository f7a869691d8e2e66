//! Broker Transport
//!
//! The `Broker` trait is the seam between the task core and the message
//! transport. The shipped implementation is `MemoryBroker`, an in-process
//! broker backed by tokio channels: direct queues are bounded mpsc channels
//! with a shared receiver (competing consumers), fanout queues are broadcast
//! channels. Wire-level transports for multi-host deployments implement the
//! same trait and must honor the same semantics:
//!
//! - declaring the topology twice must not error or duplicate bindings;
//! - a direct message is delivered to exactly one consumer, in publish order;
//! - a rejected message goes to the paired dead-letter queue, never back to
//!   the origin queue.

use super::topology::{BusQueue, ExchangeKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};

/// Bounded capacity of a direct queue. Publishing to a full queue waits for
/// the consumers to catch up (backpressure), it does not drop the message.
const DIRECT_QUEUE_CAPACITY: usize = 1024;

/// Ring-buffer capacity of a fanout queue. Slow fanout consumers skip the
/// oldest messages rather than blocking publishers.
const FANOUT_QUEUE_CAPACITY: usize = 256;

/// Transport seam used by the manager and the suppliers.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declares the whole topology registry. Idempotent; fatal at process
    /// start if the transport is unreachable.
    async fn declare_all(&self) -> Result<()>;

    /// Publishes one payload on a queue. May wait briefly on backpressure.
    async fn publish(&self, queue: BusQueue, payload: Vec<u8>) -> Result<()>;

    /// Registers a consumer on a queue.
    async fn consume(&self, queue: BusQueue) -> Result<BusConsumer>;

    /// Redirects a rejected payload to the queue's paired dead-letter queue.
    /// A queue without dead-letter wiring drops the payload with a warning.
    async fn reject(&self, queue: BusQueue, payload: Vec<u8>) -> Result<()>;
}

enum ConsumerInner {
    /// Competing consumers share one receiver; whoever holds the lock gets
    /// the next message.
    Direct(Arc<Mutex<mpsc::Receiver<Vec<u8>>>>),
    Fanout(broadcast::Receiver<Vec<u8>>),
}

/// A registered consumer on one queue.
pub struct BusConsumer {
    queue: BusQueue,
    inner: ConsumerInner,
}

impl BusConsumer {
    pub fn queue(&self) -> BusQueue {
        self.queue
    }

    /// Waits for the next delivery. Returns `None` once the queue is closed
    /// and drained.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        match &mut self.inner {
            ConsumerInner::Direct(rx) => rx.lock().await.recv().await,
            ConsumerInner::Fanout(rx) => loop {
                match rx.recv().await {
                    Ok(payload) => return Some(payload),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "Consumer on {} lagged, skipped {} messages",
                            self.queue,
                            skipped
                        );
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }
}

struct DirectQueue {
    tx: mpsc::Sender<Vec<u8>>,
    rx: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
}

/// In-process broker over tokio channels.
pub struct MemoryBroker {
    direct: DashMap<&'static str, DirectQueue>,
    fanout: DashMap<&'static str, broadcast::Sender<Vec<u8>>>,
}

impl MemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            direct: DashMap::new(),
            fanout: DashMap::new(),
        })
    }

    /// Declares a single registry entry. Declaring an existing queue is a
    /// no-op, so the registry can be declared from every process.
    fn declare(&self, queue: BusQueue) {
        match queue.kind() {
            ExchangeKind::Direct => {
                self.direct.entry(queue.queue_name()).or_insert_with(|| {
                    let (tx, rx) = mpsc::channel(DIRECT_QUEUE_CAPACITY);
                    DirectQueue {
                        tx,
                        rx: Arc::new(Mutex::new(rx)),
                    }
                });
            }
            ExchangeKind::Fanout => {
                self.fanout.entry(queue.queue_name()).or_insert_with(|| {
                    let (tx, _rx) = broadcast::channel(FANOUT_QUEUE_CAPACITY);
                    tx
                });
            }
        }
        tracing::debug!("Declared {}", queue);
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_all(&self) -> Result<()> {
        for queue in BusQueue::ALL {
            self.declare(queue);
        }
        tracing::info!("Bus topology declared ({} queues)", BusQueue::ALL.len());
        Ok(())
    }

    async fn publish(&self, queue: BusQueue, payload: Vec<u8>) -> Result<()> {
        match queue.kind() {
            ExchangeKind::Direct => {
                let tx = {
                    let entry = self
                        .direct
                        .get(queue.queue_name())
                        .ok_or_else(|| Error::UnknownQueue(queue.queue_name().to_string()))?;
                    entry.tx.clone()
                };
                if let Err(send_error) = tx.send(payload).await {
                    // The queue no longer accepts messages. Redirect to the
                    // dead-letter queue when one is wired instead of failing
                    // the publisher.
                    return match queue.dead_letter() {
                        Some(dlq) => {
                            tracing::warn!("{} closed, dead-lettering message to {}", queue, dlq);
                            self.publish(dlq, send_error.0).await
                        }
                        None => Err(Error::QueueClosed(queue.queue_name().to_string())),
                    };
                }
                Ok(())
            }
            ExchangeKind::Fanout => {
                let tx = self
                    .fanout
                    .get(queue.queue_name())
                    .ok_or_else(|| Error::UnknownQueue(queue.queue_name().to_string()))?;
                // A fanout with no consumers drops the message, like any
                // broadcast exchange without bound queues.
                let _ = tx.send(payload);
                Ok(())
            }
        }
    }

    async fn consume(&self, queue: BusQueue) -> Result<BusConsumer> {
        let inner = match queue.kind() {
            ExchangeKind::Direct => {
                let entry = self
                    .direct
                    .get(queue.queue_name())
                    .ok_or_else(|| Error::UnknownQueue(queue.queue_name().to_string()))?;
                ConsumerInner::Direct(entry.rx.clone())
            }
            ExchangeKind::Fanout => {
                let tx = self
                    .fanout
                    .get(queue.queue_name())
                    .ok_or_else(|| Error::UnknownQueue(queue.queue_name().to_string()))?;
                ConsumerInner::Fanout(tx.subscribe())
            }
        };
        Ok(BusConsumer { queue, inner })
    }

    async fn reject(&self, queue: BusQueue, payload: Vec<u8>) -> Result<()> {
        match queue.dead_letter() {
            Some(dlq) => {
                tracing::warn!("Message rejected on {}, redirecting to {}", queue, dlq);
                self.publish(dlq, payload).await
            }
            None => {
                tracing::warn!("Message rejected on {} with no dead-letter queue, dropped", queue);
                Ok(())
            }
        }
    }
}
