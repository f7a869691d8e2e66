//! Task Supplier
//!
//! Consumes task messages on a dedicated loop and ships lifecycle events back
//! to the manager. Closing a supplier stops consumption and releases its bus
//! consumers; an in-flight handler invocation is allowed to finish, there is
//! no forced interruption.

use super::registry::TaskHandlerRegistry;
use crate::bus::broker::{Broker, BusConsumer};
use crate::bus::protocol::{decode, encode, WorkerCommand};
use crate::bus::topology::BusQueue;
use crate::error::Result;
use crate::task::event::TaskEvent;
use crate::task::types::{Task, TaskError, TaskId};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Worker-side consumption/publication component.
///
/// One supplier owns one connection worth of bus consumers: the shared TASK
/// queue (competing consumers) plus its own WORKER_EVENT subscription for
/// control signals.
pub struct TaskSupplier {
    broker: Arc<dyn Broker>,
    /// Task id -> requeue flag, set by Cancel commands, cleared on ack.
    cancelled: Arc<DashMap<String, bool>>,
    shutdown: CancellationToken,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskSupplier {
    /// Creates a supplier and starts its control-signal subscription.
    pub async fn new(broker: Arc<dyn Broker>) -> Result<Arc<Self>> {
        let consumer = broker.consume(BusQueue::WorkerEvent).await?;
        let cancelled: Arc<DashMap<String, bool>> = Arc::new(DashMap::new());
        let shutdown = CancellationToken::new();

        let control = tokio::spawn(control_loop(
            consumer,
            cancelled.clone(),
            shutdown.clone(),
        ));

        Ok(Arc::new(Self {
            broker,
            cancelled,
            shutdown,
            loops: Mutex::new(vec![control]),
        }))
    }

    /// Registers a callback invoked once per delivered task message, running
    /// on a dedicated consumption loop.
    ///
    /// A message that cannot be decoded is rejected to the TASK dead-letter
    /// queue instead of being requeued.
    pub async fn consume_tasks<H, Fut>(&self, handler: H) -> Result<()>
    where
        H: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut consumer: BusConsumer = self.broker.consume(BusQueue::Task).await?;
        let broker = self.broker.clone();
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            loop {
                let payload = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    delivery = consumer.recv() => match delivery {
                        Some(payload) => payload,
                        None => break,
                    },
                };

                match decode::<Task>(&payload) {
                    // The in-flight invocation runs to completion even if a
                    // shutdown arrives meanwhile.
                    Ok(task) => handler(task).await,
                    Err(e) => {
                        tracing::warn!("Undecodable task message: {}", e);
                        if let Err(e) = broker.reject(BusQueue::Task, payload).await {
                            tracing::error!("Failed to dead-letter task message: {}", e);
                        }
                    }
                }
            }
            tracing::debug!("Task consumption loop stopped");
        });

        self.loops.lock().await.push(handle);
        Ok(())
    }

    /// Convenience worker loop: dispatches each task to the registry by name
    /// and publishes the matching result/error/cancellation event.
    pub async fn consume_registry(
        self: Arc<Self>,
        registry: Arc<TaskHandlerRegistry>,
    ) -> Result<()> {
        let supplier = self.clone();
        self.consume_tasks(move |task| {
            let supplier = supplier.clone();
            let registry = registry.clone();
            async move {
                supplier.run_one(&registry, task).await;
            }
        })
        .await
    }

    async fn run_one(&self, registry: &TaskHandlerRegistry, task: Task) {
        // A cancellation broadcast may have raced the delivery
        if self.is_cancelled(&task.id) {
            let requeue = self
                .cancelled
                .get(task.id.as_str())
                .map(|entry| *entry.value())
                .unwrap_or(false);
            if let Err(e) = self.canceled(&task, requeue).await {
                tracing::error!("Failed to publish cancellation of {}: {}", task.id, e);
            }
            return;
        }

        // First progress event doubles as the start signal
        if let Err(e) = self.progress(&task.id, 0.0).await {
            tracing::error!("Failed to publish start of {}: {}", task.id, e);
        }

        match registry.execute(&task).await {
            Ok(value) => {
                if let Err(e) = self.result(&task.id, value).await {
                    tracing::error!("Failed to publish result of {}: {}", task.id, e);
                }
            }
            Err(err) => {
                let task_error = TaskError::from_anyhow(&err);
                if let Err(e) = self.error(&task.id, task_error).await {
                    tracing::error!("Failed to publish error of {}: {}", task.id, e);
                }
            }
        }
    }

    /// Publishes a progress update for a running task.
    pub async fn progress(&self, task_id: &TaskId, progress: f64) -> Result<()> {
        self.publish_event(TaskEvent::Progress {
            task_id: task_id.clone(),
            progress,
        })
        .await
    }

    /// Publishes the task's result.
    pub async fn result(&self, task_id: &TaskId, result: serde_json::Value) -> Result<()> {
        self.publish_event(TaskEvent::Result {
            task_id: task_id.clone(),
            result,
        })
        .await
    }

    /// Publishes a structured failure.
    pub async fn error(&self, task_id: &TaskId, error: TaskError) -> Result<()> {
        self.publish_event(TaskEvent::Error {
            task_id: task_id.clone(),
            error,
        })
        .await
    }

    /// Acknowledges a cancellation. With `requeue` the manager re-publishes
    /// the task as a fresh queued message instead of marking it cancelled.
    pub async fn canceled(&self, task: &Task, requeue: bool) -> Result<()> {
        self.cancelled.remove(task.id.as_str());
        self.publish_event(TaskEvent::Cancelled {
            task_id: task.id.clone(),
            requeue,
        })
        .await
    }

    /// Whether a cancellation command was observed for this task. Handlers
    /// poll this between units of work; cancellation is cooperative only.
    pub fn is_cancelled(&self, task_id: &TaskId) -> bool {
        self.cancelled.contains_key(task_id.as_str())
    }

    /// Stops consumption and waits for the loops to park. In-flight handler
    /// invocations finish before this returns.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let mut loops = self.loops.lock().await;
        for handle in loops.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!("Supplier loop ended abnormally: {}", e);
            }
        }
        tracing::info!("Task supplier closed");
    }

    async fn publish_event(&self, event: TaskEvent) -> Result<()> {
        tracing::debug!("Publishing {} event for task {}", event.kind(), event.task_id());
        self.broker
            .publish(BusQueue::ManagerEvent, encode(&event)?)
            .await
    }
}

/// Dedicated loop for WORKER_EVENT control signals.
async fn control_loop(
    mut consumer: BusConsumer,
    cancelled: Arc<DashMap<String, bool>>,
    shutdown: CancellationToken,
) {
    loop {
        let payload = tokio::select! {
            _ = shutdown.cancelled() => break,
            delivery = consumer.recv() => match delivery {
                Some(payload) => payload,
                None => break,
            },
        };

        match decode::<WorkerCommand>(&payload) {
            Ok(WorkerCommand::Cancel { task_id, requeue }) => {
                tracing::info!("Cancellation requested for task {}", task_id);
                cancelled.insert(task_id.0, requeue);
            }
            Ok(WorkerCommand::Shutdown) => {
                tracing::info!("Worker shutdown signal received");
                shutdown.cancel();
                break;
            }
            Err(e) => {
                tracing::warn!("Undecodable worker command: {}", e);
            }
        }
    }
    tracing::debug!("Control loop stopped");
}
