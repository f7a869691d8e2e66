//! Distributed Task Manager
//!
//! Publishes new tasks onto the bus, consumes worker status events, applies
//! them to the task store, and exposes the query/cancel operations consumed by
//! the embedding API layer.

use crate::bus::broker::{Broker, BusConsumer};
use crate::bus::protocol::{decode, encode, WorkerCommand};
use crate::bus::topology::BusQueue;
use crate::error::{Error, Result};
use crate::store::store::TaskStore;
use crate::task::event::{Applied, TaskEvent};
use crate::task::types::{Task, TaskId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Manager-side component. One instance per manager process.
pub struct TaskManager {
    broker: Arc<dyn Broker>,
    store: Arc<dyn TaskStore>,
    shutdown: CancellationToken,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl TaskManager {
    /// Creates the manager: declares the bus topology (fatal if the transport
    /// is unreachable) and starts the event-application loop.
    pub async fn new(broker: Arc<dyn Broker>, store: Arc<dyn TaskStore>) -> Result<Arc<Self>> {
        broker.declare_all().await?;
        let consumer = broker.consume(BusQueue::ManagerEvent).await?;
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(event_loop(
            consumer,
            broker.clone(),
            store.clone(),
            shutdown.clone(),
        ));

        Ok(Arc::new(Self {
            broker,
            store,
            shutdown,
            event_loop: Mutex::new(Some(handle)),
        }))
    }

    /// Creates a task, persists it and publishes it to the TASK queue.
    ///
    /// Returns immediately with the new task id; completion is observed by
    /// polling [`TaskManager::get_task`]. A task whose publish failed stays
    /// `Created` in the store.
    pub async fn start_task(
        &self,
        name: impl Into<String>,
        user: impl Into<String>,
        args: HashMap<String, serde_json::Value>,
    ) -> Result<TaskId> {
        let mut task = Task::new(name, user, args);
        let task_id = task.id.clone();

        self.store.put(&task).await?;
        self.broker
            .publish(BusQueue::Task, encode(&task)?)
            .await?;

        // The bus accepted the message
        task.apply(&TaskEvent::Queued {
            task_id: task_id.clone(),
        });
        self.store.put(&task).await?;

        tracing::info!("Started task {} ({})", task_id, task.name);
        Ok(task_id)
    }

    /// Returns the current stored task.
    pub async fn get_task(&self, id: &TaskId) -> Result<Task> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::TaskNotFound(id.0.clone()))
    }

    /// Snapshot of every stored task, ordered by creation time. Not a live
    /// view: tasks keep moving while the caller inspects the list.
    pub async fn get_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks = self.store.values().await?;
        tasks.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        Ok(tasks)
    }

    /// Snapshot filtered by a caller predicate, same ordering as `get_tasks`.
    pub async fn get_tasks_filtered<P>(&self, predicate: P) -> Result<Vec<Task>>
    where
        P: Fn(&Task) -> bool,
    {
        let mut tasks = self.get_tasks().await?;
        tasks.retain(|task| predicate(task));
        Ok(tasks)
    }

    /// Requests cancellation of one task.
    ///
    /// Publishes a cancellation command on the WORKER_EVENT fanout and marks
    /// the task cancelled optimistically; a busy worker acknowledges only when
    /// it next checks its cancellation flag.
    pub async fn stop_task(&self, id: &TaskId) -> Result<()> {
        let mut task = self.get_task(id).await?;

        self.broker
            .publish(
                BusQueue::WorkerEvent,
                encode(&WorkerCommand::Cancel {
                    task_id: id.clone(),
                    requeue: false,
                })?,
            )
            .await?;

        match task.apply(&TaskEvent::Cancelled {
            task_id: id.clone(),
            requeue: false,
        }) {
            Applied::Applied => {
                self.store.put(&task).await?;
                tracing::info!("Task {} marked cancelled", id);
            }
            Applied::Dropped(reason) => {
                tracing::warn!("Not cancelling task {}: {}", id, reason);
            }
        }
        Ok(())
    }

    /// Requests cancellation of every non-terminal task owned by `user`.
    /// Returns how many tasks were signalled.
    pub async fn stop_all_tasks(&self, user: &str) -> Result<usize> {
        let tasks = self.get_tasks().await?;
        let mut stopped = 0;
        for task in tasks {
            if task.user == user && !task.is_terminal() {
                self.stop_task(&task.id).await?;
                stopped += 1;
            }
        }
        Ok(stopped)
    }

    /// Broadcasts the global shutdown signal to every worker.
    pub async fn shutdown_workers(&self) -> Result<()> {
        self.broker
            .publish(BusQueue::WorkerEvent, encode(&WorkerCommand::Shutdown)?)
            .await
    }

    /// Empties the task store. Destructive; test/reset flows only.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Stops the event-application loop and waits for it to park.
    pub async fn close(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.event_loop.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!("Event loop ended abnormally: {}", e);
            }
        }
        tracing::info!("Task manager closed");
    }
}

/// The single event-application loop of a manager instance.
async fn event_loop(
    mut consumer: BusConsumer,
    broker: Arc<dyn Broker>,
    store: Arc<dyn TaskStore>,
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

        let event = match decode::<TaskEvent>(&payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Undecodable manager event: {}", e);
                if let Err(e) = broker.reject(BusQueue::ManagerEvent, payload).await {
                    tracing::error!("Failed to dead-letter manager event: {}", e);
                }
                continue;
            }
        };

        apply_event(&broker, &store, &event).await;
    }
    tracing::debug!("Event loop stopped");
}

/// Applies one status event to the matching stored task.
///
/// Failures here are logged, never propagated: a stale or unknown event must
/// not kill the loop.
async fn apply_event(broker: &Arc<dyn Broker>, store: &Arc<dyn TaskStore>, event: &TaskEvent) {
    let task_id = event.task_id();

    let mut task = match store.get(task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            tracing::warn!(
                "Dropping {} event for unknown task {}",
                event.kind(),
                task_id
            );
            return;
        }
        Err(e) => {
            tracing::error!("Store read failed for task {}: {}", task_id, e);
            return;
        }
    };

    match task.apply(event) {
        Applied::Applied => {}
        Applied::Dropped(reason) => {
            tracing::warn!(
                "Dropping {} event for task {}: {}",
                event.kind(),
                task_id,
                reason
            );
            return;
        }
    }

    if let Err(e) = store.put(&task).await {
        tracing::error!("Store write failed for task {}: {}", task_id, e);
        return;
    }

    // Cancel-with-requeue resurrects the task as a fresh queued message
    if let TaskEvent::Cancelled { requeue: true, .. } = event {
        match encode(&task) {
            Ok(payload) => {
                if let Err(e) = broker.publish(BusQueue::Task, payload).await {
                    tracing::error!("Failed to requeue task {}: {}", task_id, e);
                } else {
                    tracing::info!("Task {} requeued after cancellation", task_id);
                }
            }
            Err(e) => tracing::error!("Failed to encode requeued task {}: {}", task_id, e),
        }
    }

    // Re-broadcast the applied event for in-process observers
    match encode(event) {
        Ok(payload) => {
            if let Err(e) = broker.publish(BusQueue::Event, payload).await {
                tracing::debug!("No observers for applied event: {}", e);
            }
        }
        Err(e) => tracing::error!("Failed to encode applied event: {}", e),
    }
}
