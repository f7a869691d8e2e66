//! Local Task Runner
//!
//! Single-process fallback executor: a bounded pool of concurrent units of
//! work with monitorable handles. Used when the process runs without a
//! message bus; the distributed manager/supplier pair replaces it otherwise.

use crate::error::{Error, Result};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

/// Sentinel progress rate reported for work that does not support progress
/// reporting.
pub const UNKNOWN_PROGRESS: f64 = -2.0;

/// Capability interface for units of work that can report progress.
///
/// Implemented optionally: work without the capability is wrapped as-is and
/// its handle reports [`UNKNOWN_PROGRESS`].
pub trait Monitorable: Send + Sync {
    /// Progress rate in `[0, 1]`.
    fn progress_rate(&self) -> f64;
}

struct TaskHandle {
    monitor: Option<Arc<dyn Monitorable>>,
    started: Arc<AtomicBool>,
    done: watch::Receiver<bool>,
    join: JoinHandle<()>,
}

/// Bounded-parallelism executor with a monitorable handle registry.
pub struct LocalTaskRunner {
    permits: Arc<Semaphore>,
    tasks: DashMap<String, TaskHandle>,
    closed: AtomicBool,
}

impl LocalTaskRunner {
    /// Creates a runner. `parallelism` defaults to the available hardware
    /// parallelism.
    pub fn new(parallelism: Option<usize>) -> Self {
        let parallelism = parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        tracing::info!("Local task runner with parallelism {}", parallelism);
        Self {
            permits: Arc::new(Semaphore::new(parallelism)),
            tasks: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Submits a unit of work. Returns the handle id the work is registered
    /// under.
    pub fn start_task<F>(&self, work: F) -> Result<String>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.start_task_with(work, None, None)
    }

    /// Submits a unit of work with an optional progress capability and an
    /// optional completion callback.
    ///
    /// The callback runs after the work finishes, regardless of outcome; a
    /// work failure is logged, not propagated.
    pub fn start_task_with<F>(
        &self,
        work: F,
        monitor: Option<Arc<dyn Monitorable>>,
        callback: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<String>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Internal("runner is shut down".to_string()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let (done_tx, done_rx) = watch::channel(false);
        let started = Arc::new(AtomicBool::new(false));

        let permits = self.permits.clone();
        let started_flag = started.clone();
        let task_id = id.clone();
        let join = tokio::spawn(async move {
            let permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // Pool shut down before the work started
                    let _ = done_tx.send(true);
                    return;
                }
            };
            started_flag.store(true, Ordering::Release);

            if let Err(e) = work.await {
                tracing::error!("Task {} failed: {:#}", task_id, e);
            }
            drop(permit);

            if let Some(callback) = callback {
                callback();
            }
            let _ = done_tx.send(true);
        });

        self.tasks.insert(
            id.clone(),
            TaskHandle {
                monitor,
                started,
                done: done_rx,
                join,
            },
        );
        Ok(id)
    }

    /// Progress rate of one registered handle, [`UNKNOWN_PROGRESS`] when the
    /// work has no progress capability, `None` for an unknown id.
    pub fn progress_rate(&self, id: &str) -> Option<f64> {
        self.tasks.get(id).map(|handle| {
            handle
                .monitor
                .as_ref()
                .map(|monitor| monitor.progress_rate())
                .unwrap_or(UNKNOWN_PROGRESS)
        })
    }

    /// Number of registered handles (done ones included until cleaned).
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Interrupts all in-flight work and returns the ids of tasks that never
    /// started.
    pub fn shutdown_now(&self) -> Vec<String> {
        self.closed.store(true, Ordering::Release);
        self.permits.close();

        let mut never_started = Vec::new();
        for entry in self.tasks.iter() {
            let handle = entry.value();
            if !handle.started.load(Ordering::Acquire) && !*handle.done.borrow() {
                never_started.push(entry.key().clone());
            }
            handle.join.abort();
        }
        tracing::info!(
            "Runner shut down, {} tasks never started",
            never_started.len()
        );
        never_started
    }

    /// Stops accepting work and blocks until every handle finishes or the
    /// timeout elapses. Returns whether the pool drained in time.
    pub async fn shutdown_and_await_termination(&self, timeout: Duration) -> bool {
        self.closed.store(true, Ordering::Release);
        let deadline = tokio::time::Instant::now() + timeout;

        let waits: Vec<(String, watch::Receiver<bool>)> = self
            .tasks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().done.clone()))
            .collect();

        for (id, mut done) in waits {
            if *done.borrow() {
                continue;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, done.wait_for(|finished| *finished)).await {
                Ok(Ok(_)) => {}
                // Sender dropped: the task was aborted, nothing left to wait on
                Ok(Err(_)) => {}
                Err(_) => {
                    tracing::warn!("Task {} still running after shutdown timeout", id);
                    return false;
                }
            }
        }
        true
    }

    /// Removes completed handles from the registry and returns their ids.
    pub fn clean_done_tasks(&self) -> Vec<String> {
        let done_ids: Vec<String> = self
            .tasks
            .iter()
            .filter(|entry| *entry.value().done.borrow())
            .map(|entry| entry.key().clone())
            .collect();
        for id in &done_ids {
            self.tasks.remove(id);
        }
        done_ids
    }

    /// Blocks on every registered handle up to `timeout` each. A task that
    /// times out or was interrupted is logged, never raised. Returns the ids
    /// that finished.
    pub async fn wait_tasks_to_be_done(&self, timeout: Duration) -> Vec<String> {
        let waits: Vec<(String, watch::Receiver<bool>)> = self
            .tasks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().done.clone()))
            .collect();

        let mut finished = Vec::new();
        for (id, mut done) in waits {
            if *done.borrow() {
                finished.push(id);
                continue;
            }
            match tokio::time::timeout(timeout, done.wait_for(|f| *f)).await {
                Ok(Ok(_)) => finished.push(id),
                Ok(Err(_)) => tracing::error!("task {} interrupted while running", id),
                Err(_) => tracing::error!("task {} timed out while running", id),
            }
        }
        finished
    }
}
