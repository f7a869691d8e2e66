//! Batch Processing Loop
//!
//! Single-consumer loop pattern for long-lived batch jobs pulled from a
//! shared queue. A reserved poison value signals graceful termination: the
//! loop re-inserts it before exiting so co-located consumers terminate too.
//! Each job runs synchronously to completion before the next poll; a failing
//! job is logged and the loop continues.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Bounded poll so the loop can periodically come back around even with no
/// traffic.
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// External collaborator that receives completed batch results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn save(&self, result: serde_json::Value) -> anyhow::Result<()>;
}

/// One slot of the batch queue: a job, or the reserved termination sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchJob<J> {
    Job(J),
    Poison,
}

/// Shared job queue. Multiple co-located consumers may pull from the same
/// queue; each job is delivered to exactly one of them.
pub struct BatchQueue<J> {
    tx: mpsc::Sender<BatchJob<J>>,
    rx: Arc<Mutex<mpsc::Receiver<BatchJob<J>>>>,
}

impl<J> Clone for BatchQueue<J> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<J: Send> BatchQueue<J> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub async fn push(&self, job: J) -> Result<()> {
        self.tx
            .send(BatchJob::Job(job))
            .await
            .map_err(|_| Error::QueueClosed("batch queue".to_string()))
    }

    /// Enqueues the termination sentinel. The only supported external
    /// shutdown signal.
    pub async fn enqueue_poison(&self) {
        let _ = self.tx.send(BatchJob::Poison).await;
    }

    /// Closes the underlying queue resource. Explicit and separate from the
    /// poison protocol; consumers drain what is already queued and stop.
    pub async fn close(&self) {
        self.rx.lock().await.close();
    }
}

impl<J: Send> Default for BatchQueue<J> {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-consumer processing loop over a [`BatchQueue`].
pub struct BatchLoop<J, H> {
    queue: BatchQueue<J>,
    handler: H,
    sink: Option<Arc<dyn ResultSink>>,
    poll_timeout: Duration,
}

impl<J, H, Fut> BatchLoop<J, H>
where
    J: Send + 'static,
    H: Fn(J) -> Fut,
    Fut: Future<Output = anyhow::Result<serde_json::Value>>,
{
    pub fn new(queue: BatchQueue<J>, handler: H) -> Self {
        Self {
            queue,
            handler,
            sink: None,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    /// Hands each completed result to the sink.
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Runs until the poison sentinel arrives or the queue is closed.
    pub async fn run(&self) {
        tracing::info!("Batch loop running, waiting for jobs");
        loop {
            let polled = {
                let mut rx = self.queue.rx.lock().await;
                tokio::time::timeout(self.poll_timeout, rx.recv()).await
            };

            match polled {
                // Poll timeout: come back around so a closed queue is
                // noticed even with no traffic
                Err(_) => continue,
                Ok(None) => {
                    tracing::info!("Batch queue closed, leaving loop");
                    break;
                }
                Ok(Some(BatchJob::Poison)) => {
                    // Propagate the sentinel so co-located consumers
                    // terminate as well
                    self.queue.enqueue_poison().await;
                    tracing::info!("Poison received, leaving batch loop");
                    break;
                }
                Ok(Some(BatchJob::Job(job))) => match (self.handler)(job).await {
                    Ok(result) => {
                        if let Some(sink) = &self.sink {
                            if let Err(e) = sink.save(result).await {
                                tracing::error!("Failed to save batch result: {:#}", e);
                            }
                        }
                    }
                    // A single bad job must never kill the loop
                    Err(e) => tracing::error!("error in loop: {:#}", e),
                },
            }
        }
    }
}
