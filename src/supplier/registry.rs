//! Task Handler Registry
//!
//! A dynamic registry that maps string-based task names (e.g.,
//! "index_document") to executable Rust closures. This keeps the supplier
//! generic and extensible without hardcoding task logic in the consumption
//! loop.

use crate::task::types::Task;
use anyhow::Result;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for a thread-safe, asynchronous task handler function.
/// It takes a `Task` and returns a Future resolving to the task's result
/// value.
pub type TaskHandlerFn = Arc<
    dyn Fn(Task) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>> + Send + Sync,
>;

/// Registry holding the mapping between task names and their implementation.
pub struct TaskHandlerRegistry {
    handlers: DashMap<String, TaskHandlerFn>,
}

impl TaskHandlerRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: DashMap::new(),
        })
    }

    /// Registers a new handler function under a specific task name.
    pub fn register<F, Fut>(&self, task_name: &str, handler: F)
    where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        // Box::pin type-erases the specific Future type so different async
        // functions can live in the same map.
        let handler_fn: TaskHandlerFn = Arc::new(move |task: Task| {
            Box::pin(handler(task))
                as Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
        });

        self.handlers.insert(task_name.to_string(), handler_fn);

        tracing::info!("Registered task handler: {}", task_name);
    }

    /// Looks up the handler for the task's name and executes it.
    ///
    /// # Returns
    /// * `Ok(value)` with the handler's result value.
    /// * `Err` if the handler failed or no handler exists for the name.
    pub async fn execute(&self, task: &Task) -> Result<serde_json::Value> {
        let handler_fn = match self.handlers.get(&task.name) {
            Some(entry) => entry.value().clone(),
            None => {
                let error = format!("Unknown task handler: {}", task.name);
                tracing::error!("{}", error);
                return Err(anyhow::anyhow!(error));
            }
        };

        tracing::debug!("Executing task {} with handler '{}'", task.id, task.name);
        handler_fn(task.clone()).await
    }

    /// Checks if a handler is registered.
    pub fn has_handler(&self, task_name: &str) -> bool {
        self.handlers.contains_key(task_name)
    }

    /// Returns a list of all registered handler names.
    pub fn handler_names(&self) -> Vec<String> {
        self.handlers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Returns the total number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for TaskHandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}
