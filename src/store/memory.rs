//! In-Memory Task Store
//!
//! Concurrent map of serialized tasks. Values go through the same JSON codec
//! as the durable store, so codec failures surface identically in tests and
//! in production.

use super::store::{decode_task, encode_task, TaskStore};
use crate::error::Result;
use crate::task::types::{Task, TaskId};
use async_trait::async_trait;
use dashmap::DashMap;

pub struct MemoryTaskStore {
    tasks: DashMap<String, String>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    /// Test hook: stores a raw payload without going through the codec.
    #[cfg(test)]
    pub(crate) fn put_raw(&self, id: &str, payload: &str) {
        self.tasks.insert(id.to_string(), payload.to_string());
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn put(&self, task: &Task) -> Result<()> {
        let payload = encode_task(task)?;
        self.tasks.insert(task.id.0.clone(), payload);
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        match self.tasks.get(&id.0) {
            Some(entry) => Ok(Some(decode_task(&id.0, entry.value())?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, id: &TaskId) -> Result<Option<Task>> {
        match self.tasks.remove(&id.0) {
            Some((key, payload)) => Ok(Some(decode_task(&key, &payload)?)),
            None => Ok(None),
        }
    }

    async fn values(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::with_capacity(self.tasks.len());
        for entry in self.tasks.iter() {
            match decode_task(entry.key(), entry.value()) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    // One corrupt entry must not abort the scan
                    tracing::error!("Skipping corrupt store entry: {}", e);
                }
            }
        }
        Ok(tasks)
    }

    async fn clear(&self) -> Result<()> {
        self.tasks.clear();
        Ok(())
    }
}
