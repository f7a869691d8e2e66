//! SQLite-Backed Task Store
//!
//! The durable implementation: one row per task, value is the serialized
//! task. WAL journal mode keeps the file crash-safe; the schema is applied
//! idempotently on open so any process restart lands on a usable store.

use super::store::{decode_task, encode_task, TaskStore};
use crate::error::{Error, Result};
use crate::task::types::{Task, TaskId};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    body TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at_ms);
"#;

pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskStore {
    /// Opens (or creates) the store file and applies the schema.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open(&path)?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|e| Error::Internal(format!("store open task failed: {}", e)))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database for tests: same codec and schema, no file.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn put(&self, task: &Task) -> Result<()> {
        let payload = encode_task(task)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO tasks (id, body, created_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET body = excluded.body",
            params![task.id.0, payload, task.created_at as i64],
        )?;
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        let conn = self.conn.lock().await;
        let payload: Option<String> = conn
            .query_row("SELECT body FROM tasks WHERE id = ?1", params![id.0], |row| {
                row.get(0)
            })
            .optional()?;
        match payload {
            Some(body) => Ok(Some(decode_task(&id.0, &body)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, id: &TaskId) -> Result<Option<Task>> {
        let conn = self.conn.lock().await;
        let payload: Option<String> = conn
            .query_row("SELECT body FROM tasks WHERE id = ?1", params![id.0], |row| {
                row.get(0)
            })
            .optional()?;
        let task = match payload {
            Some(body) => Some(decode_task(&id.0, &body)?),
            None => None,
        };
        conn.execute("DELETE FROM tasks WHERE id = ?1", params![id.0])?;
        Ok(task)
    }

    async fn values(&self) -> Result<Vec<Task>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT id, body FROM tasks ORDER BY created_at_ms ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut tasks = Vec::new();
        for row in rows {
            let (id, body) = row?;
            match decode_task(&id, &body) {
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
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM tasks", [])?;
        Ok(())
    }
}
