use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

/// One queued write-intent awaiting replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Client-generated id, also used as the replay idempotency key
    pub id: String,
    /// Sync tag this record belongs to
    pub tag: String,
    /// JSON body of the original write
    pub payload: String,
    pub created_at: i64,
}

/// Durable queue of deferred write-actions.
///
/// Records are appended when a foreground write fails for connectivity
/// reasons and removed one at a time as their replay succeeds, so a replay
/// pass interrupted at any point leaves only not-yet-applied work behind.
pub struct ActionStore {
    db: Arc<Mutex<Connection>>,
}

impl ActionStore {
    pub fn open(base_path: &Path) -> anyhow::Result<Self> {
        if !base_path.exists() {
            fs::create_dir_all(base_path)
                .with_context(|| format!("creating storage directory {:?}", base_path))?;
        }
        let db_path = base_path.join("action_queue.sqlite");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("opening action queue at {:?}", db_path))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS pending_actions (
                id TEXT PRIMARY KEY,
                tag TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pending_actions_tag
                ON pending_actions(tag, created_at);
            ",
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn enqueue(&self, tag: &str, payload: &str) -> anyhow::Result<ActionRecord> {
        let db = Arc::clone(&self.db);
        let record = ActionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            tag: tag.to_string(),
            payload: payload.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        let stored = record.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            conn.execute(
                "INSERT INTO pending_actions (id, tag, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![stored.id, stored.tag, stored.payload, stored.created_at],
            )
            .context("enqueueing deferred action")?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(record)
    }

    /// Pending records for one tag, oldest first.
    pub async fn list(&self, tag: &str) -> anyhow::Result<Vec<ActionRecord>> {
        let db = Arc::clone(&self.db);
        let tag = tag.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            let mut stmt = conn.prepare(
                "SELECT id, tag, payload, created_at FROM pending_actions
                 WHERE tag = ?1 ORDER BY created_at, rowid",
            )?;
            let records = stmt
                .query_map(params![tag], |row| {
                    Ok(ActionRecord {
                        id: row.get(0)?,
                        tag: row.get(1)?,
                        payload: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await?
    }

    /// Remove one record after its replay succeeded. Returns whether a
    /// record was actually deleted.
    pub async fn remove(&self, id: &str) -> anyhow::Result<bool> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            let deleted = conn
                .execute("DELETE FROM pending_actions WHERE id = ?1", params![id])
                .context("removing deferred action")?;
            Ok(deleted > 0)
        })
        .await?
    }

    pub async fn count(&self, tag: &str) -> anyhow::Result<u64> {
        let db = Arc::clone(&self.db);
        let tag = tag.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM pending_actions WHERE tag = ?1",
                params![tag],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await?
    }

    pub async fn count_all(&self) -> anyhow::Result<u64> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM pending_actions", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await?
    }
}
