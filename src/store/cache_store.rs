use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::ResponseSnapshot;

/// Durable, namespaced request-identity → response cache.
///
/// Namespaces are registered in their own table so that empty namespaces
/// (for example a fresh API namespace with no traffic yet) are still
/// enumerable during activation cleanup. Per-key writes are single
/// upserts, so readers never observe a half-written entry; multi-entry
/// publishes go through `put_all`, which commits in one transaction.
pub struct CacheStore {
    db: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl CacheStore {
    pub fn open(base_path: &Path) -> anyhow::Result<Self> {
        if !base_path.exists() {
            fs::create_dir_all(base_path)
                .with_context(|| format!("creating storage directory {:?}", base_path))?;
        }
        let db_path = base_path.join("response_cache.sqlite");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("opening cache database at {:?}", db_path))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS namespaces (
                name TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL,
                request_key TEXT NOT NULL,
                status INTEGER NOT NULL,
                status_message TEXT,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                stored_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, request_key)
            );
            CREATE INDEX IF NOT EXISTS idx_cache_entries_namespace
                ON cache_entries(namespace);
            ",
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Register a namespace. Idempotent.
    pub async fn create_namespace(&self, name: &str) -> anyhow::Result<()> {
        let db = Arc::clone(&self.db);
        let name = name.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            conn.execute(
                "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)",
                params![name, chrono::Utc::now().timestamp_millis()],
            )
            .context("registering namespace")?;
            Ok(())
        })
        .await?
    }

    /// All registered namespaces, oldest first.
    pub async fn list_namespaces(&self) -> anyhow::Result<Vec<String>> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            let mut stmt = conn.prepare("SELECT name FROM namespaces ORDER BY created_at, name")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await?
    }

    /// Delete a namespace and every entry in it, in one transaction.
    pub async fn delete_namespace(&self, name: &str) -> anyhow::Result<()> {
        let db = Arc::clone(&self.db);
        let name = name.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock().expect("db mutex poisoned");
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM cache_entries WHERE namespace = ?1", params![name])?;
            tx.execute("DELETE FROM namespaces WHERE name = ?1", params![name])?;
            tx.commit().context("deleting namespace")?;
            Ok(())
        })
        .await?
    }

    /// Store one response snapshot. Replaces any existing entry for the
    /// same key atomically.
    pub async fn put(
        &self,
        namespace: &str,
        request_key: &str,
        snapshot: &ResponseSnapshot,
    ) -> anyhow::Result<()> {
        let db = Arc::clone(&self.db);
        let namespace = namespace.to_string();
        let request_key = request_key.to_string();
        let headers = serde_json::to_string(&snapshot.headers)?;
        let status = snapshot.status;
        let status_message = snapshot.status_message.clone();
        let body = snapshot.body.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock().expect("db mutex poisoned");
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)",
                params![namespace, chrono::Utc::now().timestamp_millis()],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO cache_entries
                   (namespace, request_key, status, status_message, headers, body, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    namespace,
                    request_key,
                    status,
                    status_message,
                    headers,
                    body,
                    chrono::Utc::now().timestamp_millis()
                ],
            )?;
            tx.commit().context("storing cache entry")?;
            Ok(())
        })
        .await?
    }

    /// Store a batch of entries all-or-nothing: either every entry becomes
    /// visible or none do.
    pub async fn put_all(
        &self,
        namespace: &str,
        entries: Vec<(String, ResponseSnapshot)>,
    ) -> anyhow::Result<()> {
        let db = Arc::clone(&self.db);
        let namespace = namespace.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock().expect("db mutex poisoned");
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)",
                params![namespace, chrono::Utc::now().timestamp_millis()],
            )?;
            for (request_key, snapshot) in &entries {
                let headers = serde_json::to_string(&snapshot.headers)?;
                tx.execute(
                    "INSERT OR REPLACE INTO cache_entries
                       (namespace, request_key, status, status_message, headers, body, stored_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        namespace,
                        request_key,
                        snapshot.status,
                        snapshot.status_message,
                        headers,
                        snapshot.body,
                        chrono::Utc::now().timestamp_millis()
                    ],
                )?;
            }
            tx.commit().context("storing cache entry batch")?;
            Ok(())
        })
        .await?
    }

    /// Look up a cached response by request identity.
    pub async fn get(
        &self,
        namespace: &str,
        request_key: &str,
    ) -> anyhow::Result<Option<ResponseSnapshot>> {
        let db = Arc::clone(&self.db);
        let namespace = namespace.to_string();
        let request_key = request_key.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            let row = conn
                .query_row(
                    "SELECT status, status_message, headers, body FROM cache_entries
                     WHERE namespace = ?1 AND request_key = ?2",
                    params![namespace, request_key],
                    |row| {
                        Ok((
                            row.get::<_, u16>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, Vec<u8>>(3)?,
                        ))
                    },
                )
                .optional()?;

            match row {
                Some((status, status_message, headers, body)) => {
                    let headers: HashMap<String, String> = serde_json::from_str(&headers)
                        .context("parsing cached headers")?;
                    Ok(Some(ResponseSnapshot {
                        status,
                        status_message,
                        headers,
                        body,
                    }))
                }
                None => Ok(None),
            }
        })
        .await?
    }

    /// Number of entries in one namespace.
    pub async fn entry_count(&self, namespace: &str) -> anyhow::Result<u64> {
        let db = Arc::clone(&self.db);
        let namespace = namespace.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?1",
                params![namespace],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await?
    }

    /// Total entries across all namespaces.
    pub async fn total_entry_count(&self) -> anyhow::Result<u64> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await?
    }

    /// Wipe every namespace and entry. Returns the number of entries removed.
    pub async fn clear_all(&self) -> anyhow::Result<u64> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock().expect("db mutex poisoned");
            let tx = conn.transaction()?;
            let removed = tx.execute("DELETE FROM cache_entries", [])?;
            tx.execute("DELETE FROM namespaces", [])?;
            tx.commit().context("clearing cache")?;
            Ok(removed as u64)
        })
        .await?
    }
}
