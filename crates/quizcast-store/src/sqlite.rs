//! SQLite durable backend — JSON documents in a single keyed table.

use async_trait::async_trait;
use quizcast_core::error::{QuizcastError, Result};
use quizcast_core::traits::{Record, Store};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Durable document store. The connection mutex brackets every operation,
/// which is what makes `atomic_update` a true read-modify-write.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| QuizcastError::Storage(format!("open {}: {e}", path.display())))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                doc TEXT NOT NULL,
                PRIMARY KEY (collection, key)
            );",
        )
        .map_err(|e| QuizcastError::Storage(format!("migrate: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| QuizcastError::Storage(format!("connection lock poisoned: {e}")))
    }

    fn get_doc(conn: &Connection, collection: &str, key: &str) -> Result<Option<Record>> {
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM records WHERE collection = ?1 AND key = ?2",
                rusqlite::params![collection, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| QuizcastError::Storage(format!("get {collection}/{key}: {e}")))?;
        match doc {
            Some(s) => Ok(Some(serde_json::from_str(&s).map_err(|e| {
                QuizcastError::Storage(format!("corrupt doc {collection}/{key}: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    fn put_doc(conn: &Connection, collection: &str, key: &str, record: &Record) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO records (collection, key, doc) VALUES (?1, ?2, ?3)",
            rusqlite::params![collection, key, record.to_string()],
        )
        .map_err(|e| QuizcastError::Storage(format!("put {collection}/{key}: {e}")))?;
        Ok(())
    }

    /// All (key, record) pairs in a collection. Used by the fallback store to
    /// hydrate its memory mirror; not part of the `Store` contract.
    pub fn entries(&self, collection: &str) -> Result<Vec<(String, Record)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT key, doc FROM records WHERE collection = ?1")
            .map_err(|e| QuizcastError::Storage(format!("entries {collection}: {e}")))?;
        let rows = stmt
            .query_map(rusqlite::params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| QuizcastError::Storage(format!("entries {collection}: {e}")))?;
        let mut out = Vec::new();
        for row in rows {
            let (key, doc) =
                row.map_err(|e| QuizcastError::Storage(format!("entries {collection}: {e}")))?;
            match serde_json::from_str(&doc) {
                Ok(value) => out.push((key, value)),
                Err(e) => tracing::warn!("skipping corrupt doc {collection}/{key}: {e}"),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Record>> {
        let conn = self.lock()?;
        Self::get_doc(&conn, collection, key)
    }

    async fn put(&self, collection: &str, key: &str, record: Record) -> Result<()> {
        let conn = self.lock()?;
        Self::put_doc(&conn, collection, key, &record)
    }

    async fn list_where(
        &self,
        collection: &str,
        pred: &(dyn for<'r> Fn(&'r Record) -> bool + Send + Sync),
    ) -> Result<Vec<Record>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT doc FROM records WHERE collection = ?1")
            .map_err(|e| QuizcastError::Storage(format!("list {collection}: {e}")))?;
        let rows = stmt
            .query_map(rusqlite::params![collection], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| QuizcastError::Storage(format!("list {collection}: {e}")))?;
        let mut out = Vec::new();
        for doc in rows {
            let doc = doc.map_err(|e| QuizcastError::Storage(format!("list {collection}: {e}")))?;
            if let Ok(value) = serde_json::from_str::<Record>(&doc)
                && pred(&value)
            {
                out.push(value);
            }
        }
        Ok(out)
    }

    async fn atomic_update(
        &self,
        collection: &str,
        key: &str,
        apply: &(dyn Fn(Option<Record>) -> Record + Send + Sync),
    ) -> Result<Record> {
        // The lock spans read and write, so no other writer can interleave.
        let conn = self.lock()?;
        let current = Self::get_doc(&conn, collection, key)?;
        let next = apply(current);
        Self::put_doc(&conn, collection, key, &next)?;
        Ok(next)
    }
}
