//! In-memory backend — the volatile twin of the SQLite store.

use async_trait::async_trait;
use quizcast_core::error::{QuizcastError, Result};
use quizcast_core::traits::{Record, Store};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

type Collections = HashMap<String, HashMap<String, Record>>;

/// Volatile document store with the exact semantics of [`SqliteStore`];
/// everything is lost on restart.
///
/// [`SqliteStore`]: crate::SqliteStore
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>> {
        self.data
            .lock()
            .map_err(|e| QuizcastError::Storage(format!("memory store lock poisoned: {e}")))
    }

    /// Synchronous insert used while hydrating from a durable backend.
    pub(crate) fn insert(&self, collection: &str, key: &str, record: Record) -> Result<()> {
        self.lock()?
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), record);
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Record>> {
        Ok(self
            .lock()?
            .get(collection)
            .and_then(|col| col.get(key))
            .cloned())
    }

    async fn put(&self, collection: &str, key: &str, record: Record) -> Result<()> {
        self.insert(collection, key, record)
    }

    async fn list_where(
        &self,
        collection: &str,
        pred: &(dyn for<'r> Fn(&'r Record) -> bool + Send + Sync),
    ) -> Result<Vec<Record>> {
        Ok(self
            .lock()?
            .get(collection)
            .map(|col| col.values().filter(|r| pred(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn atomic_update(
        &self,
        collection: &str,
        key: &str,
        apply: &(dyn Fn(Option<Record>) -> Record + Send + Sync),
    ) -> Result<Record> {
        // One lock spans read and write.
        let mut data = self.lock()?;
        let col = data.entry(collection.to_string()).or_default();
        let next = apply(col.get(key).cloned());
        col.insert(key.to_string(), next.clone());
        Ok(next)
    }
}
