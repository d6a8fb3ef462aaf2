//! Durable-or-degrade store: a memory mirror in front of SQLite.
//!
//! Reads are always served from the mirror, which is hydrated from SQLite at
//! open. Writes go to the mirror and through to SQLite while it is healthy.
//! If SQLite is unreachable at open, or a write fails at runtime, the store
//! warns once, flips to memory-only, and keeps serving — in-process state is
//! untouched; only durability across restart is lost.

use async_trait::async_trait;
use quizcast_core::error::Result;
use quizcast_core::traits::{collections, Record, Store};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::memory::MemoryStore;
use crate::sqlite::SqliteStore;

pub struct FallbackStore {
    mirror: MemoryStore,
    durable: Option<SqliteStore>,
    degraded: AtomicBool,
}

impl FallbackStore {
    /// Open the durable backend at `path` and hydrate the mirror from it.
    /// A failed open is not fatal: the store starts degraded and empty.
    pub fn open(path: &Path) -> Self {
        let mirror = MemoryStore::new();
        match SqliteStore::open(path) {
            Ok(db) => {
                match Self::hydrate(&db, &mirror) {
                    Ok(count) => {
                        tracing::info!("💾 store opened at {} ({count} records)", path.display());
                        Self {
                            mirror,
                            durable: Some(db),
                            degraded: AtomicBool::new(false),
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            "⚠️ durable store unreadable, continuing in memory \
                             (data will not survive restart): {e}"
                        );
                        Self {
                            mirror,
                            durable: None,
                            degraded: AtomicBool::new(true),
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    "⚠️ durable store unavailable, continuing in memory \
                     (data will not survive restart): {e}"
                );
                Self {
                    mirror,
                    durable: None,
                    degraded: AtomicBool::new(true),
                }
            }
        }
    }

    /// A store with no durable backend at all. Unlike a degraded open this is
    /// deliberate, so nothing is logged.
    pub fn memory_only() -> Self {
        Self {
            mirror: MemoryStore::new(),
            durable: None,
            degraded: AtomicBool::new(true),
        }
    }

    fn hydrate(db: &SqliteStore, mirror: &MemoryStore) -> Result<usize> {
        let mut count = 0;
        for collection in collections::ALL {
            for (key, mut record) in db.entries(collection)? {
                // A send token from a crashed process must not survive into
                // this one; the registry re-acquires per send.
                if collection == collections::GROUPS
                    && let Some(obj) = record.as_object_mut()
                {
                    obj.remove("send_token");
                }
                mirror.insert(collection, &key, record)?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Mirror a write into SQLite; on failure, degrade once and stay degraded
    /// for the process lifetime.
    async fn persist(&self, collection: &str, key: &str, record: Record) {
        if self.degraded.load(Ordering::Relaxed) {
            return;
        }
        let Some(db) = &self.durable else { return };
        if let Err(e) = db.put(collection, key, record).await
            && !self.degraded.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                "⚠️ durable store failed, continuing in memory \
                 (data will not survive restart): {e}"
            );
        }
    }

    #[cfg(test)]
    fn force_degrade(&self) {
        self.degraded.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl Store for FallbackStore {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Record>> {
        self.mirror.get(collection, key).await
    }

    async fn put(&self, collection: &str, key: &str, record: Record) -> Result<()> {
        self.mirror.put(collection, key, record.clone()).await?;
        self.persist(collection, key, record).await;
        Ok(())
    }

    async fn list_where(
        &self,
        collection: &str,
        pred: &(dyn for<'r> Fn(&'r Record) -> bool + Send + Sync),
    ) -> Result<Vec<Record>> {
        self.mirror.list_where(collection, pred).await
    }

    async fn atomic_update(
        &self,
        collection: &str,
        key: &str,
        apply: &(dyn Fn(Option<Record>) -> Record + Send + Sync),
    ) -> Result<Record> {
        let next = self.mirror.atomic_update(collection, key, apply).await?;
        self.persist(collection, key, next.clone()).await;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_db(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("quizcast-fallback-{name}-{}.db", std::process::id()))
    }

    #[tokio::test]
    async fn test_hydrates_from_previous_run() {
        let path = temp_db("hydrate");
        std::fs::remove_file(&path).ok();

        {
            let store = FallbackStore::open(&path);
            store
                .put(collections::QUIZZES, "q1", json!({"id": "q1"}))
                .await
                .unwrap();
        }

        let store = FallbackStore::open(&path);
        let rec = store.get(collections::QUIZZES, "q1").await.unwrap().unwrap();
        assert_eq!(rec["id"], "q1");
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_stale_send_tokens_cleared_on_open() {
        let path = temp_db("tokens");
        std::fs::remove_file(&path).ok();

        {
            let store = FallbackStore::open(&path);
            store
                .put(
                    collections::GROUPS,
                    "42",
                    json!({"chat_id": 42, "send_token": "stale"}),
                )
                .await
                .unwrap();
        }

        let store = FallbackStore::open(&path);
        let rec = store.get(collections::GROUPS, "42").await.unwrap().unwrap();
        assert!(rec.get("send_token").is_none());
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_unreachable_durable_degrades_but_serves() {
        // A directory is not a valid database file, so the open fails.
        let store = FallbackStore::open(&std::env::temp_dir());
        store
            .put(collections::GROUPS, "g", json!({"chat_id": 1}))
            .await
            .unwrap();
        let rec = store.get(collections::GROUPS, "g").await.unwrap().unwrap();
        assert_eq!(rec["chat_id"], 1);
    }

    #[tokio::test]
    async fn test_mid_run_degradation_preserves_state() {
        let path = temp_db("degrade");
        std::fs::remove_file(&path).ok();

        let store = FallbackStore::open(&path);
        store
            .put(collections::QUIZZES, "before", json!({"id": "before"}))
            .await
            .unwrap();

        store.force_degrade();

        // Data written before the switch is still visible, and new writes
        // keep working.
        assert!(store.get(collections::QUIZZES, "before").await.unwrap().is_some());
        store
            .put(collections::QUIZZES, "after", json!({"id": "after"}))
            .await
            .unwrap();
        assert!(store.get(collections::QUIZZES, "after").await.unwrap().is_some());

        // The post-degradation write never reached SQLite.
        let db = SqliteStore::open(&path).unwrap();
        let entries = db.entries(collections::QUIZZES).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "before");
        std::fs::remove_file(&path).ok();
    }
}
