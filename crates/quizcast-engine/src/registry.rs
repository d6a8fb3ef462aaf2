//! Group registry — active/inactive groups and per-group scheduling state.

use chrono::{DateTime, Utc};
use quizcast_core::error::{QuizcastError, Result};
use quizcast_core::traits::{collections, Record, Store};
use quizcast_core::types::Group;
use serde_json::json;
use std::sync::Arc;

/// Owns the group collection. Also provides the per-group send token that
/// keeps an automatic tick and a manual trigger from sending concurrently —
/// a CAS through `atomic_update`, scoped to one group key, so unrelated
/// groups are never serialized against each other.
#[derive(Clone)]
pub struct GroupRegistry {
    store: Arc<dyn Store>,
    default_interval_secs: u64,
}

impl GroupRegistry {
    pub fn new(store: Arc<dyn Store>, default_interval_secs: u64) -> Self {
        Self {
            store,
            default_interval_secs,
        }
    }

    pub fn default_interval_secs(&self) -> u64 {
        self.default_interval_secs
    }

    /// Idempotent: an already-known chat comes back unchanged.
    pub async fn register(&self, chat_id: i64, title: Option<&str>) -> Result<Group> {
        let key = chat_id.to_string();
        let title = title.map(str::to_string);
        let apply = move |cur: Option<Record>| match cur {
            Some(doc) => doc,
            None => crate::doc(&Group::new(chat_id, title.clone())),
        };
        let doc = self
            .store
            .atomic_update(collections::GROUPS, &key, &apply)
            .await?;
        let group: Group = serde_json::from_value(doc)
            .map_err(|e| QuizcastError::Storage(format!("corrupt group {chat_id}: {e}")))?;
        Ok(group)
    }

    pub async fn get(&self, chat_id: i64) -> Result<Option<Group>> {
        Ok(self
            .store
            .get(collections::GROUPS, &chat_id.to_string())
            .await?
            .and_then(|doc| serde_json::from_value(doc).ok()))
    }

    pub async fn deactivate(&self, chat_id: i64) -> Result<()> {
        self.set_active(chat_id, false).await?;
        tracing::info!("🚫 group deactivated: chat {chat_id}");
        Ok(())
    }

    pub async fn reactivate(&self, chat_id: i64) -> Result<()> {
        self.set_active(chat_id, true).await?;
        tracing::info!("✅ group reactivated: chat {chat_id}");
        Ok(())
    }

    async fn set_active(&self, chat_id: i64, active: bool) -> Result<()> {
        self.update_known(chat_id, move |doc| doc["active"] = json!(active))
            .await
    }

    pub async fn list_all(&self) -> Result<Vec<Group>> {
        let docs = self
            .store
            .list_where(collections::GROUPS, &|_: &Record| true)
            .await?;
        Ok(docs
            .into_iter()
            .filter_map(|d| serde_json::from_value(d).ok())
            .collect())
    }

    pub async fn list_active(&self) -> Result<Vec<Group>> {
        let pred = |r: &Record| r["active"].as_bool().unwrap_or(true);
        let docs = self.store.list_where(collections::GROUPS, &pred).await?;
        Ok(docs
            .into_iter()
            .filter_map(|d| serde_json::from_value(d).ok())
            .collect())
    }

    /// Active groups whose interval has elapsed. Never-sent groups are due
    /// immediately.
    pub async fn due_for_send(&self, now: DateTime<Utc>) -> Result<Vec<Group>> {
        Ok(self
            .list_active()
            .await?
            .into_iter()
            .filter(|g| g.is_due(now, self.default_interval_secs))
            .collect())
    }

    /// Set or clear the per-group interval override.
    pub async fn set_interval(&self, chat_id: i64, interval_secs: Option<u64>) -> Result<()> {
        self.update_known(chat_id, move |doc| {
            doc["interval_secs"] = match interval_secs {
                Some(s) => json!(s),
                None => Record::Null,
            }
        })
        .await
    }

    pub async fn mark_sent(&self, chat_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.update_known(chat_id, move |doc| doc["last_send"] = json!(at.to_rfc3339()))
            .await
    }

    /// Try to acquire the group's send slot. Returns the token to release
    /// with [`finish_send`](Self::finish_send), or None when another send is
    /// already in flight for this group.
    pub async fn try_begin_send(&self, chat_id: i64) -> Result<Option<String>> {
        let key = chat_id.to_string();
        self.require_known(chat_id).await?;
        let token = uuid::Uuid::new_v4().to_string();
        let claim = token.clone();
        // Records are never deleted, so once the group exists the current
        // document is always present inside the update.
        let apply = move |cur: Option<Record>| {
            let mut doc = cur.unwrap_or(Record::Null);
            if doc["send_token"].is_null() {
                doc["send_token"] = json!(claim);
            }
            doc
        };
        let doc = self
            .store
            .atomic_update(collections::GROUPS, &key, &apply)
            .await?;
        Ok((doc["send_token"].as_str() == Some(token.as_str())).then_some(token))
    }

    /// Release the send slot. Only the token's holder can release it.
    pub async fn finish_send(&self, chat_id: i64, token: &str) -> Result<()> {
        let token = token.to_string();
        self.update_known(chat_id, move |doc| {
            if doc["send_token"].as_str() == Some(token.as_str()) {
                doc["send_token"] = Record::Null;
            }
        })
        .await
    }

    /// Clear send tokens left behind by a crashed process. Called once at
    /// startup, before the scheduler runs.
    pub async fn recover_stale_sends(&self) -> Result<usize> {
        let stale: Vec<Group> = self
            .list_all()
            .await?
            .into_iter()
            .filter(|g| g.send_token.is_some())
            .collect();
        for group in &stale {
            self.update_known(group.chat_id, |doc| doc["send_token"] = Record::Null)
                .await?;
        }
        if !stale.is_empty() {
            tracing::warn!("cleared {} stale send slot(s) from a previous run", stale.len());
        }
        Ok(stale.len())
    }

    /// Atomically mutate an existing group document; unknown chats error.
    async fn update_known<F>(&self, chat_id: i64, mutate: F) -> Result<()>
    where
        F: Fn(&mut Record) + Send + Sync,
    {
        let key = chat_id.to_string();
        self.require_known(chat_id).await?;
        let apply = move |cur: Option<Record>| {
            let mut doc = cur.unwrap_or(Record::Null);
            mutate(&mut doc);
            doc
        };
        self.store
            .atomic_update(collections::GROUPS, &key, &apply)
            .await?;
        Ok(())
    }

    async fn require_known(&self, chat_id: i64) -> Result<()> {
        if self
            .store
            .get(collections::GROUPS, &chat_id.to_string())
            .await?
            .is_none()
        {
            return Err(QuizcastError::UnknownGroup(chat_id));
        }
        Ok(())
    }
}
