//! Quiz bank — quiz definitions and per-group delivery history.

use chrono::{DateTime, Utc};
use quizcast_core::error::Result;
use quizcast_core::traits::{collections, Record, Store};
use quizcast_core::types::{Quiz, SendOutcome, SendRecord, SendTrigger};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

/// Owns the quiz and send-record collections. The sole writer of
/// [`SendRecord`]s; history is derived from them, never cached.
#[derive(Clone)]
pub struct QuizBank {
    store: Arc<dyn Store>,
}

impl QuizBank {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn add_quiz(&self, quiz: Quiz) -> Result<Quiz> {
        quiz.validate()?;
        self.store
            .put(collections::QUIZZES, &quiz.id, crate::doc(&quiz))
            .await?;
        tracing::info!("📝 quiz added: {} ({})", preview(&quiz.question), quiz.id);
        Ok(quiz)
    }

    /// Soft-delete: the quiz stays on record (send history references it)
    /// but leaves the selection pool. Returns false for an unknown id.
    pub async fn deactivate_quiz(&self, id: &str) -> Result<bool> {
        if self.store.get(collections::QUIZZES, id).await?.is_none() {
            return Ok(false);
        }
        let apply = |cur: Option<Record>| {
            let mut doc = cur.unwrap_or(Record::Null);
            doc["active"] = json!(false);
            doc
        };
        self.store
            .atomic_update(collections::QUIZZES, id, &apply)
            .await?;
        tracing::info!("🗑️ quiz deactivated: {id}");
        Ok(true)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Quiz>> {
        Ok(self
            .store
            .get(collections::QUIZZES, id)
            .await?
            .and_then(|doc| serde_json::from_value(doc).ok()))
    }

    pub async fn active_quizzes(&self) -> Result<Vec<Quiz>> {
        let pred = |r: &Record| r["active"].as_bool().unwrap_or(true);
        let docs = self.store.list_where(collections::QUIZZES, &pred).await?;
        Ok(docs
            .into_iter()
            .filter_map(|d| serde_json::from_value(d).ok())
            .collect())
    }

    pub async fn all_quizzes(&self) -> Result<Vec<Quiz>> {
        let docs = self
            .store
            .list_where(collections::QUIZZES, &|_: &Record| true)
            .await?;
        Ok(docs
            .into_iter()
            .filter_map(|d| serde_json::from_value(d).ok())
            .collect())
    }

    /// Quiz ids successfully delivered to this group since its last history
    /// reset. Failed attempts never count.
    pub async fn history(&self, group_id: i64) -> Result<HashSet<String>> {
        let reset_at = self.reset_marker(group_id).await?;
        let pred = move |r: &Record| r["group_id"].as_i64() == Some(group_id);
        let docs = self.store.list_where(collections::SENDS, &pred).await?;
        let mut out = HashSet::new();
        for doc in docs {
            if let Ok(rec) = serde_json::from_value::<SendRecord>(doc)
                && rec.outcome == SendOutcome::Success
                && reset_at.is_none_or(|at| rec.timestamp > at)
            {
                out.insert(rec.quiz_id);
            }
        }
        Ok(out)
    }

    /// Record one delivery attempt. Callers hold the group's send token, so
    /// there is exactly one writer per group at any time.
    pub async fn record_attempt(
        &self,
        group_id: i64,
        quiz_id: &str,
        outcome: SendOutcome,
        trigger: SendTrigger,
    ) -> Result<SendRecord> {
        let rec = SendRecord::new(group_id, quiz_id, outcome, trigger);
        self.store
            .put(collections::SENDS, &rec.id, crate::doc(&rec))
            .await?;
        Ok(rec)
    }

    /// Forget delivery history for a group. Send records stay put (they are
    /// permanent); a marker makes `history` count only successes after this
    /// instant. Used by exhaustion reset and the admin /reset command.
    pub async fn reset_history(&self, group_id: i64) -> Result<()> {
        let key = group_id.to_string();
        let at = Utc::now();
        let apply = move |_: Option<Record>| json!({"group_id": group_id, "at": at.to_rfc3339()});
        self.store
            .atomic_update(collections::HISTORY_RESETS, &key, &apply)
            .await?;
        tracing::info!("🔄 quiz history reset for chat {group_id}");
        Ok(())
    }

    async fn reset_marker(&self, group_id: i64) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .store
            .get(collections::HISTORY_RESETS, &group_id.to_string())
            .await?
            .and_then(|doc| {
                doc["at"]
                    .as_str()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|d| d.with_timezone(&Utc))
            }))
    }
}

fn preview(question: &str) -> &str {
    let end = question
        .char_indices()
        .nth(40)
        .map_or(question.len(), |(i, _)| i);
    &question[..end]
}
