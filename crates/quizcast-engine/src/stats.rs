//! Read-only engagement statistics derived from send records.

use chrono::{DateTime, Utc};
use quizcast_core::error::Result;
use quizcast_core::traits::{collections, Record, Store};
use quizcast_core::types::{Group, Quiz, SendOutcome, SendRecord, SendTrigger};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub quizzes_total: usize,
    pub quizzes_active: usize,
    pub groups_total: usize,
    pub groups_active: usize,
    pub sends_total: usize,
    pub delivered: usize,
    pub failed: usize,
    pub auto_sends: usize,
    pub manual_sends: usize,
    pub last_send: Option<DateTime<Utc>>,
    /// Successful deliveries per group, busiest first.
    pub engagement: Vec<GroupEngagement>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupEngagement {
    pub chat_id: i64,
    pub title: Option<String>,
    pub delivered: usize,
}

/// Aggregate counts over the store, optionally scoped to one group. Pure
/// reader: derives everything from records, stores nothing.
pub async fn collect(store: &dyn Store, scope: Option<i64>) -> Result<StatsReport> {
    let quizzes: Vec<Quiz> = fetch(store, collections::QUIZZES).await?;
    let groups: Vec<Group> = fetch(store, collections::GROUPS).await?;
    let sends: Vec<SendRecord> = fetch(store, collections::SENDS).await?;

    let in_scope =
        |group_id: i64| -> bool { scope.is_none_or(|chat_id| chat_id == group_id) };
    let scoped: Vec<&SendRecord> = sends.iter().filter(|r| in_scope(r.group_id)).collect();

    let mut engagement: Vec<GroupEngagement> = groups
        .iter()
        .filter(|g| in_scope(g.chat_id))
        .map(|g| GroupEngagement {
            chat_id: g.chat_id,
            title: g.title.clone(),
            delivered: scoped
                .iter()
                .filter(|r| r.group_id == g.chat_id && r.outcome == SendOutcome::Success)
                .count(),
        })
        .collect();
    engagement.sort_by(|a, b| b.delivered.cmp(&a.delivered).then(a.chat_id.cmp(&b.chat_id)));

    Ok(StatsReport {
        quizzes_total: quizzes.len(),
        quizzes_active: quizzes.iter().filter(|q| q.active).count(),
        groups_total: groups.iter().filter(|g| in_scope(g.chat_id)).count(),
        groups_active: groups
            .iter()
            .filter(|g| g.active && in_scope(g.chat_id))
            .count(),
        sends_total: scoped.len(),
        delivered: scoped
            .iter()
            .filter(|r| r.outcome == SendOutcome::Success)
            .count(),
        failed: scoped
            .iter()
            .filter(|r| r.outcome == SendOutcome::Failed)
            .count(),
        auto_sends: scoped
            .iter()
            .filter(|r| r.trigger == SendTrigger::Auto)
            .count(),
        manual_sends: scoped
            .iter()
            .filter(|r| r.trigger == SendTrigger::Manual)
            .count(),
        last_send: scoped
            .iter()
            .filter(|r| r.outcome == SendOutcome::Success)
            .map(|r| r.timestamp)
            .max(),
        engagement,
    })
}

async fn fetch<T: serde::de::DeserializeOwned>(store: &dyn Store, collection: &str) -> Result<Vec<T>> {
    let docs = store.list_where(collection, &|_: &Record| true).await?;
    Ok(docs
        .into_iter()
        .filter_map(|d| serde_json::from_value(d).ok())
        .collect())
}
