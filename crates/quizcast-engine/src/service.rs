//! Service facade — the admin/CLI surface and the per-group delivery flow.
//!
//! One explicit context value instead of globals: the service owns the store
//! handle, the rate bucket, and the components, and is handed to the
//! scheduler and the command router at construction.

use chrono::{DateTime, Utc};
use quizcast_core::config::QuizcastConfig;
use quizcast_core::error::{QuizcastError, Result};
use quizcast_core::traits::{QuizTransport, Store};
use quizcast_core::types::{Group, Quiz, SendOutcome, SendResult, SendTrigger};
use serde::Serialize;
use std::sync::Arc;

use crate::bank::QuizBank;
use crate::dispatch::Dispatcher;
use crate::ratelimit::RateLimiter;
use crate::registry::GroupRegistry;
use crate::select::Selector;
use crate::stats::{self, StatsReport};
use crate::sudo::SudoRegistry;

pub struct QuizService {
    store: Arc<dyn Store>,
    bank: QuizBank,
    registry: GroupRegistry,
    selector: Selector,
    dispatcher: Dispatcher,
    sudo: SudoRegistry,
}

impl QuizService {
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn QuizTransport>,
        cfg: &QuizcastConfig,
    ) -> Arc<Self> {
        let limiter = Arc::new(RateLimiter::new(&cfg.delivery.rate));
        let bank = QuizBank::new(store.clone());
        let registry = GroupRegistry::new(store.clone(), cfg.schedule.default_interval_secs);
        let selector = Selector::new(bank.clone());
        let dispatcher = Dispatcher::new(
            transport,
            limiter,
            cfg.delivery.clone(),
            cfg.admin.quiz_explanation.clone(),
        );
        let sudo = SudoRegistry::new(store.clone(), cfg.admin.root_user_id);
        Arc::new(Self {
            store,
            bank,
            registry,
            selector,
            dispatcher,
            sudo,
        })
    }

    pub fn bank(&self) -> &QuizBank {
        &self.bank
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    pub fn sudo(&self) -> &SudoRegistry {
        &self.sudo
    }

    /// Clear scheduling state left over from a previous process. Run once at
    /// startup, before the scheduler.
    pub async fn recover(&self) -> Result<()> {
        self.registry.recover_stale_sends().await?;
        Ok(())
    }

    pub async fn add_quiz(
        &self,
        question: &str,
        options: Vec<String>,
        correct_index: u32,
        category: Option<String>,
    ) -> Result<Quiz> {
        self.bank
            .add_quiz(Quiz::new(question, options, correct_index, category))
            .await
    }

    pub async fn register_group(&self, chat_id: i64, title: Option<&str>) -> Result<Group> {
        self.registry.register(chat_id, title).await
    }

    pub async fn deactivate_group(&self, chat_id: i64) -> Result<()> {
        self.registry.deactivate(chat_id).await
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        self.registry.list_all().await
    }

    pub async fn stats(&self, group: Option<i64>) -> Result<StatsReport> {
        stats::collect(self.store.as_ref(), group).await
    }

    pub async fn due_groups(&self, now: DateTime<Utc>) -> Result<Vec<Group>> {
        self.registry.due_for_send(now).await
    }

    /// The manual /rquiz path: bypasses the due timer, reactivates the group
    /// if needed (admin override), and on success advances `last_send` so
    /// the automatic timer does not immediately re-fire.
    pub async fn trigger_manual_send(&self, chat_id: i64) -> Result<String> {
        let group = self
            .registry
            .get(chat_id)
            .await?
            .ok_or(QuizcastError::UnknownGroup(chat_id))?;
        if !group.active {
            self.registry.reactivate(chat_id).await?;
        }
        self.deliver(chat_id, SendTrigger::Manual).await
    }

    /// One delivery for one group: select, send, record. At most one of
    /// these runs per group at any time; a concurrent caller gets
    /// `SendInFlight` and must treat it as a no-op.
    pub async fn deliver(&self, chat_id: i64, trigger: SendTrigger) -> Result<String> {
        let group = self
            .registry
            .get(chat_id)
            .await?
            .ok_or(QuizcastError::UnknownGroup(chat_id))?;
        let Some(token) = self.registry.try_begin_send(chat_id).await? else {
            tracing::debug!("send already in flight for chat {chat_id}, skipping");
            return Err(QuizcastError::SendInFlight(chat_id));
        };
        let result = self.deliver_locked(&group, trigger).await;
        if let Err(e) = self.registry.finish_send(chat_id, &token).await {
            tracing::warn!("failed to release send slot for chat {chat_id}: {e}");
        }
        result
    }

    async fn deliver_locked(&self, group: &Group, trigger: SendTrigger) -> Result<String> {
        let quiz = self.selector.select(group.chat_id).await?;
        match self.dispatcher.send_quiz(group, &quiz).await {
            SendResult::Success => {
                self.bank
                    .record_attempt(group.chat_id, &quiz.id, SendOutcome::Success, trigger)
                    .await?;
                self.registry.mark_sent(group.chat_id, Utc::now()).await?;
                tracing::info!("📤 quiz {} delivered to chat {}", quiz.id, group.chat_id);
                Ok(quiz.id)
            }
            SendResult::Transient(reason) => {
                // Recorded for observability only; last_send stays put so the
                // group is due again on the next tick, not a full interval.
                self.bank
                    .record_attempt(group.chat_id, &quiz.id, SendOutcome::Failed, trigger)
                    .await?;
                Err(QuizcastError::Transport(reason))
            }
            SendResult::Permanent(reason) => {
                self.bank
                    .record_attempt(group.chat_id, &quiz.id, SendOutcome::Failed, trigger)
                    .await?;
                self.registry.deactivate(group.chat_id).await?;
                Err(QuizcastError::Transport(reason))
            }
        }
    }

    /// One-shot text fan-out to the current active-group snapshot. Failures
    /// are counted, never fatal; a permanently dead chat is deactivated just
    /// like in quiz delivery.
    pub async fn broadcast(&self, text: &str) -> Result<BroadcastReport> {
        let groups = self.registry.list_active().await?;
        let mut report = BroadcastReport::default();
        for group in &groups {
            match self.dispatcher.send_text(group.chat_id, text).await {
                SendResult::Success => report.sent += 1,
                SendResult::Transient(reason) => {
                    report.failed += 1;
                    tracing::warn!("broadcast to chat {} failed: {reason}", group.chat_id);
                }
                SendResult::Permanent(reason) => {
                    report.failed += 1;
                    tracing::warn!("broadcast to chat {} failed: {reason}", group.chat_id);
                    self.registry.deactivate(group.chat_id).await?;
                }
            }
        }
        tracing::info!(
            "📣 broadcast delivered to {}/{} groups",
            report.sent,
            groups.len()
        );
        Ok(report)
    }
}

/// Outcome of one broadcast job. Transient by design: nothing is persisted.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}
