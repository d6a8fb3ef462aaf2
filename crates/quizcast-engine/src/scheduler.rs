//! Scheduler — the tick loop that drives automatic sends.
//!
//! One loop wakes on a short interval, scans for due groups, and spawns one
//! delivery task per group. Tasks from earlier ticks keep running — a slow
//! group never delays another group's due check — and a group whose previous
//! send has not resolved is skipped by the per-group send token, not by any
//! global lock. Shutdown drains every in-flight send before returning.

use chrono::Utc;
use quizcast_core::error::QuizcastError;
use quizcast_core::types::SendTrigger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::service::QuizService;

pub struct Scheduler {
    service: Arc<QuizService>,
    tick: Duration,
}

type DeliveryResult = (i64, quizcast_core::error::Result<String>);

impl Scheduler {
    pub fn new(service: Arc<QuizService>, tick_secs: u64) -> Self {
        Self {
            service,
            tick: Duration::from_secs(tick_secs.max(1)),
        }
    }

    /// Run until the shutdown flag flips (or its sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick);
        let mut inflight: JoinSet<DeliveryResult> = JoinSet::new();
        tracing::info!("⏰ scheduler started (tick every {:?})", self.tick);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // Reap whatever finished since the last tick without
                    // waiting on stragglers.
                    while let Some(joined) = inflight.try_join_next() {
                        log_joined(joined);
                    }
                    let due = match self.service.due_groups(Utc::now()).await {
                        Ok(due) => due,
                        Err(e) => {
                            tracing::warn!("due scan failed: {e}");
                            continue;
                        }
                    };
                    for group in due {
                        let service = self.service.clone();
                        inflight.spawn(async move {
                            let chat_id = group.chat_id;
                            (chat_id, service.deliver(chat_id, SendTrigger::Auto).await)
                        });
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        // Drain so shutdown never abandons a half-recorded delivery.
        while let Some(joined) = inflight.join_next().await {
            log_joined(joined);
        }
        tracing::info!("⏰ scheduler stopped");
    }
}

fn log_joined(joined: Result<DeliveryResult, tokio::task::JoinError>) {
    match joined {
        Ok((chat_id, Ok(quiz_id))) => {
            tracing::debug!("tick delivery done: quiz {quiz_id} to chat {chat_id}");
        }
        // Expected overlaps and empty banks are routine, not warnings.
        Ok((_, Err(QuizcastError::SendInFlight(_)))) => {}
        Ok((chat_id, Err(QuizcastError::Exhausted))) => {
            tracing::debug!("no active quizzes for chat {chat_id}");
        }
        Ok((chat_id, Err(e))) => {
            tracing::warn!("tick delivery failed for chat {chat_id}: {e}");
        }
        Err(e) => {
            tracing::warn!("delivery task panicked: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{service_with, MockTransport};

    async fn seed(service: &QuizService) {
        service
            .add_quiz("q", vec!["a".into(), "b".into()], 0, None)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_group_is_served_exactly_once_per_interval() {
        let transport = MockTransport::ok();
        let service = service_with(transport.clone());
        seed(&service).await;
        service.register_group(1, None).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Scheduler::new(service.clone(), 1).run(rx));

        // Let several ticks elapse. The default interval is an hour of wall
        // time, so after the first delivery the group stops being due.
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(transport.polls_to(1), 1);
        assert_eq!(service.bank().history(1).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_group_does_not_stall_other_groups() {
        let transport = MockTransport::ok();
        // Chat 1 sleeps so long inside its send that several ticks pass.
        transport.slow_down(1, Duration::from_secs(30));
        let service = service_with(transport.clone());
        seed(&service).await;
        service.register_group(1, None).await.unwrap();
        service.register_group(2, None).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Scheduler::new(service.clone(), 1).run(rx));

        tokio::time::sleep(Duration::from_secs(5)).await;
        // Group 2 already went out while group 1 is still in flight.
        assert_eq!(transport.polls_to(2), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // Group 1 eventually completed exactly once: overlapping ticks were
        // rejected by its send token while the slow send was in flight.
        assert_eq!(transport.polls_to(1), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_inflight_sends() {
        let transport = MockTransport::ok();
        transport.slow_down(1, Duration::from_secs(10));
        let service = service_with(transport.clone());
        seed(&service).await;
        service.register_group(1, None).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Scheduler::new(service.clone(), 1).run(rx));

        // Give the first tick a moment to spawn the slow delivery.
        tokio::time::sleep(Duration::from_secs(2)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // The in-flight send was joined, not abandoned.
        assert_eq!(transport.polls_to(1), 1);
        assert_eq!(service.bank().history(1).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_groups_are_skipped() {
        let transport = MockTransport::ok();
        let service = service_with(transport.clone());
        seed(&service).await;
        service.register_group(1, None).await.unwrap();
        service.deactivate_group(1).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Scheduler::new(service.clone(), 1).run(rx));
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(transport.poll_calls(), 0);
    }
}
