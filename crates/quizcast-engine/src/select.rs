//! Selection engine — anti-repeat quiz choice.
//!
//! Full-history avoidance: a group never sees the same quiz twice until it
//! has seen every active quiz. An exhausted pool resets the group's history
//! and retries once, so the very next selection always succeeds while the
//! bank has any active quiz at all.

use quizcast_core::error::{QuizcastError, Result};
use quizcast_core::types::Quiz;
use rand::seq::SliceRandom;

use crate::bank::QuizBank;

#[derive(Clone)]
pub struct Selector {
    bank: QuizBank,
}

impl Selector {
    pub fn new(bank: QuizBank) -> Self {
        Self { bank }
    }

    /// Pick the next quiz for a group: uniform over the active quizzes the
    /// group has not successfully received. `Exhausted` only when the bank
    /// itself has no active quizzes.
    pub async fn select(&self, group_id: i64) -> Result<Quiz> {
        let active = self.bank.active_quizzes().await?;
        if active.is_empty() {
            return Err(QuizcastError::Exhausted);
        }
        let delivered = self.bank.history(group_id).await?;
        let pool: Vec<&Quiz> = active
            .iter()
            .filter(|q| !delivered.contains(&q.id))
            .collect();
        if let Some(quiz) = pool.choose(&mut rand::thread_rng()) {
            return Ok((*quiz).clone());
        }

        // The group has seen every active quiz: full reset, then one retry
        // drawing from the complete pool.
        tracing::debug!("chat {group_id} exhausted the quiz pool, resetting history");
        self.bank.reset_history(group_id).await?;
        active
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(QuizcastError::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::memory_store;
    use quizcast_core::types::{SendOutcome, SendTrigger};
    use std::collections::HashSet;

    async fn bank_with(questions: &[&str]) -> (QuizBank, Vec<Quiz>) {
        let bank = QuizBank::new(memory_store());
        let mut quizzes = Vec::new();
        for q in questions {
            let quiz = Quiz::new(*q, vec!["a".into(), "b".into()], 0, None);
            quizzes.push(bank.add_quiz(quiz).await.unwrap());
        }
        (bank, quizzes)
    }

    #[tokio::test]
    async fn test_empty_bank_is_exhausted() {
        let (bank, _) = bank_with(&[]).await;
        let selector = Selector::new(bank);
        assert!(matches!(
            selector.select(1).await,
            Err(QuizcastError::Exhausted)
        ));
    }

    #[tokio::test]
    async fn test_pool_of_one_is_deterministic() {
        let (bank, quizzes) = bank_with(&["a", "b", "c"]).await;
        for q in &quizzes[..2] {
            bank.record_attempt(1, &q.id, SendOutcome::Success, SendTrigger::Auto)
                .await
                .unwrap();
        }
        let selector = Selector::new(bank);
        // Only quiz C remains; the draw has no freedom.
        for _ in 0..5 {
            assert_eq!(selector.select(1).await.unwrap().id, quizzes[2].id);
        }
    }

    #[tokio::test]
    async fn test_exhaustion_resets_and_succeeds_immediately() {
        let (bank, quizzes) = bank_with(&["a", "b", "c"]).await;
        for q in &quizzes {
            bank.record_attempt(1, &q.id, SendOutcome::Success, SendTrigger::Auto)
                .await
                .unwrap();
        }
        let selector = Selector::new(bank.clone());

        // Pool is empty: the very next selection must still succeed, drawing
        // from the full reset pool.
        let picked = selector.select(1).await.unwrap();
        let all: HashSet<_> = quizzes.iter().map(|q| q.id.clone()).collect();
        assert!(all.contains(&picked.id));
        assert!(bank.history(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_attempts_do_not_shrink_pool() {
        let (bank, quizzes) = bank_with(&["a", "b"]).await;
        bank.record_attempt(1, &quizzes[0].id, SendOutcome::Success, SendTrigger::Auto)
            .await
            .unwrap();
        bank.record_attempt(1, &quizzes[1].id, SendOutcome::Failed, SendTrigger::Auto)
            .await
            .unwrap();
        let selector = Selector::new(bank);
        // The failed quiz is still the only eligible one.
        assert_eq!(selector.select(1).await.unwrap().id, quizzes[1].id);
    }

    #[tokio::test]
    async fn test_inactive_quizzes_never_selected() {
        let (bank, quizzes) = bank_with(&["a", "b"]).await;
        bank.deactivate_quiz(&quizzes[0].id).await.unwrap();
        let selector = Selector::new(bank);
        for _ in 0..5 {
            assert_eq!(selector.select(1).await.unwrap().id, quizzes[1].id);
        }
    }

    #[tokio::test]
    async fn test_histories_are_per_group() {
        let (bank, quizzes) = bank_with(&["a", "b"]).await;
        bank.record_attempt(1, &quizzes[0].id, SendOutcome::Success, SendTrigger::Auto)
            .await
            .unwrap();
        let selector = Selector::new(bank);
        // Group 1 can only get B; group 2 can still get either.
        assert_eq!(selector.select(1).await.unwrap().id, quizzes[1].id);
        let mut seen = HashSet::new();
        for _ in 0..50 {
            seen.insert(selector.select(2).await.unwrap().id);
        }
        assert_eq!(seen.len(), 2);
    }
}
