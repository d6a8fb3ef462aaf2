//! Delivery dispatcher — one quiz to one group, with retry and backoff.

use quizcast_core::config::DeliveryConfig;
use quizcast_core::traits::QuizTransport;
use quizcast_core::types::{Group, Quiz, SendResult};
use std::sync::Arc;
use std::time::Duration;

use crate::ratelimit::RateLimiter;

/// Sends through the transport behind the shared rate limiter. Transient
/// failures retry here with bounded exponential backoff; the final
/// classification goes back to the caller, which owns recording policy.
pub struct Dispatcher {
    transport: Arc<dyn QuizTransport>,
    limiter: Arc<RateLimiter>,
    cfg: DeliveryConfig,
    explanation: String,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn QuizTransport>,
        limiter: Arc<RateLimiter>,
        cfg: DeliveryConfig,
        explanation: String,
    ) -> Self {
        Self {
            transport,
            limiter,
            cfg,
            explanation,
        }
    }

    pub async fn send_quiz(&self, group: &Group, quiz: &Quiz) -> SendResult {
        let attempts = self.cfg.max_attempts.max(1);
        let cap = Duration::from_millis(self.cfg.backoff_cap_ms);
        let mut delay = Duration::from_millis(self.cfg.backoff_base_ms);

        for attempt in 1..=attempts {
            self.limiter.acquire().await;
            let result = self
                .transport
                .send_quiz_poll(
                    group.chat_id,
                    &quiz.question,
                    &quiz.options,
                    quiz.correct_index,
                    Some(&self.explanation),
                )
                .await;
            match result {
                SendResult::Success => return SendResult::Success,
                SendResult::Permanent(reason) => {
                    tracing::warn!("chat {} permanently unreachable: {reason}", group.chat_id);
                    return SendResult::Permanent(reason);
                }
                SendResult::Transient(reason) => {
                    if attempt == attempts {
                        tracing::warn!(
                            "giving up on chat {} after {attempts} attempts: {reason}",
                            group.chat_id
                        );
                        return SendResult::Transient(reason);
                    }
                    tracing::debug!(
                        "send to chat {} failed (attempt {attempt}/{attempts}), \
                         retrying in {delay:?}: {reason}",
                        group.chat_id
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(cap);
                }
            }
        }
        SendResult::Transient("retries exhausted".into())
    }

    pub async fn send_text(&self, chat_id: i64, text: &str) -> SendResult {
        self.limiter.acquire().await;
        self.transport.send_text(chat_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fast_delivery_config, MockTransport};
    use quizcast_core::types::Group;

    fn quiz() -> Quiz {
        Quiz::new("q", vec!["a".into(), "b".into()], 0, None)
    }

    fn dispatcher(transport: Arc<MockTransport>) -> Dispatcher {
        let cfg = fast_delivery_config();
        let limiter = Arc::new(RateLimiter::new(&cfg.rate));
        Dispatcher::new(transport, limiter, cfg, "done".into())
    }

    #[tokio::test]
    async fn test_transient_failures_retry_until_success() {
        let transport = MockTransport::scripted(vec![
            SendResult::Transient("net down".into()),
            SendResult::Transient("net down".into()),
            SendResult::Success,
        ]);
        let d = dispatcher(transport.clone());
        let result = d.send_quiz(&Group::new(1, None), &quiz()).await;
        assert_eq!(result, SendResult::Success);
        assert_eq!(transport.poll_calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let transport = MockTransport::always(SendResult::Transient("net down".into()));
        let d = dispatcher(transport.clone());
        let result = d.send_quiz(&Group::new(1, None), &quiz()).await;
        assert!(matches!(result, SendResult::Transient(_)));
        assert_eq!(transport.poll_calls(), 3); // max_attempts
    }

    #[tokio::test]
    async fn test_permanent_failure_short_circuits() {
        let transport = MockTransport::always(SendResult::Permanent("kicked".into()));
        let d = dispatcher(transport.clone());
        let result = d.send_quiz(&Group::new(1, None), &quiz()).await;
        assert!(matches!(result, SendResult::Permanent(_)));
        assert_eq!(transport.poll_calls(), 1);
    }
}
