//! Test doubles and fixtures shared by the engine tests.

use async_trait::async_trait;
use quizcast_core::config::{DeliveryConfig, QuizcastConfig, RateLimitConfig};
use quizcast_core::traits::{QuizTransport, Store};
use quizcast_core::types::SendResult;
use quizcast_store::MemoryStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::service::QuizService;

pub(crate) fn memory_store() -> Arc<dyn Store> {
    Arc::new(MemoryStore::new())
}

/// Delivery config with negligible backoff and an effectively unlimited
/// rate bucket, so tests never wait on real time.
pub(crate) fn fast_delivery_config() -> DeliveryConfig {
    DeliveryConfig {
        max_attempts: 3,
        backoff_base_ms: 1,
        backoff_cap_ms: 4,
        send_timeout_secs: 1,
        rate: RateLimitConfig {
            max_messages_per_minute: 60_000,
            burst: 1_000,
        },
    }
}

pub(crate) fn fast_config() -> QuizcastConfig {
    let mut cfg = QuizcastConfig::default();
    cfg.delivery = fast_delivery_config();
    cfg.schedule.tick_secs = 1;
    cfg
}

pub(crate) fn service_with(transport: Arc<MockTransport>) -> Arc<QuizService> {
    QuizService::new(memory_store(), transport, &fast_config())
}

/// Scriptable transport. Scripted results are consumed in call order; once
/// the script runs dry every call gets the fallback result. Optionally slow
/// for a single chat, to model one sluggish group.
pub(crate) struct MockTransport {
    script: Mutex<VecDeque<SendResult>>,
    fallback: SendResult,
    slow_chat: Mutex<Option<(i64, Duration)>>,
    polls: Mutex<Vec<(i64, String)>>,
    texts: Mutex<Vec<(i64, String)>>,
}

impl MockTransport {
    pub fn ok() -> Arc<Self> {
        Self::build(Vec::new(), SendResult::Success)
    }

    pub fn always(result: SendResult) -> Arc<Self> {
        Self::build(Vec::new(), result)
    }

    pub fn scripted(script: Vec<SendResult>) -> Arc<Self> {
        Self::build(script, SendResult::Success)
    }

    fn build(script: Vec<SendResult>, fallback: SendResult) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            slow_chat: Mutex::new(None),
            polls: Mutex::new(Vec::new()),
            texts: Mutex::new(Vec::new()),
        })
    }

    pub fn slow_down(&self, chat_id: i64, delay: Duration) {
        *self.slow_chat.lock().unwrap() = Some((chat_id, delay));
    }

    pub fn poll_calls(&self) -> usize {
        self.polls.lock().unwrap().len()
    }

    pub fn polls_to(&self, chat_id: i64) -> usize {
        self.polls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == chat_id)
            .count()
    }

    pub fn text_calls(&self) -> usize {
        self.texts.lock().unwrap().len()
    }

    async fn next_result(&self, chat_id: i64) -> SendResult {
        let delay = match *self.slow_chat.lock().unwrap() {
            Some((id, d)) if id == chat_id => Some(d),
            _ => None,
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl QuizTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_quiz_poll(
        &self,
        chat_id: i64,
        question: &str,
        _options: &[String],
        _correct_index: u32,
        _explanation: Option<&str>,
    ) -> SendResult {
        self.polls
            .lock()
            .unwrap()
            .push((chat_id, question.to_string()));
        self.next_result(chat_id).await
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> SendResult {
        self.texts.lock().unwrap().push((chat_id, text.to_string()));
        self.next_result(chat_id).await
    }
}
