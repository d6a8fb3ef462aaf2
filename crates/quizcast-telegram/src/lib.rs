//! Telegram transport — quiz polls and messages via the Bot API.
//!
//! Implements [`QuizTransport`] over plain HTTPS with reqwest. The transport
//! owns outcome classification: it knows which Bot API errors mean "the chat
//! is gone" versus "try again"; retry policy stays in the engine.

use async_trait::async_trait;
use quizcast_core::config::TelegramConfig;
use quizcast_core::error::{QuizcastError, Result};
use quizcast_core::traits::QuizTransport;
use quizcast_core::types::SendResult;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

pub struct TelegramTransport {
    config: TelegramConfig,
    client: reqwest::Client,
    send_timeout: Duration,
    last_update_id: AtomicI64,
}

impl TelegramTransport {
    pub fn new(config: TelegramConfig, send_timeout_secs: u64) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            send_timeout: Duration::from_secs(send_timeout_secs.max(1)),
            last_update_id: AtomicI64::new(0),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base, self.config.bot_token, method
        )
    }

    /// POST one Bot API method and classify the outcome.
    async fn call(&self, method: &str, body: serde_json::Value) -> SendResult {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .timeout(self.send_timeout)
            .send()
            .await;
        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return SendResult::Transient(format!("{method} timed out"));
            }
            Err(e) => return SendResult::Transient(format!("{method} failed: {e}")),
        };
        let status = response.status().as_u16();
        match response.json::<TelegramApiResponse<serde_json::Value>>().await {
            Ok(api) if api.ok => SendResult::Success,
            Ok(api) => classify(
                api.error_code.unwrap_or(status as i64),
                &api.description.unwrap_or_default(),
                api.parameters.as_ref(),
            ),
            Err(e) => SendResult::Transient(format!("invalid {method} response: {e}")),
        }
    }

    /// Verify the token and fetch the bot identity.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .timeout(self.send_timeout)
            .send()
            .await
            .map_err(|e| QuizcastError::Transport(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| QuizcastError::Transport(format!("invalid getMe response: {e}")))?;
        body.result
            .ok_or_else(|| QuizcastError::Transport("no bot info in getMe response".into()))
    }

    /// Fetch new updates via long polling. The update offset advances
    /// internally, so each update is seen once.
    pub async fn get_updates(&self) -> Result<Vec<TelegramUpdate>> {
        let offset = self.last_update_id.load(Ordering::Relaxed) + 1;
        let timeout = self.config.poll_timeout_secs;
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout.to_string()),
                ("allowed_updates", "[\"message\"]".into()),
            ])
            // Long poll: the request legitimately idles for `timeout` secs.
            .timeout(Duration::from_secs(timeout + 10))
            .send()
            .await
            .map_err(|e| QuizcastError::Transport(format!("getUpdates failed: {e}")))?;

        let body: TelegramApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| QuizcastError::Transport(format!("invalid getUpdates response: {e}")))?;

        if !body.ok {
            return Err(QuizcastError::Transport(format!(
                "getUpdates error: {}",
                body.description.unwrap_or_default()
            )));
        }

        let updates = body.result.unwrap_or_default();
        if let Some(last) = updates.last() {
            self.last_update_id.store(last.update_id, Ordering::Relaxed);
        }
        Ok(updates)
    }
}

#[async_trait]
impl QuizTransport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_quiz_poll(
        &self,
        chat_id: i64,
        question: &str,
        options: &[String],
        correct_index: u32,
        explanation: Option<&str>,
    ) -> SendResult {
        self.call("sendPoll", poll_body(chat_id, question, options, correct_index, explanation))
            .await
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> SendResult {
        self.call(
            "sendMessage",
            serde_json::json!({ "chat_id": chat_id, "text": text }),
        )
        .await
    }
}

/// Body for a quiz-mode poll. Always non-anonymous, single-answer, with the
/// correct option marked — plain polls are never sent by this engine.
fn poll_body(
    chat_id: i64,
    question: &str,
    options: &[String],
    correct_index: u32,
    explanation: Option<&str>,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "chat_id": chat_id,
        "question": question,
        "options": options,
        "type": "quiz",
        "is_anonymous": false,
        "allows_multiple_answers": false,
        "correct_option_id": correct_index,
    });
    if let Some(text) = explanation
        && !text.is_empty()
    {
        body["explanation"] = serde_json::json!(text);
    }
    body
}

/// Map a Bot API error onto the engine's taxonomy. 403s and the handful of
/// 400s that mean "this chat will never work again" are permanent; anything
/// else (rate limits, server trouble) is worth retrying.
fn classify(
    error_code: i64,
    description: &str,
    parameters: Option<&ResponseParameters>,
) -> SendResult {
    const DEAD_CHAT_MARKERS: [&str; 4] = [
        "chat not found",
        "bot was kicked",
        "bot was blocked",
        "not enough rights",
    ];

    if error_code == 403 {
        return SendResult::Permanent(format!("forbidden: {description}"));
    }
    if error_code == 400 {
        let lower = description.to_ascii_lowercase();
        if DEAD_CHAT_MARKERS.iter().any(|m| lower.contains(m)) {
            return SendResult::Permanent(description.to_string());
        }
        if parameters.is_some_and(|p| p.migrate_to_chat_id.is_some()) {
            // The group became a supergroup under a new id; the old id is dead.
            return SendResult::Permanent(format!("chat migrated: {description}"));
        }
    }
    if error_code == 429 {
        let after = parameters.and_then(|p| p.retry_after).unwrap_or(0);
        return SendResult::Transient(format!("rate limited, retry after {after}s"));
    }
    SendResult::Transient(format!("api error {error_code}: {description}"))
}

// --- Bot API types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    pub retry_after: Option<u64>,
    pub migrate_to_chat_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
}

impl TelegramChat {
    pub fn is_group(&self) -> bool {
        matches!(self.chat_type.as_str(), "group" | "supergroup")
    }
}
