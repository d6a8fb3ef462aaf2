//! Data model — quizzes, groups, send records, and transport results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QuizcastError, Result};

/// A quiz: one question, several options, one correct answer.
/// Immutable once created; retired via the `active` flag, never deleted
/// while send records reference it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    /// Unique id, stable across restarts.
    pub id: String,
    pub question: String,
    /// Ordered answer options (2..=10, the poll limit).
    pub options: Vec<String>,
    /// Index into `options` of the correct answer.
    pub correct_index: u32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Quiz {
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        correct_index: u32,
        category: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            question: question.into(),
            options,
            correct_index,
            category,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Sanity-check option count and answer index.
    pub fn validate(&self) -> Result<()> {
        if self.question.trim().is_empty() {
            return Err(QuizcastError::InvalidQuiz("question is empty".into()));
        }
        if self.options.len() < 2 || self.options.len() > 10 {
            return Err(QuizcastError::InvalidQuiz(format!(
                "polls take 2-10 options, got {}",
                self.options.len()
            )));
        }
        if (self.correct_index as usize) >= self.options.len() {
            return Err(QuizcastError::InvalidQuiz(format!(
                "correct_index {} out of range for {} options",
                self.correct_index,
                self.options.len()
            )));
        }
        Ok(())
    }
}

/// A chat destination the engine may send quizzes to. The Telegram chat id
/// is the group's identity and storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub chat_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    /// Inactive groups are skipped by the scheduler but remain known and can
    /// still receive manual sends.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Per-group override of the process-wide send interval.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub last_send: Option<DateTime<Utc>>,
    /// Set while a send is in flight for this group; the value identifies
    /// the holder so a crashed process can be recovered.
    #[serde(default)]
    pub send_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(chat_id: i64, title: Option<String>) -> Self {
        Self {
            chat_id,
            title,
            active: true,
            interval_secs: None,
            last_send: None,
            send_token: None,
            created_at: Utc::now(),
        }
    }

    /// The group's send interval: its own override, or the process default.
    pub fn effective_interval(&self, default_secs: u64) -> u64 {
        self.interval_secs.unwrap_or(default_secs)
    }

    /// Whether this group is due for an automatic send. Groups that have
    /// never been sent anything are due immediately.
    pub fn is_due(&self, now: DateTime<Utc>, default_secs: u64) -> bool {
        if !self.active {
            return false;
        }
        match self.last_send {
            None => true,
            Some(last) => {
                let elapsed = (now - last).num_seconds();
                elapsed >= 0 && elapsed as u64 >= self.effective_interval(default_secs)
            }
        }
    }
}

/// Recorded outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Success,
    Failed,
}

/// What initiated a delivery: the scheduler tick or an admin command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendTrigger {
    Auto,
    Manual,
}

/// One attempted delivery, success or failure. Append-only: successful
/// records form the anti-repeat history and are never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRecord {
    pub id: String,
    pub group_id: i64,
    pub quiz_id: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: SendOutcome,
    pub trigger: SendTrigger,
}

impl SendRecord {
    pub fn new(group_id: i64, quiz_id: &str, outcome: SendOutcome, trigger: SendTrigger) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            group_id,
            quiz_id: quiz_id.to_string(),
            timestamp: Utc::now(),
            outcome,
            trigger,
        }
    }
}

/// A privileged user. Flat set; membership is the whole check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SudoUser {
    pub user_id: i64,
    pub granted_by: i64,
    pub granted_at: DateTime<Utc>,
}

/// Classified outcome of one transport call. The transport knows the
/// platform and does the classification; the dispatcher decides policy
/// (retry, defer, deactivate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResult {
    Success,
    /// Network trouble, rate limiting, server errors — worth retrying.
    Transient(String),
    /// The chat is gone or the bot was removed — deactivate the group.
    Permanent(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn quiz(options: usize, correct: u32) -> Quiz {
        Quiz::new(
            "What is the answer?",
            (0..options).map(|i| format!("option {i}")).collect(),
            correct,
            None,
        )
    }

    #[test]
    fn test_quiz_validation() {
        assert!(quiz(4, 0).validate().is_ok());
        assert!(quiz(1, 0).validate().is_err());
        assert!(quiz(11, 0).validate().is_err());
        assert!(quiz(4, 4).validate().is_err());
        let mut q = quiz(4, 3);
        q.question = "   ".into();
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_group_due_math() {
        let now = Utc::now();
        let mut group = Group::new(42, None);

        // Never sent: due immediately.
        assert!(group.is_due(now, 3600));

        group.last_send = Some(now - Duration::seconds(1800));
        assert!(!group.is_due(now, 3600));
        assert!(group.is_due(now, 1800));

        // Per-group override wins over the default.
        group.interval_secs = Some(60);
        assert!(group.is_due(now, 3600));

        group.active = false;
        assert!(!group.is_due(now, 3600));
    }

    #[test]
    fn test_send_record_roundtrip() {
        let rec = SendRecord::new(-100123, "q1", SendOutcome::Success, SendTrigger::Manual);
        let doc = serde_json::to_value(&rec).unwrap();
        assert_eq!(doc["outcome"], "success");
        assert_eq!(doc["trigger"], "manual");
        let back: SendRecord = serde_json::from_value(doc).unwrap();
        assert_eq!(back, rec);
    }
}
