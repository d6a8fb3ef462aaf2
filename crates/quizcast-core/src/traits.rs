//! Capability traits — the persistence contract and the chat-transport seam.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::SendResult;

/// A stored record. Documents are schemaless JSON; each collection's owner
/// knows its own shape.
pub type Record = serde_json::Value;

/// Collection names used by the engine.
pub mod collections {
    pub const QUIZZES: &str = "quizzes";
    pub const GROUPS: &str = "groups";
    pub const SENDS: &str = "sends";
    pub const SUDO_USERS: &str = "sudo_users";
    pub const HISTORY_RESETS: &str = "history_resets";

    /// Every collection, for backends that hydrate or migrate wholesale.
    pub const ALL: [&str; 5] = [QUIZZES, GROUPS, SENDS, SUDO_USERS, HISTORY_RESETS];
}

/// Uniform key/record storage. The durable and in-memory backends implement
/// the same contract; nothing above this trait may know which one is active.
#[async_trait]
pub trait Store: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Record>>;

    async fn put(&self, collection: &str, key: &str, record: Record) -> Result<()>;

    /// All records in a collection matching the predicate.
    async fn list_where(
        &self,
        collection: &str,
        pred: &(dyn for<'r> Fn(&'r Record) -> bool + Send + Sync),
    ) -> Result<Vec<Record>>;

    /// Read-modify-write under the backend's lock: `apply` sees the current
    /// record (if any) and returns the replacement, which is stored and
    /// returned. Two updates on the same key never interleave.
    async fn atomic_update(
        &self,
        collection: &str,
        key: &str,
        apply: &(dyn Fn(Option<Record>) -> Record + Send + Sync),
    ) -> Result<Record>;
}

/// Outbound chat transport. Implementations talk to the platform and
/// classify its errors into [`SendResult`]; retry and deactivation policy
/// stay in the engine.
#[async_trait]
pub trait QuizTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Send a non-anonymous quiz-mode poll with the correct answer marked.
    async fn send_quiz_poll(
        &self,
        chat_id: i64,
        question: &str,
        options: &[String],
        correct_index: u32,
        explanation: Option<&str>,
    ) -> SendResult;

    /// Send a plain text message (broadcasts, command replies).
    async fn send_text(&self, chat_id: i64, text: &str) -> SendResult;
}
