//! Error taxonomy shared across all Quizcast crates.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuizcastError>;

#[derive(Debug, Error)]
pub enum QuizcastError {
    /// The durable backend is unreachable. The store layer recovers by
    /// degrading to memory; callers above the store never see this.
    #[error("storage unavailable: {0}")]
    Storage(String),

    /// No quiz can be selected because the bank has no active quizzes.
    #[error("quiz bank has no active quizzes")]
    Exhausted,

    /// A send for this group is already in flight; the caller must no-op.
    #[error("a send is already in flight for chat {0}")]
    SendInFlight(i64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unknown group: chat {0}")]
    UnknownGroup(i64),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid quiz: {0}")]
    InvalidQuiz(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
