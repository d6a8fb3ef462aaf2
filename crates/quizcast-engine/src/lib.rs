//! # Quizcast Engine
//!
//! The quiz distribution engine: decides *when* each group gets a quiz,
//! *which* quiz it gets, and whether the send went well enough to record.
//!
//! ## Architecture
//! ```text
//! Scheduler (tokio interval tick)
//!   └── due groups → QuizService::deliver (one task per group)
//!         ├── GroupRegistry   per-group send token (mutual exclusion)
//!         ├── Selector        active quizzes minus delivered history
//!         ├── Dispatcher      rate limit + retry/backoff → transport
//!         └── QuizBank        append-only send records (history, stats)
//!
//! Manual /rquiz requests skip the due check and enter at deliver().
//! ```
//!
//! Everything below the service talks to storage through the
//! [`Store`](quizcast_core::Store) trait only; no component knows which
//! backend is active.

pub mod bank;
pub mod dispatch;
pub mod ratelimit;
pub mod registry;
pub mod scheduler;
pub mod select;
pub mod service;
pub mod stats;
pub mod sudo;

pub use bank::QuizBank;
pub use dispatch::Dispatcher;
pub use ratelimit::RateLimiter;
pub use registry::GroupRegistry;
pub use scheduler::Scheduler;
pub use select::Selector;
pub use service::{BroadcastReport, QuizService};
pub use stats::{GroupEngagement, StatsReport};
pub use sudo::SudoRegistry;

use quizcast_core::traits::Record;

/// Serialize a known-plain struct into a stored document.
pub(crate) fn doc<T: serde::Serialize>(value: &T) -> Record {
    serde_json::to_value(value).unwrap_or(Record::Null)
}

#[cfg(test)]
pub(crate) mod testutil;
