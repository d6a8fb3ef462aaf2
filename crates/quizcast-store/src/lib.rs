//! # Quizcast Store
//!
//! The persistence adapter: one [`Store`](quizcast_core::Store) contract,
//! three implementations.
//!
//! - [`SqliteStore`] — durable JSON documents in a single keyed table.
//! - [`MemoryStore`] — volatile twin with identical semantics.
//! - [`FallbackStore`] — memory mirror in front of SQLite; degrades to
//!   memory-only (logged once) when the durable backend fails, instead of
//!   crashing. This is what the binary actually opens.

pub mod fallback;
pub mod memory;
pub mod sqlite;

pub use fallback::FallbackStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
