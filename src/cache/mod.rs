//! Versioned cache partitions and their storage backends.
//!
//! Partitions are named, isolated key-value stores of HTTP responses. The
//! storage interface is injected so strategies can be tested against an
//! in-memory fake; the binary runs on the SQLite backend so cached responses
//! survive worker restarts.

mod memory;
mod partition;
mod sqlite;
mod store;

pub use memory::MemoryStore;
pub use partition::PartitionSet;
pub use sqlite::SqliteStore;
pub use store::{CacheEntry, CacheStore};
