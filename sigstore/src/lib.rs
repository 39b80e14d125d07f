//! Two-tier signature cache (§4.A): in-memory hot tier + durable SQLite tier.
//!
//! Grounded on `context/src/stream_journal.rs` (WAL schema, background
//! batched writer) and `context/src/sqlite_util.rs` (secure file open).

mod durable;
mod error;
mod hot;
mod sqlite_util;
mod store;

pub use error::SigStoreError;
pub use store::{SignatureStore, Stats};
