//! Error types for the signature store.
//!
//! Per the failure semantics in §4.A: durable-tier write failures are
//! logged and dropped, never propagated to the request path. This error
//! type exists for the durable tier's internal plumbing (open/migrate) and
//! for tests; `put`/`get_by` on `SignatureStore` itself never return it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("durable-tier write queue is full, dropping record")]
    QueueFull,
}
