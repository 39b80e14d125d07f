//! Credential pool error type (§4.E, §7).

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// `acquire`'s deadline elapsed before any credential became eligible.
    /// Surfaced to callers as `NO_CREDENTIAL_AVAILABLE` (§7).
    #[error("no credential became eligible before the deadline")]
    Deadline { retry_after_secs: u64 },
}
