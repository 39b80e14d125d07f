//! Shared application state handed to every axum handler via `State`,
//! matching `scoootscooob-aegis-protocol/indexer/src/api.rs`'s
//! `State<Arc<EventProcessor>>` pattern, generalized to the handful of
//! long-lived components the gateway needs.

use std::sync::Arc;

use gateway_credentials::CredentialPool;
use gateway_dispatch::Dispatcher;
use gateway_sigstore::SignatureStore;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<SignatureStore>,
    pub credentials: CredentialPool,
    pub admin_password: Option<String>,
    pub request_timeout: std::time::Duration,
}
