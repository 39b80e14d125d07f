//! Credential Pool (§4.E): per-credential, per-model cooldown state with
//! exponential backoff, and a selection policy for dispatch.

pub mod durable;
pub mod error;
pub mod pool;

pub use durable::DurableCredentials;
pub use error::CredentialError;
pub use pool::{now_secs, CredentialPool, Outcome};
