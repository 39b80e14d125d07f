//! Core domain types for the gateway.
//!
//! Pure types, no IO, no async. Everything here can be used from any crate
//! in the workspace.

pub mod block;
pub mod credential;
pub mod event;
pub mod fingerprint;
pub mod ids;
pub mod protocol;
pub mod proofs;
pub mod signature;

pub use block::{Block, CanonicalMessage, Role};
pub use credential::{
    Credential, CredentialKind, CredentialStatus, CooldownEntry, ModelCooldownStatus,
    DEFAULT_MAX_BACKOFF_LEVEL, wait_for_level,
};
pub use event::{BlockKind, BlockStartMeta, FinishReason, TranslatorEvent};
pub use ids::{RequestId, SignatureId};
pub use protocol::ApiDialect;
pub use proofs::{EmptyStringError, NonEmptyString};
pub use signature::{ClientKind, Fingerprint, FingerprintKind, Signature, SignatureRecord};
