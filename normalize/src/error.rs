//! Normalizer error type (§4.C, §7).

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("malformed request body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("tool result {tool_use_id:?} has no matching tool_use in this request")]
    MalformedToolChain { tool_use_id: String },
}
