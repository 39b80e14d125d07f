//! Streaming protocol translator (§4.D): upstream SSE to Anthropic, OpenAI,
//! or vendor NDJSON client formats, without losing thinking signatures.

pub mod anthropic;
pub mod error;
pub mod ndjson;
pub mod openai;
pub mod state_machine;
pub mod upstream;

pub use anthropic::AnthropicEncoder;
pub use error::TranslateError;
pub use ndjson::NdjsonEncoder;
pub use openai::OpenAiEncoder;
pub use state_machine::{DownstreamOp, Translator};
pub use upstream::{ParseResult, UpstreamParseError, UpstreamParser};

use gateway_sigstore::SignatureStore;
use gateway_types::{ApiDialect, ClientKind, TranslatorEvent};

/// Per-format wire encoder, so the dispatcher can drive a single pipeline
/// regardless of which of the three client dialects it is serving.
pub enum Encoder {
    Anthropic(AnthropicEncoder),
    OpenAi(OpenAiEncoder),
    Ndjson(NdjsonEncoder),
}

impl Encoder {
    #[must_use]
    pub fn for_dialect(dialect: ApiDialect) -> Self {
        match dialect {
            ApiDialect::Anthropic => Self::Anthropic(AnthropicEncoder::new()),
            ApiDialect::OpenAi => Self::OpenAi(OpenAiEncoder::new()),
            ApiDialect::Ndjson => Self::Ndjson(NdjsonEncoder::new()),
        }
    }

    fn encode(&mut self, op: &DownstreamOp) -> Vec<String> {
        match self {
            Self::Anthropic(e) => e.encode(op),
            Self::OpenAi(e) => e.encode(op),
            Self::Ndjson(e) => e.encode(op),
        }
    }
}

/// Drives one upstream event through the state machine and the chosen
/// format encoder, in order (§4.D "Ordering guarantee").
pub struct Pipeline<'a> {
    translator: Translator<'a>,
    encoder: Encoder,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(store: &'a SignatureStore, client_kind: ClientKind, dialect: ApiDialect) -> Self {
        Self {
            translator: Translator::new(store, client_kind),
            encoder: Encoder::for_dialect(dialect),
        }
    }

    /// Feed one internal event; returns the wire frames it produces.
    pub fn feed(&mut self, event: TranslatorEvent) -> Result<Vec<String>, TranslateError> {
        let ops = self.translator.apply(event)?;
        Ok(ops.iter().flat_map(|op| self.encoder.encode(op)).collect())
    }
}
