//! Dispatch error taxonomy.

use crate::http::envelope::{codes, Envelope, EnvelopeDecodeError};

/// Failure of a single attempt or of a whole logical call.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no healthy instance available")]
    NoHealthyInstance,

    #[error("invalid instance address {address}: {reason}")]
    AddressInvalid { address: String, reason: String },

    #[error("circuit open for {instance}")]
    CircuitOpen { instance: String },

    #[error("transport error calling {instance}: {reason}")]
    Transport { instance: String, reason: String },

    #[error("{instance} returned an invalid envelope")]
    EnvelopeDecode {
        instance: String,
        #[source]
        source: EnvelopeDecodeError,
    },

    #[error("request encoding failed: {0}")]
    Encode(String),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<DispatchError>,
    },
}

impl DispatchError {
    /// Whether another attempt may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::NoHealthyInstance
                | DispatchError::CircuitOpen { .. }
                | DispatchError::Transport { .. }
        )
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::NoHealthyInstance => "no_healthy_instance",
            DispatchError::AddressInvalid { .. } => "address_invalid",
            DispatchError::CircuitOpen { .. } => "circuit_open",
            DispatchError::Transport { .. } => "transport",
            DispatchError::EnvelopeDecode { .. } => "envelope_decode",
            DispatchError::Encode(_) => "encode",
            DispatchError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }

    /// The error that ended the call, looking through retry exhaustion.
    pub fn root(&self) -> &DispatchError {
        match self {
            DispatchError::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    /// Envelope rendered to the client for this failure.
    pub fn to_envelope(&self) -> Envelope {
        match self.root() {
            DispatchError::EnvelopeDecode { source, .. } => source.fallback.clone(),
            DispatchError::Encode(reason) => Envelope::error(codes::PARAMS_ERROR, reason.clone()),
            _ => Envelope::error(codes::EXCEPTION, self.to_string()),
        }
    }
}
