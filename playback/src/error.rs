//! Error types for ingest and the block ring

use thiserror::Error;

/// Non-fatal conditions reported by [`BlockRing`](crate::BlockRing)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingCondition {
    /// The ring was full; the oldest block was evicted to admit the new one
    #[error("block ring overflow: dropped block starting at sample {dropped_start}")]
    Overflow { dropped_start: u64 },
    /// Nothing to pop
    #[error("block ring underflow")]
    Underflow,
}

/// Errors raised in the control context while ingesting messages
///
/// None of these ever reach the render context.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("sample payload of {0} bytes is not a whole number of f64 samples")]
    PayloadLength(usize),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("stream already stopped")]
    Stopped,
}

impl IngestError {
    /// Whether the message itself was bad (as opposed to a stream-state condition)
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Malformed(_)
                | Self::Json(_)
                | Self::Base64(_)
                | Self::PayloadLength(_)
                | Self::InvalidParams(_)
        )
    }
}
