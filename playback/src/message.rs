//! Control → core message schema
//!
//! Three message kinds reach the core: `stop`, `params` and `buffer`. On the
//! wire they are JSON objects tagged by `event`; buffer payloads are raw
//! little-endian f64 bytes, base64-encoded when carried in text.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;

use crate::error::IngestError;
use crate::params::StreamParams;

/// A decoded ingest message
#[derive(Debug, Clone, PartialEq)]
pub enum IngestMessage {
    /// Tear the render unit down on its next cycle
    Stop,
    /// Replace the active parameter set as a whole
    Params(StreamParams),
    /// A chunk of samples at `start` samples into the current epoch
    ///
    /// `start == 0` begins a new epoch.
    Buffer { start: u64, samples: Vec<f64> },
}

impl IngestMessage {
    /// Short name used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Params(_) => "params",
            Self::Buffer { .. } => "buffer",
        }
    }

    /// Decode a JSON control message
    ///
    /// Accepts `{"event": "stop" | "params" | "buffer", ...}` and the bare
    /// string `"stop"`.
    pub fn from_json(text: &str) -> Result<Self, IngestError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if let serde_json::Value::String(bare) = &value {
            return match bare.as_str() {
                "stop" => Ok(Self::Stop),
                other => Err(IngestError::Malformed(format!(
                    "unknown bare message {other:?}"
                ))),
            };
        }

        match serde_json::from_value::<WireMessage>(value)? {
            WireMessage::Stop => Ok(Self::Stop),
            WireMessage::Params { params } => Ok(Self::Params(params)),
            WireMessage::Buffer { start, buffer } => Ok(Self::Buffer {
                start,
                samples: decode_base64_samples(&buffer)?,
            }),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum WireMessage {
    Stop,
    Params { params: StreamParams },
    Buffer { start: u64, buffer: String },
}

/// Decode raw little-endian f64 samples
///
/// The payload must be a non-empty whole number of 8-byte samples.
pub fn decode_samples(bytes: &[u8]) -> Result<Vec<f64>, IngestError> {
    const WIDTH: usize = std::mem::size_of::<f64>();
    if bytes.is_empty() || !bytes.len().is_multiple_of(WIDTH) {
        return Err(IngestError::PayloadLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(WIDTH)
        .map(|chunk| {
            let mut raw = [0u8; WIDTH];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

/// Decode a standard base64 string holding little-endian f64 samples
pub fn decode_base64_samples(encoded: &str) -> Result<Vec<f64>, IngestError> {
    let bytes = BASE64.decode(encoded.trim())?;
    decode_samples(&bytes)
}

/// Encode samples the way the upstream producer does (base64 of LE f64)
pub fn encode_base64_samples(samples: &[f64]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    BASE64.encode(bytes)
}
