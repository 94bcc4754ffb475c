//! Server-sent event framing used by the upstream simulation stream
//!
//! ```text
//! id: 1024
//! event: audio-block
//! data: <base64 little-endian f64 samples>
//!
//! :              (comment / keep-alive)
//!
//! event: heartbeat
//! data:
//! ```
//!
//! The event `id` carries the block's sample offset within the current epoch.

use std::borrow::Cow;

use tracing::debug;

use crate::error::IngestError;
use crate::message::{IngestMessage, decode_base64_samples};

/// Event type carrying a block of samples
pub const AUDIO_BLOCK_EVENT: &str = "audio-block";
/// Keep-alive event type
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// One dispatched event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub id: Option<String>,
    /// Event type; `message` when the stream omitted it
    pub event: String,
    pub data: String,
}

impl SseEvent {
    /// Convert to an ingest message
    ///
    /// Returns `Ok(None)` for keep-alives and event types the core does not consume.
    pub fn into_message(self) -> Result<Option<IngestMessage>, IngestError> {
        match self.event.as_str() {
            AUDIO_BLOCK_EVENT => {
                let id = self
                    .id
                    .ok_or_else(|| IngestError::Malformed("audio-block without id".into()))?;
                let start = id.trim().parse::<u64>().map_err(|e| {
                    IngestError::Malformed(format!("audio-block id {id:?} is not an offset: {e}"))
                })?;
                let samples = decode_base64_samples(&self.data)?;
                Ok(Some(IngestMessage::Buffer { start, samples }))
            }
            HEARTBEAT_EVENT => Ok(None),
            other => {
                debug!("Ignoring stream event of type {:?}", other);
                Ok(None)
            }
        }
    }
}

/// Incremental event-stream parser
///
/// Input may be split at any byte boundary between `feed` calls, including
/// inside a multi-byte UTF-8 character.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of an incomplete trailing line
    partial: Vec<u8>,
    id: Option<String>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of stream bytes, returning every event completed by it
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Vec<SseEvent> {
        let mut buf = std::mem::take(&mut self.partial);
        // The carried tail holds no newline; only new bytes need scanning
        let mut scan_from = buf.len();
        buf.extend_from_slice(chunk.as_ref());

        let mut events = Vec::new();
        let mut cursor = 0;
        while let Some(len) = buf[scan_from..].iter().position(|&b| b == b'\n') {
            let line = &buf[cursor..scan_from + len];
            cursor = scan_from + len + 1;
            scan_from = cursor;
            if let Some(event) = self.process_line(&decode_line(line)) {
                events.push(event);
            }
        }

        // Keep only the unterminated tail
        buf.drain(..cursor);
        self.partial = buf;
        events
    }

    /// Dispatch a trailing event that was not blank-line terminated
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            if let Some(event) = self.process_line(&decode_line(&line)) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "id" => self.id = Some(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // retry and unknown fields carry nothing for playback
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            // The last event id persists across events per the SSE model
            id: self.id.clone(),
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Line bytes without the terminator; invalid UTF-8 becomes U+FFFD
fn decode_line(line: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(line.strip_suffix(b"\r").unwrap_or(line))
}
