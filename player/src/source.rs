//! Capture-file sources and real-time delivery into a `StreamIngest`

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use bonk_playback::message::decode_samples;
use bonk_playback::{DiagnosticsReporter, IngestError, IngestMessage, SseDecoder, StreamIngest};
use thiserror::Error;
use tracing::{debug, warn};

/// Longest single sleep while waiting for a chunk to come due
const PACING_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceFormat {
    /// Raw little-endian f64 samples
    #[default]
    Raw,
    /// Captured server-sent event stream
    Sse,
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid sample data: {0}")]
    Decode(#[from] IngestError),
    #[error("Block size must be greater than zero")]
    ZeroBlockSize,
}

/// A file of raw samples, cut into fixed-size chunks
#[derive(Debug, Clone)]
pub struct RawSource {
    samples: Vec<f64>,
    block_size: usize,
}

impl RawSource {
    pub fn open(path: &Path, block_size: usize) -> Result<Self, SourceError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes, block_size)
    }

    pub fn from_bytes(bytes: &[u8], block_size: usize) -> Result<Self, SourceError> {
        if block_size == 0 {
            return Err(SourceError::ZeroBlockSize);
        }
        Ok(Self {
            samples: decode_samples(bytes)?,
            block_size,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// One `Buffer` per chunk at local offsets `0, N, 2N, ...`
    pub fn messages(&self) -> Vec<IngestMessage> {
        self.samples
            .chunks(self.block_size)
            .enumerate()
            .map(|(i, chunk)| IngestMessage::Buffer {
                start: (i * self.block_size) as u64,
                samples: chunk.to_vec(),
            })
            .collect()
    }
}

/// A captured event stream
#[derive(Debug, Clone, Default)]
pub struct SseSource {
    messages: Vec<IngestMessage>,
    skipped: usize,
}

impl SseSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_text(&text))
    }

    /// Decode every event; malformed events are logged and skipped
    pub fn from_text(text: &str) -> Self {
        let mut decoder = SseDecoder::new();
        let mut events = decoder.feed(text);
        events.extend(decoder.finish());

        let mut source = Self::default();
        for event in events {
            match event.into_message() {
                Ok(Some(message)) => source.messages.push(message),
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping malformed stream event: {}", e);
                    source.skipped += 1;
                }
            }
        }
        debug!(
            "Decoded {} messages from event stream ({} skipped)",
            source.messages.len(),
            source.skipped
        );
        source
    }

    pub fn messages(&self) -> &[IngestMessage] {
        &self.messages
    }

    /// Events that failed to decode
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn into_messages(self) -> Vec<IngestMessage> {
        self.messages
    }
}

/// Read a capture file in the given format
pub fn load(
    path: &Path,
    format: SourceFormat,
    block_size: usize,
) -> Result<Vec<IngestMessage>, SourceError> {
    match format {
        SourceFormat::Raw => Ok(RawSource::open(path, block_size)?.messages()),
        SourceFormat::Sse => Ok(SseSource::open(path)?.into_messages()),
    }
}

/// Delivery schedule: a chunk at local offset `n` is due `n / rate - lead`
/// after its epoch began
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub sample_rate: u32,
    pub lead: Duration,
}

impl Pacing {
    pub fn new(sample_rate: u32, lead: Duration) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            lead,
        }
    }

    /// Time after the epoch start at which `local_offset` should be delivered
    pub fn due(&self, local_offset: u64) -> Duration {
        let rate = f64::from(self.sample_rate.max(1));
        let at = Duration::from_secs_f64(local_offset as f64 / rate);
        at.saturating_sub(self.lead)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub delivered: usize,
    pub rejected: usize,
    /// Playback stopped before every message was delivered
    pub stopped: bool,
}

/// Deliver messages in order, paced to playback
///
/// Sleeps in short slices while waiting so diagnostics keep flowing.
pub fn feed(
    ingest: &mut StreamIngest,
    messages: impl IntoIterator<Item = IngestMessage>,
    pacing: &Pacing,
    reporter: &mut DiagnosticsReporter,
) -> FeedSummary {
    let mut summary = FeedSummary::default();
    let mut epoch_start = Instant::now();

    for message in messages {
        if let IngestMessage::Buffer { start, .. } = &message {
            if *start == 0 {
                epoch_start = Instant::now();
            }
            let due = epoch_start + pacing.due(*start);
            loop {
                let now = Instant::now();
                if now >= due {
                    break;
                }
                ingest.flush();
                reporter.maybe_log();
                thread::sleep((due - now).min(PACING_SLICE));
            }
        }

        let kind = message.kind();
        match ingest.handle(message) {
            Ok(()) => summary.delivered += 1,
            Err(IngestError::Stopped) => {
                summary.stopped = true;
                break;
            }
            Err(e) => {
                warn!("Rejected {} message: {}", kind, e);
                summary.rejected += 1;
            }
        }
        reporter.maybe_log();
    }
    summary
}

/// Wait for the renderer to take in every queued command and play out every block
///
/// Returns `false` if `timeout` elapsed first or playback stopped.
pub fn wait_until_drained(
    ingest: &mut StreamIngest,
    reporter: &mut DiagnosticsReporter,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    // The queued gauge is written at the end of a cycle, so an empty reading
    // only counts once a later cycle has started
    let mut empty_since_cycle = None;
    loop {
        if ingest.is_stopped() {
            return false;
        }
        ingest.flush();
        let stats = ingest.stats();
        if ingest.pending_commands() == 0 && stats.queued_blocks == 0 {
            match empty_since_cycle {
                Some(cycle) if stats.cycles > cycle => return true,
                Some(_) => {}
                None => empty_since_cycle = Some(stats.cycles),
            }
        } else {
            empty_since_cycle = None;
        }
        if Instant::now() >= deadline {
            return false;
        }
        reporter.maybe_log();
        thread::sleep(PACING_SLICE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bonk_playback::message::encode_base64_samples;
    use bonk_playback::{PipelineOptions, StreamParams, pipeline};

    fn le_bytes(samples: &[f64]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn starts(messages: &[IngestMessage]) -> Vec<u64> {
        messages
            .iter()
            .filter_map(|m| match m {
                IngestMessage::Buffer { start, .. } => Some(*start),
                _ => None,
            })
            .collect()
    }

    // =============================================================
    // Sources
    // =============================================================

    #[test]
    fn test_raw_source_chunks_at_block_offsets() {
        let samples: Vec<f64> = (0..10).map(f64::from).collect();
        let source = RawSource::from_bytes(&le_bytes(&samples), 4).unwrap();
        assert_eq!(source.len(), 10);

        let messages = source.messages();
        assert_eq!(starts(&messages), vec![0, 4, 8]);
        let IngestMessage::Buffer { samples: last, .. } = &messages[2] else {
            panic!("expected buffer");
        };
        assert_eq!(last, &vec![8.0, 9.0]);
    }

    #[test]
    fn test_raw_source_rejects_bad_input() {
        assert!(matches!(
            RawSource::from_bytes(&[0u8; 12], 4),
            Err(SourceError::Decode(IngestError::PayloadLength(12)))
        ));
        assert!(matches!(
            RawSource::from_bytes(&le_bytes(&[1.0]), 0),
            Err(SourceError::ZeroBlockSize)
        ));
    }

    #[test]
    fn test_raw_source_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bonk.f64");
        std::fs::write(&path, le_bytes(&[0.5; 6])).unwrap();

        let messages = load(&path, SourceFormat::Raw, 3).unwrap();
        assert_eq!(starts(&messages), vec![0, 3]);
    }

    #[test]
    fn test_sse_source_skips_malformed_events() {
        let text = format!(
            "id: 0\nevent: audio-block\ndata: {}\n\n\
             event: heartbeat\ndata:\n\n\
             id: 2\nevent: audio-block\ndata: not base64!\n\n\
             id: 4\nevent: audio-block\ndata: {}",
            encode_base64_samples(&[1.0, 2.0]),
            encode_base64_samples(&[3.0]),
        );
        let source = SseSource::from_text(&text);
        // The unterminated trailing event is flushed at end of input
        assert_eq!(starts(source.messages()), vec![0, 4]);
        assert_eq!(source.skipped(), 1);
    }

    // =============================================================
    // Pacing and feeding
    // =============================================================

    #[test]
    fn test_pacing_due_subtracts_lead() {
        let pacing = Pacing::new(1000, Duration::from_millis(250));
        assert_eq!(pacing.due(0), Duration::ZERO);
        assert_eq!(pacing.due(100), Duration::ZERO);
        assert_eq!(pacing.due(1000), Duration::from_millis(750));
    }

    #[test]
    fn test_feed_delivers_in_order() {
        let (mut ingest, mut renderer) = pipeline(PipelineOptions::default());
        ingest.set_params(StreamParams::default()).unwrap();
        let mut reporter = ingest.diagnostics(Duration::from_secs(3600));

        let samples: Vec<f64> = (1..=8).map(f64::from).collect();
        let source = RawSource::from_bytes(&le_bytes(&samples), 2).unwrap();
        // Lead covers the whole file, so nothing waits
        let pacing = Pacing::new(48_000, Duration::from_secs(1));
        let summary = feed(&mut ingest, source.messages(), &pacing, &mut reporter);
        assert_eq!(
            summary,
            FeedSummary {
                delivered: 4,
                rejected: 0,
                stopped: false,
            }
        );

        let mut out = [0.0f64; 8];
        assert!(renderer.render(0, &mut out));
        assert_eq!(out.to_vec(), samples);
    }

    #[test]
    fn test_feed_counts_rejections_and_stops() {
        let (mut ingest, mut renderer) = pipeline(PipelineOptions::default());
        let mut reporter = ingest.diagnostics(Duration::from_secs(3600));
        let pacing = Pacing::new(48_000, Duration::from_secs(1));

        let messages = vec![
            IngestMessage::Buffer {
                start: 0,
                samples: Vec::new(),
            },
            IngestMessage::Stop,
            IngestMessage::Buffer {
                start: 0,
                samples: vec![1.0],
            },
            IngestMessage::Buffer {
                start: 1,
                samples: vec![1.0],
            },
        ];
        let summary = feed(&mut ingest, messages, &pacing, &mut reporter);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.delivered, 1);
        assert!(summary.stopped);

        let mut out = [0.0f32; 4];
        assert!(!renderer.render(0, &mut out));
    }

    #[test]
    fn test_wait_until_drained_tracks_renderer() {
        let (mut ingest, mut renderer) = pipeline(PipelineOptions::default());
        ingest.set_params(StreamParams::default()).unwrap();
        ingest.push_buffer(0, vec![1.0; 64]).unwrap();
        let mut reporter = ingest.diagnostics(Duration::from_secs(3600));

        assert!(!wait_until_drained(&mut ingest, &mut reporter, Duration::ZERO));

        let render_thread = thread::spawn(move || {
            let mut clock = 0u64;
            let mut out = [0.0f32; 16];
            while renderer.render(clock, &mut out) {
                clock += out.len() as u64;
                thread::sleep(Duration::from_millis(1));
            }
        });

        assert!(wait_until_drained(&mut ingest, &mut reporter, Duration::from_secs(10)));
        ingest.stop();
        render_thread.join().unwrap();
        assert!(!wait_until_drained(&mut ingest, &mut reporter, Duration::from_secs(10)));
    }
}
