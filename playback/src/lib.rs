//! Bonk playback core
//!
//! Plays timestamped blocks of mono samples in lockstep with a host audio clock.
//!
//! # Architecture
//!
//! ```text
//! Control Context                  Command Queue              Render Context
//!     │                                  │                          │
//! [Message arrives]                      │                          │
//! [StreamIngest::handle]                 │                          │
//!     │  (epoch math, Block build)       │                          │
//!     └──────────────(SPSC ring)──────►[Command]                     │
//!                                        └─────────────────────►[Drain]
//!                                                               [BlockRing]
//!                                                               [render(G, out)]
//! ```
//!
//! - The control context ([`StreamIngest`]) runs at arbitrary latency. It turns
//!   wire messages into blocks carrying global sample indices and never blocks;
//!   commands the queue cannot take yet wait in a backlog that evicts its oldest block.
//! - The render context ([`RealtimeRenderer`]) is invoked by the host audio callback
//!   with the global sample index `G`. It drains pending commands into a fixed-capacity
//!   [`BlockRing`], then fills the output window. It never locks, allocates, or logs.
//! - Diagnostics flow back only through atomic counters in [`PlaybackShared`], which the
//!   control context reads and logs.
//!
//! # Usage
//!
//! ```
//! use bonk_playback::{IngestMessage, PipelineOptions, StreamParams, pipeline};
//!
//! let (mut ingest, mut renderer) = pipeline(PipelineOptions::default());
//! ingest.handle(IngestMessage::Params(StreamParams::default())).unwrap();
//! ingest
//!     .handle(IngestMessage::Buffer { start: 0, samples: vec![0.25; 128] })
//!     .unwrap();
//!
//! let mut out = [0.0f32; 128];
//! assert!(renderer.render(0, &mut out));
//! assert_eq!(out[0], 0.25);
//! ```

pub mod block;
pub mod error;
pub mod ingest;
pub mod message;
pub mod params;
pub mod pipeline;
pub mod renderer;
pub mod ring;
pub mod shared;
pub mod sse;

pub use block::Block;
pub use error::{IngestError, RingCondition};
pub use ingest::{ClockEpoch, DiagnosticsReporter, StreamIngest};
pub use message::IngestMessage;
pub use params::StreamParams;
pub use pipeline::{PipelineOptions, pipeline};
pub use renderer::{OutputSample, RealtimeRenderer, RendererState};
pub use ring::BlockRing;
pub use shared::{PlaybackShared, PlaybackStats};
pub use sse::{SseDecoder, SseEvent};

/// Default number of blocks the render-side ring holds
pub const DEFAULT_BLOCK_CAPACITY: usize = 4096;

/// Default number of pending control commands between two render cycles:
/// a full ring of blocks plus a restart and a parameter set
pub const DEFAULT_COMMAND_CAPACITY: usize = DEFAULT_BLOCK_CAPACITY + 2;

/// Render quantum used by hosts that do not dictate one (Web Audio style)
pub const DEFAULT_RENDER_QUANTUM: usize = 128;
