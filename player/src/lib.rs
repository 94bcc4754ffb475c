//! Bonk player
//!
//! Hosts a [`bonk_playback`] renderer on a cpal output stream and feeds it from
//! capture files at playback pace.

pub mod config;
pub mod driver;
pub mod output;
pub mod source;

pub use config::PlayerConfig;
pub use driver::CallbackDriver;
pub use output::{DeviceOutput, OutputError};
pub use source::{FeedSummary, Pacing, RawSource, SourceError, SourceFormat, SseSource};
