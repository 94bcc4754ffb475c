//! bonk-player: play a captured sample stream through an audio device

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use bonk_player::config;
use bonk_player::source::{self, Pacing, SourceFormat};
use bonk_player::DeviceOutput;
use bonk_playback::{StreamParams, pipeline};
use clap::Parser;
use tracing::{info, warn};

/// Longest wait for the queued audio to play out once feeding is done
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest wait for the renderer to acknowledge a stop
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "bonk-player", version, about = "Play a captured sample stream")]
struct Args {
    /// Capture file to play
    input: PathBuf,

    /// Input file format
    #[arg(long, value_enum, default_value_t = SourceFormat::Raw)]
    format: SourceFormat,

    /// Stream sample rate (defaults to the device rate)
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Samples per chunk when splitting raw input
    #[arg(long)]
    block_size: Option<u32>,

    /// Output device name
    #[arg(long)]
    device: Option<String>,

    /// Config file (defaults to config.toml in the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// How far ahead of playback chunks are delivered, in milliseconds
    #[arg(long)]
    lead_ms: Option<u64>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => config::load(),
    };
    if let Some(device) = args.device.clone() {
        config.output.device = Some(device);
    }
    if let Some(lead_ms) = args.lead_ms {
        config.feed.lead_ms = lead_ms;
    }

    if !args.input.exists() {
        bail!("Input file not found: {}", args.input.display());
    }

    let (mut ingest, renderer) = pipeline(config.playback.pipeline_options());
    let output =
        DeviceOutput::open(renderer, &config.output).context("Failed to open audio output")?;

    let mut params = StreamParams {
        audio_sample_rate: args.sample_rate.unwrap_or(output.sample_rate()),
        ..StreamParams::default()
    };
    if let Some(block_size) = args.block_size {
        params.audio_block_size = block_size;
    }
    if params.audio_sample_rate != output.sample_rate() {
        warn!(
            "Stream rate {} Hz differs from device rate {} Hz; playing without resampling",
            params.audio_sample_rate,
            output.sample_rate()
        );
    }

    let messages = source::load(&args.input, args.format, params.audio_block_size as usize)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    info!(
        "Playing {} ({} messages, {} Hz)",
        args.input.display(),
        messages.len(),
        params.audio_sample_rate
    );

    let pacing = Pacing::new(params.audio_sample_rate, config.feed.lead());
    ingest.set_params(params).context("Failed to send stream parameters")?;

    let mut reporter = ingest.diagnostics(config.diagnostics.interval());
    let summary = source::feed(&mut ingest, messages, &pacing, &mut reporter);
    if summary.rejected > 0 {
        warn!("{} messages were rejected", summary.rejected);
    }

    let drained =
        summary.stopped || source::wait_until_drained(&mut ingest, &mut reporter, DRAIN_TIMEOUT);
    if !drained {
        warn!("Playback did not drain within {:?}", DRAIN_TIMEOUT);
    }

    ingest.stop();
    let deadline = Instant::now() + STOP_TIMEOUT;
    while !output.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    if !output.is_finished() {
        warn!("Renderer did not acknowledge stop");
    }

    let totals = ingest.stats();
    reporter.report();
    info!(
        "Playback finished: {} blocks played, {} underrun samples, {} overflows",
        totals.blocks_played, totals.underrun_samples, totals.overflows
    );
    Ok(())
}
