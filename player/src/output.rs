//! Audio output using cpal, driven by the realtime renderer

use std::sync::Arc;

use bonk_playback::{PlaybackShared, RealtimeRenderer};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::OutputConfig;
use crate::driver::CallbackDriver;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("No audio output device available")]
    NoDevice,
    #[error("Output device not found: {0}")]
    DeviceNotFound(String),
    #[error("Failed to enumerate output devices: {0}")]
    Devices(#[from] cpal::DevicesError),
    #[error("Failed to get default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("Failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("Failed to play audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

/// An open output stream whose callback runs the renderer
pub struct DeviceOutput {
    /// The cpal stream (kept alive for the duration)
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
    shared: Arc<PlaybackShared>,
}

impl DeviceOutput {
    /// Open the configured device and start rendering into it
    ///
    /// The stream's frame counter is the global sample clock handed to the
    /// renderer.
    pub fn open(renderer: RealtimeRenderer, config: &OutputConfig) -> Result<Self, OutputError> {
        let host = cpal::default_host();
        let device = select_device(&host, config.device.as_deref())?;

        let supported = device.default_output_config()?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.into();

        let shared = Arc::clone(renderer.shared());
        let driver = CallbackDriver::new(renderer, channels as usize, config.render_quantum);

        let stream = match format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, driver, |s| s)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, driver, |s| {
                (s * 32767.0).clamp(-32768.0, 32767.0) as i16
            })?,
            // 0x8000 is silence for u16 audio
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, driver, |s| {
                (s * 32767.0 + 32768.0).clamp(0.0, 65535.0) as u16
            })?,
            other => return Err(OutputError::UnsupportedFormat(format!("{other:?}"))),
        };

        stream.play()?;

        info!(
            "Audio output: {} Hz, {} channel(s), {:?}",
            sample_rate, channels, format
        );

        Ok(Self {
            _stream: stream,
            sample_rate,
            channels,
            shared,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// True once the renderer has acknowledged a stop
    pub fn is_finished(&self) -> bool {
        self.shared.is_stopped()
    }
}

fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, OutputError> {
    let Some(name) = name else {
        return host.default_output_device().ok_or(OutputError::NoDevice);
    };
    for device in host.output_devices()? {
        if device.name().is_ok_and(|n| n == name) {
            debug!("Using output device {}", name);
            return Ok(device);
        }
    }
    Err(OutputError::DeviceNotFound(name.to_string()))
}

fn build_stream<T: cpal::SizedSample + Send + 'static>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut driver: CallbackDriver,
    convert: fn(f32) -> T,
) -> Result<cpal::Stream, OutputError> {
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            driver.process(data, convert);
        },
        |err| error!("Audio stream error: {}", err),
        None,
    )?;
    Ok(stream)
}
