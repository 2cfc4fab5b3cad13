// Audio stream - cpal output stream driving the transport engine
//
// The engine is moved into the device callback. It renders f32 into a
// preallocated scratch buffer, converted to the device format on the way out.

use super::deadline::DeadlineMonitor;
use super::engine::TransportEngine;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Audio device errors
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("No audio output device found")]
    NoDevice,

    #[error("Device configuration error: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to build stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("Failed to start stream: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("Unsupported sample format: {0:?}. Supported formats: F32, I16, U16")]
    UnsupportedFormat(SampleFormat),

    #[error("Device runs at {device} Hz but the tempo map is at {engine} Hz")]
    SampleRateMismatch { device: f64, engine: f64 },
}

/// Sample rate of the default output device, if there is one
pub fn default_output_sample_rate() -> Result<f64, StreamError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(StreamError::NoDevice)?;
    let config = device.default_output_config()?;
    Ok(config.sample_rate().0 as f64)
}

/// Running output stream; audio stops when this is dropped
pub struct AudioStream {
    _stream: Stream,
    sample_rate: f64,
    channels: usize,
    device_name: String,
    failed: Arc<AtomicBool>,
    deadline: DeadlineMonitor,
}

impl AudioStream {
    /// Open the default output device and start processing `engine`
    ///
    /// The engine's tempo map must already be at the device sample rate.
    pub fn start(engine: TransportEngine, max_block_frames: usize) -> Result<Self, StreamError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(StreamError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported_config = device.default_output_config()?;
        let sample_format = supported_config.sample_format();
        log::info!("Audio device: {}", device_name);
        log::debug!("Audio config: {:?}", supported_config);

        let sample_rate = supported_config.sample_rate().0 as f64;
        if sample_rate != engine.sample_rate() {
            return Err(StreamError::SampleRateMismatch {
                device: sample_rate,
                engine: engine.sample_rate(),
            });
        }

        let channels = supported_config.channels() as usize;
        let config: StreamConfig = supported_config.into();
        let deadline = engine.deadline_monitor();
        let failed = Arc::new(AtomicBool::new(false));

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(
                &device,
                &config,
                channels,
                max_block_frames,
                engine,
                failed.clone(),
            ),
            SampleFormat::I16 => build_stream::<i16>(
                &device,
                &config,
                channels,
                max_block_frames,
                engine,
                failed.clone(),
            ),
            SampleFormat::U16 => build_stream::<u16>(
                &device,
                &config,
                channels,
                max_block_frames,
                engine,
                failed.clone(),
            ),
            other => return Err(StreamError::UnsupportedFormat(other)),
        }?;

        stream.play()?;
        log::info!(
            "Audio stream started: {} Hz, {} channels, {:?}",
            sample_rate,
            channels,
            sample_format
        );

        Ok(Self {
            _stream: stream,
            sample_rate,
            channels,
            device_name,
            failed,
            deadline,
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// True once the device reported a stream error
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn deadline_monitor(&self) -> &DeadlineMonitor {
        &self.deadline
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    channels: usize,
    max_block_frames: usize,
    mut engine: TransportEngine,
    failed: Arc<AtomicBool>,
) -> Result<Stream, StreamError>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let chunk_len = max_block_frames.max(1) * channels;
    let mut scratch = vec![0.0f32; chunk_len];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            // ========== SACRED ZONE ==========
            // No allocations, No I/O, No blocking locks
            for chunk in data.chunks_mut(chunk_len) {
                let block = &mut scratch[..chunk.len()];
                engine.process_block(block, channels);
                for (out, &sample) in chunk.iter_mut().zip(block.iter()) {
                    *out = T::from_sample(sample.clamp(-1.0, 1.0));
                }
            }
            // ========== SACRED ZONE END ==========
        },
        move |err| {
            // ========== ERROR CALLBACK ==========
            // Runs outside the audio callback
            log::error!("Audio stream error: {}", err);
            failed.store(true, Ordering::Relaxed);
        },
        None,
    )?;

    Ok(stream)
}
