//! Microphone audio capture using cpal.
//!
//! Captures at the device's native sample rate and converts to mono at the
//! configured input rate before handing buffers to a voice session.

use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::AudioSource;
use super::codec::{resample, to_mono};
use crate::config::AudioConfig;
use crate::error::{PlannerError, Result};

/// Audio capture from the system microphone.
pub struct CpalCapture {
    device: cpal::Device,
    stream_config: StreamConfig,
    target_sample_rate: u32,
}

/// A running capture stream. Dropping it stops the microphone.
pub struct CaptureStream {
    stream: cpal::Stream,
}

impl CaptureStream {
    /// Hold the microphone open until `cancel` fires, then release it.
    pub async fn run_until(self, cancel: CancellationToken) {
        cancel.cancelled().await;
        self.stop();
    }

    pub fn stop(self) {
        if let Err(e) = self.stream.pause() {
            error!("failed to pause input stream: {e}");
        }
        info!("audio capture stopped");
    }
}

impl CpalCapture {
    /// Pick the configured (or default) input device.
    ///
    /// # Errors
    ///
    /// Returns an error if no input device is available.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.input_device {
            host.input_devices()
                .map_err(|e| PlannerError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| PlannerError::Audio(format!("input device '{name}' not found")))?
        } else {
            host.default_input_device()
                .ok_or_else(|| PlannerError::Audio("no default input device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using input device: {device_name}");

        let default_config = device
            .default_input_config()
            .map_err(|e| PlannerError::Audio(format!("no default input config: {e}")))?;

        let stream_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            "native input config: {}Hz, {} channels",
            stream_config.sample_rate, stream_config.channels
        );

        Ok(Self {
            device,
            stream_config,
            target_sample_rate: config.input_sample_rate,
        })
    }
}

impl AudioSource for CpalCapture {
    type Stream = CaptureStream;

    /// Start capturing; mono buffers at the input rate go to `tx`.
    fn start(
        &self,
        tx: mpsc::Sender<Vec<f32>>,
        cancel: CancellationToken,
    ) -> Result<CaptureStream> {
        let native_rate = self.stream_config.sample_rate;
        let native_channels = self.stream_config.channels;
        let target_rate = self.target_sample_rate;

        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let mono = to_mono(data, native_channels);
                    let samples = resample(&mono, native_rate, target_rate);
                    // The audio thread must never block.
                    if tx.try_send(samples).is_err() {
                        debug!("capture channel full, dropping buffer");
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| PlannerError::Audio(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| PlannerError::Audio(format!("failed to start input stream: {e}")))?;

        info!("audio capture started: native {native_rate}Hz -> target {target_rate}Hz");
        Ok(CaptureStream { stream })
    }
}

