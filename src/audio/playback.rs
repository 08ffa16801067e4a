//! Gapless sequential playback of model audio.
//!
//! [`PlaybackScheduler`] keeps a queue of decoded chunks and a cursor holding
//! the next free playback position. Each new chunk starts at
//! `max(now, cursor)`, so chunks never overlap and never leave a gap while the
//! queue is fed. [`PlaybackScheduler::flush`] drops everything not yet played
//! and resets the cursor; voice sessions call it when the model is interrupted.
//!
//! Positions are counted in output frames at the scheduler's sample rate.
//! "Now" is the number of frames the output device has already pulled.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A decoded chunk waiting for its turn.
#[derive(Debug, Clone)]
struct ScheduledChunk {
    start: u64,
    samples: Vec<f32>,
}

/// Where a chunk landed on the playback timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start: u64,
    pub end: u64,
}

/// Sequential playback queue with an explicit timing cursor.
#[derive(Debug)]
pub struct PlaybackScheduler {
    sample_rate: u32,
    queue: VecDeque<ScheduledChunk>,
    /// Samples of the front chunk already rendered.
    head_offset: usize,
    /// Frames rendered so far.
    played: u64,
    /// End of the last scheduled chunk.
    cursor: u64,
}

impl PlaybackScheduler {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            queue: VecDeque::new(),
            head_offset: 0,
            played: 0,
            cursor: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Queue a chunk right after whatever is already scheduled.
    pub fn schedule(&mut self, samples: Vec<f32>) -> Option<Slot> {
        if samples.is_empty() {
            return None;
        }
        let start = self.played.max(self.cursor);
        let end = start + samples.len() as u64;
        self.cursor = end;
        self.queue.push_back(ScheduledChunk { start, samples });
        Some(Slot { start, end })
    }

    /// Drop all unplayed audio and reset the cursor to "now".
    ///
    /// Returns the number of samples discarded.
    pub fn flush(&mut self) -> usize {
        let dropped = self.pending_samples();
        self.queue.clear();
        self.head_offset = 0;
        self.cursor = self.played;
        dropped
    }

    /// Fill `out` with the next frames, silence where nothing is due.
    ///
    /// Returns how many frames carried queued audio.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        let mut audible = 0;
        for frame in out.iter_mut() {
            *frame = 0.0;
            if let Some(front) = self.queue.front()
                && front.start <= self.played
            {
                *frame = front.samples[self.head_offset];
                audible += 1;
                self.head_offset += 1;
                if self.head_offset == front.samples.len() {
                    self.queue.pop_front();
                    self.head_offset = 0;
                }
            }
            self.played += 1;
        }
        audible
    }

    /// Samples queued but not yet rendered.
    pub fn pending_samples(&self) -> usize {
        let total: usize = self.queue.iter().map(|c| c.samples.len()).sum();
        total - self.head_offset
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Current playback position.
    pub fn position(&self) -> u64 {
        self.played
    }

    /// Next free playback position.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Wall time until queued audio finishes.
    pub fn remaining(&self) -> Duration {
        Duration::from_secs_f64(self.pending_samples() as f64 / f64::from(self.sample_rate))
    }
}

/// Scheduler shared between a voice session and the output device callback.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    inner: Arc<Mutex<PlaybackScheduler>>,
}

impl PlaybackHandle {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlaybackScheduler::new(sample_rate))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackScheduler> {
        match self.inner.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        }
    }

    pub fn schedule(&self, samples: Vec<f32>) -> Option<Slot> {
        self.lock().schedule(samples)
    }

    pub fn flush(&self) -> usize {
        self.lock().flush()
    }

    pub fn render(&self, out: &mut [f32]) -> usize {
        self.lock().render(out)
    }

    pub fn pending_samples(&self) -> usize {
        self.lock().pending_samples()
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate()
    }
}

#[cfg(feature = "audio-device")]
pub use device::CpalPlayback;

#[cfg(feature = "audio-device")]
mod device {
    use cpal::StreamConfig;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use tracing::{error, info};

    use super::PlaybackHandle;
    use crate::config::AudioConfig;
    use crate::error::{PlannerError, Result};

    /// Speaker output that pulls frames from a [`PlaybackHandle`].
    pub struct CpalPlayback {
        stream: cpal::Stream,
    }

    impl CpalPlayback {
        /// Open the output device and start pulling from `handle`.
        ///
        /// # Errors
        ///
        /// Returns an error if no output device is available or the stream
        /// cannot be started.
        pub fn start(config: &AudioConfig, handle: PlaybackHandle) -> Result<Self> {
            let host = cpal::default_host();

            let device = if let Some(ref name) = config.output_device {
                host.output_devices()
                    .map_err(|e| PlannerError::Audio(format!("cannot enumerate devices: {e}")))?
                    .find(|d| {
                        d.description()
                            .ok()
                            .map(|desc| desc.name() == name)
                            .unwrap_or(false)
                    })
                    .ok_or_else(|| {
                        PlannerError::Audio(format!("output device '{name}' not found"))
                    })?
            } else {
                host.default_output_device()
                    .ok_or_else(|| PlannerError::Audio("no default output device".into()))?
            };

            let device_name = device
                .description()
                .map(|d| d.name().to_owned())
                .unwrap_or_else(|_| "<unknown>".into());
            info!("using output device: {device_name}");

            let stream_config = StreamConfig {
                channels: 1,
                sample_rate: config.output_sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };

            let stream = device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        handle.render(data);
                    },
                    move |err| {
                        error!("audio output stream error: {err}");
                    },
                    None,
                )
                .map_err(|e| PlannerError::Audio(format!("failed to build output stream: {e}")))?;

            stream
                .play()
                .map_err(|e| PlannerError::Audio(format!("failed to start output stream: {e}")))?;

            Ok(Self { stream })
        }

        /// Stop pulling audio. Dropping the value has the same effect.
        pub fn stop(self) {
            if let Err(e) = self.stream.pause() {
                error!("failed to pause output stream: {e}");
            }
        }
    }
}
