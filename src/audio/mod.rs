//! Audio for voice sessions: PCM wire codec, playback scheduling, and the
//! optional cpal device layer.

#[cfg(feature = "audio-device")]
pub mod capture;
pub mod codec;
pub mod playback;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Something that produces mono microphone buffers at the session input rate.
///
/// The returned stream keeps the source running; dropping it stops capture.
/// Device streams are usually not `Send`, so sources are started on the
/// thread that owns them and only the channel crosses into the session task.
/// No buffer is delivered once `cancel` fires.
pub trait AudioSource {
    type Stream;

    /// Start delivering buffers to `tx` until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be started.
    fn start(
        &self,
        tx: mpsc::Sender<Vec<f32>>,
        cancel: CancellationToken,
    ) -> crate::error::Result<Self::Stream>;
}
