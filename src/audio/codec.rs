//! PCM conversions between device audio and the model's wire format.
//!
//! Outbound: device f32 frames → mono → input rate → 16-bit signed little
//! endian → fixed-size base64 chunks. Inbound: base64 → 16-bit LE → f32.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::warn;

/// MIME type attached to outbound realtime chunks.
pub const PCM_MIME_TYPE: &str = "audio/pcm";

/// Convert interleaved multi-channel audio to mono by averaging channels.
pub fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler.
///
/// Good enough for speech going to the model: no anti-alias filter, since
/// speech energy sits below the 8kHz Nyquist limit of the 16kHz stream.
pub fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || src_rate == 0 || dst_rate == 0 {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };

        output.push(sample as f32);
    }

    output
}

/// Clamp to [-1, 1] and scale asymmetrically onto the i16 range.
pub fn f32_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Little-endian byte encoding of f32 samples as PCM16.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|s| f32_to_i16(*s).to_le_bytes())
        .collect()
}

/// Decode PCM16 little-endian bytes. Odd-length input is corrupt.
pub fn decode_pcm16(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(2)
            .map(|pair| i16_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
            .collect(),
    )
}

/// Decode an inbound base64 audio payload. Corrupt payloads are dropped.
pub fn decode_base64_pcm16(data: &str) -> Option<Vec<f32>> {
    let bytes = match STANDARD.decode(data.trim()) {
        Ok(b) => b,
        Err(e) => {
            warn!("dropping audio chunk with bad base64: {e}");
            return None;
        }
    };
    let samples = decode_pcm16(&bytes);
    if samples.is_none() {
        warn!(len = bytes.len(), "dropping audio chunk with odd byte length");
    }
    samples
}

/// Converts device audio into fixed-size base64 PCM16 chunks.
///
/// Device callbacks deliver buffers of arbitrary length; the chunker holds the
/// remainder until a full chunk of `chunk_samples` is available.
#[derive(Debug)]
pub struct PcmChunker {
    native_rate: u32,
    native_channels: u16,
    target_rate: u32,
    chunk_samples: usize,
    pending: Vec<f32>,
}

impl PcmChunker {
    pub fn new(
        native_rate: u32,
        native_channels: u16,
        target_rate: u32,
        chunk_samples: usize,
    ) -> Self {
        Self {
            native_rate,
            native_channels,
            target_rate,
            chunk_samples: chunk_samples.max(1),
            pending: Vec::new(),
        }
    }

    /// Feed one device buffer; returns every chunk completed by it.
    pub fn push(&mut self, frames: &[f32]) -> Vec<String> {
        let mono = to_mono(frames, self.native_channels);
        let samples = resample(&mono, self.native_rate, self.target_rate);
        self.pending.extend_from_slice(&samples);

        let mut out = Vec::new();
        while self.pending.len() >= self.chunk_samples {
            let chunk: Vec<f32> = self.pending.drain(..self.chunk_samples).collect();
            out.push(STANDARD.encode(encode_pcm16(&chunk)));
        }
        out
    }

    /// Emit whatever is buffered as a final short chunk.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(STANDARD.encode(encode_pcm16(&rest)))
    }

    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }
}
