use crate::error::RelayResult;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Serialize samples as little-endian PCM bytes for buffering.
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Audio capture source
///
/// The capture stream is started and stopped under controller command
/// (push-to-talk), and frames are pulled one at a time by the producer task.
/// Implementations may apply upstream filtering (e.g. a speech gate); the
/// controller buffers every frame it is handed.
#[async_trait::async_trait]
pub trait AudioCapture: Send + Sync {
    /// Open the capture stream. No-op if already open.
    async fn start_stream(&self) -> RelayResult<()>;

    /// Close the capture stream. No-op if already closed.
    async fn stop_stream(&self) -> RelayResult<()>;

    /// Wait for the next frame from the open stream.
    async fn read_frame(&self) -> RelayResult<AudioFrame>;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Loudness metric for visual feedback: RMS of the frame scaled to 0-100.
pub fn audio_level(frame: &AudioFrame) -> u8 {
    if frame.samples.is_empty() {
        return 0;
    }

    let sum_sq: f64 = frame
        .samples
        .iter()
        .map(|&s| {
            let v = s as f64;
            v * v
        })
        .sum();
    let rms = (sum_sq / frame.samples.len() as f64).sqrt();

    // Scale against full-scale i16; clamp in case of clipping
    ((rms / i16::MAX as f64) * 100.0).round().clamp(0.0, 100.0) as u8
}
