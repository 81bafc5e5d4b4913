//! PCM conversion for the flush path.
//!
//! The buffer accumulates frames at the capture rate/layout; the endpoint
//! expects mono PCM16 at its own rate. Conversion is CPU-bound, so callers
//! run [`to_api_format`] under `spawn_blocking` to keep it off the event
//! loop.

/// Convert an accumulated PCM16-LE buffer to the endpoint's rate and a mono
/// channel layout. Downsampling is by decimation (integer ratios only, e.g.
/// 48kHz -> 24kHz); already-conforming audio passes through untouched.
pub fn to_api_format(
    pcm: &[u8],
    sample_rate: u32,
    channels: u16,
    target_rate: u32,
) -> Vec<u8> {
    let samples = bytes_to_samples(pcm);
    let mono = if channels > 1 {
        downmix_to_mono(&samples, channels)
    } else {
        samples
    };
    let resampled = downsample(&mono, sample_rate, target_rate);
    samples_to_bytes(&resampled)
}

fn bytes_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Downsample by decimation: take every Nth sample.
fn downsample(samples: &[i16], source_rate: u32, target_rate: u32) -> Vec<i16> {
    if source_rate == target_rate || target_rate == 0 {
        return samples.to_vec();
    }

    let ratio = source_rate / target_rate;
    if ratio <= 1 {
        // Can't upsample by decimation
        return samples.to_vec();
    }

    samples.iter().step_by(ratio as usize).copied().collect()
}

/// Downmix interleaved channels by summing, clamped to the i16 range to
/// preserve volume without wrapping.
fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    let channels = channels as usize;
    let mut mono = Vec::with_capacity(samples.len() / channels);

    for group in samples.chunks_exact(channels) {
        let sum: i32 = group.iter().map(|&s| s as i32).sum();
        mono.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
    }

    mono
}
