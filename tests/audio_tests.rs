use ptt_relay::audio::resample::to_api_format;
use ptt_relay::audio::{audio_level, AudioFrame};

fn frame(samples: Vec<i16>) -> AudioFrame {
    AudioFrame {
        samples,
        sample_rate: 48000,
        channels: 1,
        timestamp_ms: 0,
    }
}

fn to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[test]
fn pcm_bytes_are_little_endian() {
    let f = frame(vec![0x0102, -1]);
    assert_eq!(f.to_pcm_bytes(), vec![0x02, 0x01, 0xFF, 0xFF]);
}

#[test]
fn silence_has_zero_level() {
    assert_eq!(audio_level(&frame(vec![0; 480])), 0);
    assert_eq!(audio_level(&frame(Vec::new())), 0);
}

#[test]
fn full_scale_audio_pegs_the_level() {
    assert_eq!(audio_level(&frame(vec![i16::MAX; 480])), 100);
    assert_eq!(audio_level(&frame(vec![i16::MIN; 480])), 100);
}

#[test]
fn level_scales_with_amplitude() {
    let quiet = audio_level(&frame(vec![1000; 480]));
    let loud = audio_level(&frame(vec![20000; 480]));
    assert!(quiet > 0);
    assert!(loud > quiet);
    assert!(loud <= 100);
}

#[test]
fn conforming_audio_passes_through_untouched() {
    let pcm = to_bytes(&[100, -200, 300, -400]);
    assert_eq!(to_api_format(&pcm, 24000, 1, 24000), pcm);
}

#[test]
fn downsampling_halves_forty_eight_to_twenty_four_khz() {
    let pcm = to_bytes(&[10, 20, 30, 40, 50, 60]);
    assert_eq!(
        to_api_format(&pcm, 48000, 1, 24000),
        to_bytes(&[10, 30, 50])
    );
}

#[test]
fn stereo_is_downmixed_by_summing_channels() {
    // Interleaved L/R pairs at the target rate already
    let pcm = to_bytes(&[100, 50, -100, -50]);
    assert_eq!(to_api_format(&pcm, 24000, 2, 24000), to_bytes(&[150, -150]));
}

#[test]
fn downmix_clamps_instead_of_wrapping() {
    let pcm = to_bytes(&[i16::MAX, i16::MAX, i16::MIN, i16::MIN]);
    assert_eq!(
        to_api_format(&pcm, 24000, 2, 24000),
        to_bytes(&[i16::MAX, i16::MIN])
    );
}

#[test]
fn stereo_high_rate_input_becomes_mono_at_the_target_rate() {
    // Two stereo sample pairs at 48kHz: downmix first, then decimate by two
    let pcm = to_bytes(&[100, 100, 7, 7, 200, 200, 9, 9]);
    assert_eq!(
        to_api_format(&pcm, 48000, 2, 24000),
        to_bytes(&[200, 400])
    );
}

#[test]
fn empty_input_yields_empty_output() {
    assert!(to_api_format(&[], 48000, 1, 24000).is_empty());
}
