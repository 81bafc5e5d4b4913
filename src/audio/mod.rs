pub mod capture;
pub mod mic;
pub mod resample;

pub use capture::{audio_level, AudioCapture, AudioFrame};
pub use mic::MicCapture;
