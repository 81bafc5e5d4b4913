pub mod audio;
pub mod config;
pub mod error;
pub mod realtime;
pub mod session;
pub mod ws;

pub use audio::{audio_level, AudioCapture, AudioFrame, MicCapture};
pub use config::Config;
pub use error::{ErrorCode, RelayError, RelayResult};
pub use realtime::{OpenAiRealtimeClient, RealtimeApi};
pub use session::{SessionController, SessionFlags, TranscriptAccumulator};
pub use ws::{create_router, AppState, BroadcastHub, ControlCommand, OutboundEvent, Status};
