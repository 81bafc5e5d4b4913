use serde::Serialize;
use serde_json::Value;

/// Client-to-endpoint events.
///
/// Inbound events are deliberately untyped (`serde_json::Value`): the
/// broadcast contract forwards them verbatim to control-surface clients, so
/// parsing into structs would only add a re-serialization step. Dispatch
/// happens on the `type` discriminator (see [`server_event`]).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    #[serde(rename = "response.create")]
    ResponseCreate,
}

/// Payload of `session.update`.
///
/// `turn_detection` is always serialized, so `None` becomes an explicit
/// `null` on the wire: that is how automatic voice-activity triggering is
/// disabled for manual (push-to-talk) turn-taking.
#[derive(Debug, Clone, Serialize)]
pub struct SessionUpdate {
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub temperature: f32,
    pub turn_detection: Option<Value>,
}

/// Endpoint event discriminators the response handler dispatches on.
pub mod server_event {
    /// Synthetic acknowledgment injected after a session reset completes.
    pub const SESSION_RESET: &str = "session_reset";
    pub const TEXT_DELTA: &str = "response.text.delta";
    pub const AUDIO_TRANSCRIPT_DELTA: &str = "response.audio_transcript.delta";
    pub const RESPONSE_DONE: &str = "response.done";
    pub const ERROR: &str = "error";
}
