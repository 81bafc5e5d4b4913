use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;

/// Session status vocabulary narrated to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ready,
    Listening,
    Paused,
    Processing,
    Idle,
    Disconnected,
    Error,
    ShuttingDown,
    MaxCallsReached,
}

/// The closed set of events broadcast to control-surface clients, one JSON
/// object per WebSocket text frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Every state transition; always carries the current pause flag
    Status {
        status: Status,
        is_listening: bool,
        is_paused: bool,
    },
    /// Sent once on client connect
    Config { max_api_calls: i64 },
    /// A flush was initiated
    NewResponse,
    /// Verbatim endpoint event
    Response { data: Value },
    /// After each successful send
    ApiCallCount { count: u64 },
    /// Throttled loudness metric while listening
    AudioLevel { level: u8 },
    /// Any fault, with a code from the closed vocabulary
    Error { error: ErrorBody },
    /// Diagnostic narration
    Debug { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: ErrorCode,
}

/// Inbound control protocol from clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Control { action: String },
}

/// Commands a client can issue against the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    StartListening,
    StopListening,
    Pause,
    Resume,
}

impl ControlCommand {
    /// Unknown actions yield `None`; callers log and ignore them.
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "start_listening" => Some(ControlCommand::StartListening),
            "stop_listening" => Some(ControlCommand::StopListening),
            "pause" => Some(ControlCommand::Pause),
            "resume" => Some(ControlCommand::Resume),
            _ => None,
        }
    }
}
