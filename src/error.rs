use serde::Serialize;
use thiserror::Error;

/// Fault taxonomy for the relay.
///
/// Every fault that can reach a client narration boundary maps onto the
/// closed [`ErrorCode`] vocabulary via [`RelayError::code`]; raw fault
/// identifiers never leave the process.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("audio device error: {0}")]
    Device(String),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("timed out waiting for endpoint event")]
    Timeout,

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid type: {0}")]
    InvalidType(String),

    #[error("session expired")]
    SessionExpired,

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("{0}")]
    Other(String),
}

/// User-facing error codes broadcast to control-surface clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    DeviceError,
    ConnectionLost,
    Timeout,
    InvalidJson,
    MissingField,
    InvalidValue,
    InvalidType,
    SessionExpired,
    InvalidApiKey,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DeviceError => "device_error",
            ErrorCode::ConnectionLost => "connection_lost",
            ErrorCode::Timeout => "timeout",
            ErrorCode::InvalidJson => "invalid_json",
            ErrorCode::MissingField => "missing_field",
            ErrorCode::InvalidValue => "invalid_value",
            ErrorCode::InvalidType => "invalid_type",
            ErrorCode::SessionExpired => "session_expired",
            ErrorCode::InvalidApiKey => "invalid_api_key",
            ErrorCode::UnknownError => "unknown_error",
        }
    }

    /// Map a fault category name (e.g. reported by the endpoint) to a code.
    /// Unrecognized names map to `unknown_error`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "device_error" => ErrorCode::DeviceError,
            "connection_lost" | "connection_closed" | "connection_reset" => {
                ErrorCode::ConnectionLost
            }
            "timeout" => ErrorCode::Timeout,
            "invalid_json" => ErrorCode::InvalidJson,
            "missing_field" => ErrorCode::MissingField,
            "invalid_value" => ErrorCode::InvalidValue,
            "invalid_type" => ErrorCode::InvalidType,
            "session_expired" => ErrorCode::SessionExpired,
            "invalid_api_key" => ErrorCode::InvalidApiKey,
            _ => ErrorCode::UnknownError,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RelayError {
    /// Total mapping from fault category to user-facing code.
    pub fn code(&self) -> ErrorCode {
        match self {
            RelayError::Device(_) => ErrorCode::DeviceError,
            RelayError::ConnectionLost(_) => ErrorCode::ConnectionLost,
            RelayError::Timeout => ErrorCode::Timeout,
            RelayError::InvalidJson(_) => ErrorCode::InvalidJson,
            RelayError::MissingField(_) => ErrorCode::MissingField,
            RelayError::InvalidValue(_) => ErrorCode::InvalidValue,
            RelayError::InvalidType(_) => ErrorCode::InvalidType,
            RelayError::SessionExpired => ErrorCode::SessionExpired,
            RelayError::InvalidApiKey => ErrorCode::InvalidApiKey,
            RelayError::Other(_) => ErrorCode::UnknownError,
        }
    }

    /// Whether this fault means the transport itself is gone, which triggers
    /// the reconnection policy rather than per-event handling.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, RelayError::ConnectionLost(_))
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
