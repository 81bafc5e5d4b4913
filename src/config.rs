use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub audio: AudioConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Realtime endpoint base URL (model is appended as a query parameter)
    pub url: String,
    pub model: String,
    pub voice: String,
    pub temperature: f32,
    pub instructions: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration_ms: u64,
    /// Sample rate the endpoint expects (PCM16 mono)
    pub api_sample_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum API calls per process (-1 = unlimited)
    pub max_api_calls: i64,
    /// Deadline for the next endpoint event while a response is pending
    pub response_timeout_secs: u64,
    pub reconnect_attempts: u32,
    pub reconnect_delay_secs: u64,
    /// Post-flush cooldown window (explicit policy, off by default)
    pub cooldown_enabled: bool,
    pub cooldown_secs: u64,
    /// Minimum interval between audio_level broadcasts
    pub level_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.openai.com/v1/realtime".to_string(),
            model: "gpt-4o-realtime-preview-2024-10-01".to_string(),
            voice: "alloy".to_string(),
            temperature: 0.6,
            instructions: "You are a helpful AI assistant supporting customer service \
                           agents in real-time. Provide concise and direct answers. \
                           Present responses as bullet points. No markdown. Focus on \
                           actionable information agents can relay immediately."
                .to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            frame_duration_ms: 20,
            api_sample_rate: 24000, // Endpoint expects 24kHz mono PCM16
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_api_calls: -1,
            response_timeout_secs: 30,
            reconnect_attempts: 3,
            reconnect_delay_secs: 2,
            cooldown_enabled: false,
            cooldown_secs: 10,
            level_interval_ms: 100, // 10 updates/sec
        }
    }
}

impl Config {
    /// Load configuration from an optional file, falling back to defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
