//! Session orchestration
//!
//! This module provides the `SessionController` that manages:
//! - Push-to-talk start/stop/pause/resume semantics
//! - The utterance buffer and its lock discipline
//! - The request/response protocol against the realtime endpoint
//!   (stall detection, reconnection, API-call budgeting)
//! - Narration of every transition to connected clients

mod controller;
mod transcript;

pub use controller::{SessionController, SessionFlags};
pub use transcript::TranscriptAccumulator;
