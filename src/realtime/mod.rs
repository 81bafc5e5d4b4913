pub mod client;
pub mod messages;

pub use client::{OpenAiRealtimeClient, RealtimeApi};
pub use messages::{server_event, ClientEvent, SessionUpdate};
