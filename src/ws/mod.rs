//! Control-surface WebSocket server
//!
//! Outbound: the closed event set in [`events`], fanned out to every
//! connected client. Inbound: `{type:"control", action:...}` commands
//! forwarded to the session controller.

pub mod events;
pub mod hub;

pub use events::{ControlCommand, ErrorBody, InboundMessage, OutboundEvent, Status};
pub use hub::{create_router, AppState, BroadcastHub};
