use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::events::{ControlCommand, ErrorBody, InboundMessage, OutboundEvent, Status};
use crate::error::ErrorCode;
use crate::session::SessionFlags;

/// Events buffered per lagging subscriber before it starts dropping
const BROADCAST_CAPACITY: usize = 256;

/// Fan-out of narration events to all connected control-surface clients.
///
/// Narration never blocks: events go through a `tokio::sync::broadcast`
/// channel and sends with no subscribers are silently dropped. Status events
/// stamp the live session flags so clients always see the current pause
/// state.
#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<OutboundEvent>,
    flags: Arc<SessionFlags>,
    max_api_calls: i64,
}

impl BroadcastHub {
    pub fn new(flags: Arc<SessionFlags>, max_api_calls: i64) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            flags,
            max_api_calls,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.tx.subscribe()
    }

    fn broadcast(&self, event: OutboundEvent) {
        // No subscribers is not an error; narration is fire-and-forget.
        let _ = self.tx.send(event);
    }

    pub fn status(&self, status: Status) {
        self.broadcast(self.status_event(status));
    }

    /// Status event stamped with the current listening/pause flags.
    pub fn status_event(&self, status: Status) -> OutboundEvent {
        OutboundEvent::Status {
            status,
            is_listening: self.flags.is_running(),
            is_paused: self.flags.is_paused(),
        }
    }

    pub fn config_event(&self) -> OutboundEvent {
        OutboundEvent::Config {
            max_api_calls: self.max_api_calls,
        }
    }

    pub fn new_response(&self) {
        self.broadcast(OutboundEvent::NewResponse);
    }

    pub fn response(&self, data: serde_json::Value) {
        self.broadcast(OutboundEvent::Response { data });
    }

    pub fn api_call_count(&self, count: u64) {
        self.broadcast(OutboundEvent::ApiCallCount { count });
    }

    pub fn audio_level(&self, level: u8) {
        self.broadcast(OutboundEvent::AudioLevel { level });
    }

    pub fn error(&self, message: impl Into<String>, code: ErrorCode) {
        self.broadcast(OutboundEvent::Error {
            error: ErrorBody {
                message: message.into(),
                code,
            },
        });
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.broadcast(OutboundEvent::Debug {
            message: message.into(),
        });
    }
}

/// Shared state for the WebSocket endpoint
#[derive(Clone)]
pub struct AppState {
    pub hub: BroadcastHub,
    pub control_tx: mpsc::Sender<ControlCommand>,
}

/// Create the router exposing the control-surface WebSocket endpoint
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

/// One task per connected client: replays the initial status + config, then
/// pumps broadcast events out and control commands in until either side
/// closes.
async fn client_session(socket: WebSocket, state: AppState) {
    let client_id = uuid::Uuid::new_v4();
    info!("Client connected: {}", client_id);

    let (mut sender, mut receiver) = socket.split();
    let mut events = state.hub.subscribe();

    let initial = [
        state.hub.status_event(Status::Ready),
        state.hub.config_event(),
    ];
    for event in initial {
        let Ok(text) = serde_json::to_string(&event) else {
            continue;
        };
        if sender.send(Message::Text(text)).await.is_err() {
            info!("Client disconnected during handshake: {}", client_id);
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Client {} lagged; dropped {} events", client_id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_inbound(&state, &text).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Client {} socket error: {}", client_id, e);
                    break;
                }
            },
        }
    }

    info!("Client removed: {}", client_id);
}

async fn handle_inbound(state: &AppState, text: &str) {
    match serde_json::from_str::<InboundMessage>(text) {
        Ok(InboundMessage::Control { action }) => match ControlCommand::parse(&action) {
            Some(command) => {
                if state.control_tx.send(command).await.is_err() {
                    warn!("Controller is gone; dropping command {:?}", command);
                }
            }
            None => warn!("Unknown action received: {}", action),
        },
        Err(e) => {
            warn!("Invalid client message: {}", e);
            state
                .hub
                .error(format!("Invalid message format: {e}"), ErrorCode::InvalidJson);
        }
    }
}
