use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

use super::messages::{server_event, ClientEvent, SessionUpdate};
use crate::config::ApiConfig;
use crate::error::{RelayError, RelayResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Buffered endpoint events between the read pump and the response handler
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Duplex session to the real-time AI endpoint.
#[async_trait::async_trait]
pub trait RealtimeApi: Send + Sync {
    /// Open the transport connection.
    async fn connect(&self) -> RelayResult<()>;

    /// Send the session-configuration message: manual turn-taking (no
    /// automatic voice-activity triggering) and text-only response modality.
    async fn initialize_session(&self) -> RelayResult<()>;

    /// Send one utterance of PCM audio and request a response.
    async fn send_audio(&self, pcm: &[u8]) -> RelayResult<()>;

    /// Wait for the next endpoint event. Returns `ConnectionLost` when the
    /// transport is gone and `InvalidJson` for undecodable frames.
    async fn receive_event(&self) -> RelayResult<Value>;

    /// Lightweight re-synchronization: tear down and re-establish the
    /// session without touching the rest of the process. Completion is
    /// observable as a `session_reset` event from [`Self::receive_event`].
    async fn reset_session(&self) -> RelayResult<()>;

    /// Whether a deferred reset is waiting for an idle moment.
    fn reset_pending(&self) -> bool;

    /// Flag that a reset should run once the session is idle.
    fn mark_reset_pending(&self);

    /// Close the transport connection.
    async fn close_connection(&self) -> RelayResult<()>;
}

/// `RealtimeApi` implementation over tokio-tungstenite.
///
/// A spawned read pump owns the receive half of the socket and forwards
/// parsed events into an mpsc channel; `receive_event` drains that channel.
/// This keeps `reset_session` free to tear the transport down while the
/// response handler is parked waiting for the next event.
pub struct OpenAiRealtimeClient {
    api: ApiConfig,
    api_key: String,
    writer: Mutex<Option<WsSink>>,
    events_tx: mpsc::Sender<RelayResult<Value>>,
    events_rx: Mutex<mpsc::Receiver<RelayResult<Value>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    reset_pending: AtomicBool,
}

impl OpenAiRealtimeClient {
    pub fn new(api: ApiConfig, api_key: String) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            api_key,
            writer: Mutex::new(None),
            events_tx,
            events_rx: Mutex::new(events_rx),
            pump: Mutex::new(None),
            reset_pending: AtomicBool::new(false),
        }
    }

    fn endpoint_url(&self) -> String {
        format!("{}?model={}", self.api.url, self.api.model)
    }

    async fn send_event(&self, event: &ClientEvent) -> RelayResult<()> {
        let mut writer = self.writer.lock().await;
        let sink = writer
            .as_mut()
            .ok_or_else(|| RelayError::ConnectionLost("not connected".into()))?;

        let text = serde_json::to_string(event)?;
        sink.send(Message::Text(text)).await.map_err(map_ws_error)
    }
}

#[async_trait::async_trait]
impl RealtimeApi for OpenAiRealtimeClient {
    async fn connect(&self) -> RelayResult<()> {
        let url = self.endpoint_url();
        info!("Connecting to realtime endpoint: {}", self.api.url);

        let mut request = url
            .into_client_request()
            .map_err(|e| RelayError::InvalidValue(e.to_string()))?;

        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| RelayError::InvalidApiKey)?;
        request.headers_mut().insert("Authorization", auth);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (stream, _) = connect_async(request).await.map_err(map_ws_error)?;
        let (sink, source) = stream.split();

        {
            let mut writer = self.writer.lock().await;
            *writer = Some(sink);
        }

        let mut pump = self.pump.lock().await;
        if let Some(old) = pump.take() {
            old.abort();
        }
        *pump = Some(tokio::spawn(read_pump(source, self.events_tx.clone())));

        info!("Connected to realtime endpoint");
        Ok(())
    }

    async fn initialize_session(&self) -> RelayResult<()> {
        let session = SessionUpdate {
            modalities: vec!["text".to_string()],
            instructions: self.api.instructions.clone(),
            voice: self.api.voice.clone(),
            input_audio_format: "pcm16".to_string(),
            temperature: self.api.temperature,
            turn_detection: None, // push-to-talk: explicit null disables server VAD
        };

        self.send_event(&ClientEvent::SessionUpdate { session })
            .await?;
        info!("Session initialized (text-only, manual turn-taking)");
        Ok(())
    }

    async fn send_audio(&self, pcm: &[u8]) -> RelayResult<()> {
        let audio = base64::engine::general_purpose::STANDARD.encode(pcm);

        self.send_event(&ClientEvent::InputAudioBufferAppend { audio })
            .await?;
        self.send_event(&ClientEvent::InputAudioBufferCommit).await?;
        self.send_event(&ClientEvent::ResponseCreate).await?;

        info!("Sent {} bytes of audio to the endpoint", pcm.len());
        Ok(())
    }

    async fn receive_event(&self) -> RelayResult<Value> {
        let mut rx = self.events_rx.lock().await;
        match rx.recv().await {
            Some(result) => result,
            None => Err(RelayError::ConnectionLost("event channel closed".into())),
        }
    }

    async fn reset_session(&self) -> RelayResult<()> {
        info!("Resetting realtime session");

        self.close_connection().await?;
        self.connect().await?;
        self.initialize_session().await?;
        self.reset_pending.store(false, Ordering::SeqCst);

        // Make completion observable to the response handler.
        let _ = self
            .events_tx
            .send(Ok(json!({ "type": server_event::SESSION_RESET })))
            .await;

        Ok(())
    }

    fn reset_pending(&self) -> bool {
        self.reset_pending.load(Ordering::SeqCst)
    }

    fn mark_reset_pending(&self) {
        self.reset_pending.store(true, Ordering::SeqCst);
    }

    async fn close_connection(&self) -> RelayResult<()> {
        {
            let mut pump = self.pump.lock().await;
            if let Some(task) = pump.take() {
                task.abort();
            }
        }

        let mut writer = self.writer.lock().await;
        if let Some(mut sink) = writer.take() {
            // Best-effort close frame; the transport may already be gone.
            let _ = sink.send(Message::Close(None)).await;
            info!("Closed realtime connection");
        }
        Ok(())
    }
}

/// Owns the receive half of the socket; forwards each frame as a parsed
/// event or a fault, then exits when the transport closes.
async fn read_pump(mut source: WsSource, events_tx: mpsc::Sender<RelayResult<Value>>) {
    loop {
        let item = match source.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<Value>(&text)
                .map_err(RelayError::InvalidJson),
            Some(Ok(Message::Close(_))) | None => {
                let _ = events_tx
                    .send(Err(RelayError::ConnectionLost(
                        "endpoint closed the connection".into(),
                    )))
                    .await;
                break;
            }
            Some(Ok(_)) => continue, // ping/pong/binary
            Some(Err(e)) => {
                let _ = events_tx.send(Err(map_ws_error(e))).await;
                break;
            }
        };

        if events_tx.send(item).await.is_err() {
            warn!("Event consumer dropped; stopping read pump");
            break;
        }
    }
}

fn map_ws_error(e: tungstenite::Error) -> RelayError {
    match e {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Io(_)
        | tungstenite::Error::Protocol(_) => RelayError::ConnectionLost(e.to_string()),
        tungstenite::Error::Http(ref resp)
            if resp.status() == tungstenite::http::StatusCode::UNAUTHORIZED =>
        {
            RelayError::InvalidApiKey
        }
        other => RelayError::Other(other.to_string()),
    }
}
