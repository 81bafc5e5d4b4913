use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::transcript::TranscriptAccumulator;
use crate::audio::{audio_level, resample, AudioCapture};
use crate::config::Config;
use crate::error::{ErrorCode, RelayError, RelayResult};
use crate::realtime::{server_event, RealtimeApi};
use crate::ws::{BroadcastHub, ControlCommand, Status};

/// Shared session state, mutated only by the controller's own tasks.
#[derive(Debug, Default)]
pub struct SessionFlags {
    running: AtomicBool,
    paused: AtomicBool,
    awaiting_response: AtomicBool,
    recording: AtomicBool,
    processing: AtomicBool,
    cooldown_active: AtomicBool,
}

impl SessionFlags {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response.load(Ordering::SeqCst)
    }

    pub fn is_cooldown_active(&self) -> bool {
        self.cooldown_active.load(Ordering::SeqCst)
    }

    /// Idle means nothing is in flight: no frame being read or processed, no
    /// pending response, no active cooldown.
    pub fn is_idle(&self) -> bool {
        !self.recording.load(Ordering::SeqCst)
            && !self.processing.load(Ordering::SeqCst)
            && !self.is_awaiting_response()
            && !self.is_cooldown_active()
    }

    fn set_running(&self, v: bool) {
        self.running.store(v, Ordering::SeqCst);
    }

    fn set_paused(&self, v: bool) {
        self.paused.store(v, Ordering::SeqCst);
    }

    fn set_awaiting_response(&self, v: bool) {
        self.awaiting_response.store(v, Ordering::SeqCst);
    }

    fn set_recording(&self, v: bool) {
        self.recording.store(v, Ordering::SeqCst);
    }

    fn set_processing(&self, v: bool) {
        self.processing.store(v, Ordering::SeqCst);
    }

    fn set_cooldown_active(&self, v: bool) {
        self.cooldown_active.store(v, Ordering::SeqCst);
    }
}

struct ProducerHandle {
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

/// The session orchestration controller.
///
/// Owns the utterance buffer and its lock, drives the realtime endpoint,
/// narrates every transition through the [`BroadcastHub`], and enforces the
/// API-call budget and the reconnection policy. All long-lived tasks
/// (producer, response handler, cooldown) are retained by handle so they can
/// be cancelled deterministically.
pub struct SessionController {
    config: Config,
    flags: Arc<SessionFlags>,
    capture: Arc<dyn AudioCapture>,
    api: Arc<dyn RealtimeApi>,
    hub: BroadcastHub,

    /// One utterance of PCM bytes. Only the producer task appends; only
    /// lock-holding flush paths read-and-clear.
    buffer: Arc<Mutex<Vec<u8>>>,

    /// Binary pause gate: `false` parks the producer at its next wait,
    /// `true` releases all waiters.
    pause_gate: watch::Sender<bool>,

    transcript: Mutex<TranscriptAccumulator>,
    api_calls_made: AtomicU64,
    last_activity: Mutex<Instant>,
    producer: Mutex<Option<ProducerHandle>>,
    cooldown: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(
        config: Config,
        flags: Arc<SessionFlags>,
        capture: Arc<dyn AudioCapture>,
        api: Arc<dyn RealtimeApi>,
        hub: BroadcastHub,
    ) -> Arc<Self> {
        let (pause_gate, _) = watch::channel(true); // initially open (not paused)

        Arc::new(Self {
            config,
            flags,
            capture,
            api,
            hub,
            buffer: Arc::new(Mutex::new(Vec::new())),
            pause_gate,
            transcript: Mutex::new(TranscriptAccumulator::new()),
            api_calls_made: AtomicU64::new(0),
            last_activity: Mutex::new(Instant::now()),
            producer: Mutex::new(None),
            cooldown: Mutex::new(None),
        })
    }

    /// Main dispatch loop: consumes control commands from the hub and runs a
    /// 1s idle tick that applies deferred session resets. Returns when the
    /// response handler terminates (graceful shutdown) or the command
    /// channel closes.
    pub async fn run(self: Arc<Self>, mut control_rx: mpsc::Receiver<ControlCommand>) {
        let mut responses = tokio::spawn(Arc::clone(&self).handle_api_responses());
        let mut tick = tokio::time::interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                command = control_rx.recv() => match command {
                    Some(command) => self.dispatch(command).await,
                    None => break,
                },
                _ = tick.tick() => {
                    // A reset is only applied when the session is otherwise
                    // idle, to avoid resetting mid-utterance.
                    if self.flags.is_idle() && self.api.reset_pending() {
                        if let Err(e) = self.api.reset_session().await {
                            error!("Deferred session reset failed: {}", e);
                        }
                    }
                }
                _ = &mut responses => break,
            }
        }

        responses.abort();
        self.cleanup().await;
    }

    async fn dispatch(self: &Arc<Self>, command: ControlCommand) {
        match command {
            ControlCommand::StartListening => {
                if let Err(e) = self.start_listening().await {
                    error!("start_listening failed: {}", e);
                }
            }
            ControlCommand::StopListening => {
                if let Err(e) = self.stop_listening().await {
                    error!("stop_listening failed: {}", e);
                }
            }
            ControlCommand::Pause => self.pause().await,
            ControlCommand::Resume => self.resume().await,
        }
    }

    /// Open the audio stream and start accumulating. No-op if already
    /// running.
    pub async fn start_listening(self: &Arc<Self>) -> RelayResult<()> {
        if self.flags.is_running() {
            return Ok(());
        }

        // Clear any stale audio buffered before the press
        self.buffer.lock().await.clear();
        self.flags.set_running(true);

        if let Err(e) = self.capture.start_stream().await {
            self.flags.set_running(false);
            self.hub.error(e.to_string(), e.code());
            return Err(e);
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(self).produce_audio(cancel.clone()));
        *self.producer.lock().await = Some(ProducerHandle { task, cancel });

        self.hub.debug("Listening for speech...");
        self.hub.status(Status::Listening);
        info!("Started listening");
        Ok(())
    }

    /// Stop accumulating and flush the utterance to the endpoint. No-op if
    /// not running.
    pub async fn stop_listening(&self) -> RelayResult<()> {
        if !self.flags.is_running() {
            return Ok(());
        }
        self.flags.set_running(false);

        // The flush below must not race a buffer write: cancel the producer
        // and wait for its cancellation to complete first.
        if let Some(handle) = self.producer.lock().await.take() {
            handle.cancel.cancel();
            if let Err(e) = handle.task.await {
                if !e.is_cancelled() {
                    error!("Producer task panicked: {}", e);
                }
            }
            info!("Producer task stopped");
        }

        let pending = self.buffer.lock().await.len();
        if pending > 0 {
            info!("Sending buffered audio to API (buffer size: {} bytes)", pending);
            self.hub.debug(format!("Sending {pending} bytes to API..."));
        } else {
            info!("No audio in buffer - nothing to send");
            self.hub.debug("No audio captured");
        }
        self.flush_buffer().await;

        self.capture.stop_stream().await?;
        self.hub.status(Status::Idle);
        info!("Stopped listening");
        Ok(())
    }

    /// Gate the producer, flush what has accumulated, and stop the stream.
    /// No-op if already paused.
    pub async fn pause(&self) {
        if self.flags.is_paused() {
            return;
        }
        self.flags.set_paused(true);

        // Blocks the producer before its next frame read
        self.pause_gate.send_replace(false);

        if let Some(task) = self.cooldown.lock().await.take() {
            task.abort();
            self.flags.set_cooldown_active(false);
            debug!("Cooldown cancelled due to pause");
        }

        if let Err(e) = self.capture.stop_stream().await {
            warn!("Failed to stop capture stream: {}", e);
        }

        self.flush_buffer().await;

        self.hub.status(Status::Paused);
        info!("Session paused");
    }

    /// Release the pause gate and reopen the stream. A paused session
    /// discards partial audio rather than resuming a stale utterance. No-op
    /// if not paused.
    pub async fn resume(&self) {
        if !self.flags.is_paused() {
            return;
        }
        self.flags.set_paused(false);
        self.pause_gate.send_replace(true);

        self.buffer.lock().await.clear();
        *self.last_activity.lock().await = Instant::now();
        self.flags.set_awaiting_response(false);
        self.flags.set_cooldown_active(false);

        if let Err(e) = self.capture.start_stream().await {
            self.hub.error(e.to_string(), e.code());
        }

        self.hub.status(Status::Listening);
        info!("Session resumed");
    }

    /// Producer task: pull frames from the capture source into the buffer
    /// while running, parking at the pause gate when paused.
    async fn produce_audio(self: Arc<Self>, cancel: CancellationToken) {
        info!("Audio producer task started");

        let mut gate = self.pause_gate.subscribe();
        let level_interval = Duration::from_millis(self.config.session.level_interval_ms);
        let mut last_level = Instant::now() - level_interval;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                res = gate.wait_for(|open| *open) => {
                    if res.is_err() {
                        break;
                    }
                }
            }

            // Re-check after the gate: a stop while paused must exit cleanly.
            if !self.flags.is_running() {
                break;
            }

            self.flags.set_recording(true);
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    self.flags.set_recording(false);
                    break;
                }
                frame = self.capture.read_frame() => frame,
            };
            self.flags.set_recording(false);

            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    // A single bad frame must not kill the session.
                    warn!("Error reading audio frame: {}", e);
                    sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            // Loudness feedback, at most one event per level_interval
            if last_level.elapsed() >= level_interval {
                self.hub.audio_level(audio_level(&frame));
                last_level = Instant::now();
            }

            self.flags.set_processing(true);
            let bytes = frame.to_pcm_bytes();
            {
                let mut buffer = self.buffer.lock().await;
                buffer.extend_from_slice(&bytes);
                debug!("Buffer size: {}", buffer.len());
            }
            *self.last_activity.lock().await = Instant::now();
            self.flags.set_processing(false);
        }

        // Even when cancelled mid-iteration, shared flags must end up false.
        self.flags.set_recording(false);
        self.flags.set_processing(false);
        info!("Audio producer task stopped");
    }

    /// Take the accumulated utterance and send it. Empty buffer: clear state
    /// and return without a network call.
    pub async fn flush_buffer(&self) {
        let pending = { std::mem::take(&mut *self.buffer.lock().await) };
        if pending.is_empty() {
            info!("Audio buffer is empty. Not sending to API.");
            return;
        }

        // Set before any await so a second flush cannot race in
        self.flags.set_awaiting_response(true);
        self.hub.new_response();

        // Resampling is CPU-bound; keep it off the event loop so the
        // response handler's deadline timer is not starved.
        let audio = self.config.audio.clone();
        let resampled = match tokio::task::spawn_blocking(move || {
            resample::to_api_format(
                &pending,
                audio.sample_rate,
                audio.channels,
                audio.api_sample_rate,
            )
        })
        .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Resampling task failed: {}", e);
                self.flags.set_awaiting_response(false);
                self.hub.error("Audio conversion failed", ErrorCode::UnknownError);
                return;
            }
        };

        let sent = self.send_audio_to_api(&resampled).await;
        if !sent {
            // No response will arrive; don't leave the session stuck.
            self.flags.set_awaiting_response(false);
            return;
        }

        if self.config.session.cooldown_enabled {
            self.start_cooldown().await;
        }
    }

    /// Budget-gated send. Reaching the cap rejects locally with a
    /// distinguished status instead of silently dropping. The caller owns
    /// `awaiting_response`.
    pub async fn send_audio_to_api(&self, pcm: &[u8]) -> bool {
        let max = self.config.session.max_api_calls;
        if max >= 0 && self.api_calls_made.load(Ordering::SeqCst) >= max as u64 {
            info!("Maximum number of API calls reached");
            self.hub.status(Status::MaxCallsReached);
            return false;
        }

        info!("Sending audio buffer to API (size: {} bytes)", pcm.len());
        self.hub.debug("Sending audio to API...");

        match self.api.send_audio(pcm).await {
            Ok(()) => {
                let count = self.api_calls_made.fetch_add(1, Ordering::SeqCst) + 1;
                info!("API call made. Total calls: {}", count);
                self.hub.api_call_count(count);
                self.hub.status(Status::Processing);
                true
            }
            Err(e) => {
                error!("Error sending audio to API: {}", e);
                self.hub.error(e.to_string(), e.code());
                false
            }
        }
    }

    /// Arm the post-flush cooldown window (explicit policy, off unless
    /// `session.cooldown_enabled`). Cancellable; `pause` cancels it.
    async fn start_cooldown(&self) {
        let flags = Arc::clone(&self.flags);
        let duration = Duration::from_secs(self.config.session.cooldown_secs);
        flags.set_cooldown_active(true);

        let task = tokio::spawn(async move {
            debug!("Cooldown started for {:?}", duration);
            sleep(duration).await;
            flags.set_cooldown_active(false);
            debug!("Cooldown period ended");
        });

        if let Some(old) = self.cooldown.lock().await.replace(task) {
            old.abort();
        }
    }

    /// Long-lived response-stream handler, one per process lifetime.
    ///
    /// Applies the response deadline only while a response is pending; idle
    /// periods wait indefinitely and are never misclassified as stalls.
    pub async fn handle_api_responses(self: Arc<Self>) {
        info!("Started handling API responses");
        let deadline = Duration::from_secs(self.config.session.response_timeout_secs);

        loop {
            let event = if self.flags.is_awaiting_response() {
                match timeout(deadline, self.api.receive_event()).await {
                    Ok(result) => result,
                    Err(_) => {
                        // Recoverable stall, not fatal: reset and keep going.
                        // The reset acknowledgment clears awaiting_response.
                        error!(
                            "API response timeout ({:?}) - resetting session",
                            deadline
                        );
                        self.hub.debug("Connection timeout - resetting session...");
                        if let Err(e) = self.api.reset_session().await {
                            error!("Session reset failed: {}", e);
                            self.api.mark_reset_pending();
                            self.flags.set_awaiting_response(false);
                        }
                        continue;
                    }
                }
            } else {
                self.api.receive_event().await
            };

            let event = match event {
                Ok(event) => event,
                Err(e) if e.is_connection_loss() => {
                    error!("Endpoint connection closed: {}", e);
                    self.flags.set_awaiting_response(false);
                    self.hub.status(Status::Disconnected);
                    if self.reconnect().await.is_err() {
                        // Attempts exhausted; shutdown already ran.
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    warn!("Dropping undecodable endpoint event: {}", e);
                    continue;
                }
            };

            let Some(kind) = event
                .get("type")
                .and_then(|t| t.as_str())
                .map(str::to_owned)
            else {
                warn!("Endpoint event without a type discriminator");
                continue;
            };

            if kind == server_event::SESSION_RESET {
                info!("Session was reset. Restarting the conversation.");
                self.flags.set_awaiting_response(false);
                self.hub.status(Status::Ready);
                continue;
            }

            // Clients own interpretation of intermediate deltas: forward
            // every recognized event verbatim before acting on it.
            self.hub.response(event.clone());

            match kind.as_str() {
                server_event::TEXT_DELTA | server_event::AUDIO_TRANSCRIPT_DELTA => {
                    if let Some(delta) = event.get("delta").and_then(|d| d.as_str()) {
                        self.transcript.lock().await.push_delta(delta);
                    }
                }
                server_event::RESPONSE_DONE => {
                    info!("Response complete");
                    self.hub.debug("AI response received");
                    self.flags.set_awaiting_response(false);
                    self.hub.status(Status::Idle);
                    self.transcript.lock().await.clear();
                }
                server_event::ERROR => {
                    let message = event
                        .pointer("/error/message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("Unknown error");
                    let code = event
                        .pointer("/error/code")
                        .and_then(|c| c.as_str())
                        .unwrap_or("unknown_error");
                    error!("API Error: Code: {}, Message: {}", code, message);
                    self.flags.set_awaiting_response(false);
                    self.hub.status(Status::Error);

                    if ErrorCode::from_name(code) == ErrorCode::SessionExpired {
                        info!("Session expired. Attempting to reset.");
                        match self.api.reset_session().await {
                            Ok(()) => self.hub.status(Status::Ready),
                            Err(e) => {
                                error!("Session reset failed: {}", e);
                                self.api.mark_reset_pending();
                            }
                        }
                    }
                }
                other => debug!("Received response type: {}", other),
            }
        }

        info!("Stopped handling API responses");
    }

    /// Bounded reconnection: fixed-delay attempts, first success returns.
    /// Exhausting the attempts is terminal and triggers graceful shutdown.
    async fn reconnect(&self) -> RelayResult<()> {
        info!("Attempting to reconnect to the endpoint");
        let attempts = self.config.session.reconnect_attempts;
        let delay = Duration::from_secs(self.config.session.reconnect_delay_secs);

        for attempt in 1..=attempts {
            match self.try_reconnect().await {
                Ok(()) => {
                    info!("Reconnected to the endpoint");
                    return Ok(());
                }
                Err(e) => {
                    error!("Reconnection attempt {} failed: {}", attempt, e);
                    sleep(delay).await;
                }
            }
        }

        error!("Maximum reconnection attempts reached. Shutting down.");
        self.graceful_shutdown().await;
        Err(RelayError::ConnectionLost(
            "reconnection attempts exhausted".into(),
        ))
    }

    async fn try_reconnect(&self) -> RelayResult<()> {
        self.api.connect().await?;
        self.api.initialize_session().await
    }

    /// Orderly teardown: narrate, close the endpoint, stop all tasks.
    pub async fn graceful_shutdown(&self) {
        info!("Initiating graceful shutdown...");
        self.hub.status(Status::ShuttingDown);

        if let Err(e) = self.api.close_connection().await {
            warn!("Error closing endpoint connection: {}", e);
        }

        self.cleanup().await;
        info!("Graceful shutdown complete");
    }

    async fn cleanup(&self) {
        self.flags.set_running(false);

        if let Some(handle) = self.producer.lock().await.take() {
            handle.cancel.cancel();
            let _ = handle.task.await;
        }

        if let Some(task) = self.cooldown.lock().await.take() {
            task.abort();
            self.flags.set_cooldown_active(false);
        }

        let _ = self.capture.stop_stream().await;
    }

    /// Current size of the utterance buffer in bytes.
    pub async fn buffer_len(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Number of successful API calls so far.
    pub fn api_calls_made(&self) -> u64 {
        self.api_calls_made.load(Ordering::SeqCst)
    }

    /// Accumulated text of the in-flight AI turn.
    pub async fn transcript_text(&self) -> String {
        self.transcript.lock().await.text().to_owned()
    }
}
