// Shared test doubles for the session controller's collaborators.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, Mutex, Notify};
use tokio::time::{sleep, Instant};

use ptt_relay::audio::{AudioCapture, AudioFrame};
use ptt_relay::config::Config;
use ptt_relay::error::{RelayError, RelayResult};
use ptt_relay::realtime::RealtimeApi;
use ptt_relay::session::{SessionController, SessionFlags};
use ptt_relay::ws::{BroadcastHub, OutboundEvent};

/// Scripted audio source: yields the queued frames one per `frame_interval`
/// while the stream is open, and blocks whenever the queue is empty or the
/// stream is stopped (like a microphone with nobody speaking).
pub struct MockCapture {
    frames: Mutex<VecDeque<AudioFrame>>,
    frame_interval: Duration,
    started: AtomicBool,
    wakeup: Notify,
}

impl MockCapture {
    pub fn new(frames: Vec<AudioFrame>, frame_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(frames.into()),
            frame_interval,
            started: AtomicBool::new(false),
            wakeup: Notify::new(),
        })
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn queue_frame(&self, frame: AudioFrame) {
        self.frames.lock().await.push_back(frame);
        self.wakeup.notify_one();
    }
}

#[async_trait::async_trait]
impl AudioCapture for MockCapture {
    async fn start_stream(&self) -> RelayResult<()> {
        self.started.store(true, Ordering::SeqCst);
        self.wakeup.notify_one();
        Ok(())
    }

    async fn stop_stream(&self) -> RelayResult<()> {
        self.started.store(false, Ordering::SeqCst);
        self.wakeup.notify_one();
        Ok(())
    }

    async fn read_frame(&self) -> RelayResult<AudioFrame> {
        if !self.frame_interval.is_zero() {
            sleep(self.frame_interval).await;
        }
        loop {
            if self.started.load(Ordering::SeqCst) {
                if let Some(frame) = self.frames.lock().await.pop_front() {
                    return Ok(frame);
                }
            }
            self.wakeup.notified().await;
        }
    }

    fn name(&self) -> &str {
        "mock-capture"
    }
}

/// Scripted realtime endpoint: records every call, serves events pushed by
/// the test, and can be told to refuse sends or connects.
pub struct MockApi {
    pub sent: Mutex<Vec<Vec<u8>>>,
    pub connect_times: Mutex<Vec<Instant>>,
    pub initializations: AtomicUsize,
    pub resets: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_sends: AtomicBool,
    pub fail_connects: AtomicBool,
    events_tx: mpsc::UnboundedSender<RelayResult<Value>>,
    events_rx: Mutex<mpsc::UnboundedReceiver<RelayResult<Value>>>,
    reset_pending: AtomicBool,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            connect_times: Mutex::new(Vec::new()),
            initializations: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            fail_connects: AtomicBool::new(false),
            events_tx,
            events_rx: Mutex::new(events_rx),
            reset_pending: AtomicBool::new(false),
        })
    }

    pub fn push_event(&self, event: Value) {
        self.events_tx.send(Ok(event)).expect("event channel open");
    }

    pub fn push_fault(&self, fault: RelayError) {
        self.events_tx.send(Err(fault)).expect("event channel open");
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait::async_trait]
impl RealtimeApi for MockApi {
    async fn connect(&self) -> RelayResult<()> {
        self.connect_times.lock().await.push(Instant::now());
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(RelayError::ConnectionLost("mock connect refused".into()));
        }
        Ok(())
    }

    async fn initialize_session(&self) -> RelayResult<()> {
        self.initializations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_audio(&self, pcm: &[u8]) -> RelayResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(RelayError::Device("mock device failure".into()));
        }
        self.sent.lock().await.push(pcm.to_vec());
        Ok(())
    }

    async fn receive_event(&self) -> RelayResult<Value> {
        let mut rx = self.events_rx.lock().await;
        match rx.recv().await {
            Some(result) => result,
            None => Err(RelayError::ConnectionLost("mock channel closed".into())),
        }
    }

    async fn reset_session(&self) -> RelayResult<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(RelayError::ConnectionLost("mock connect refused".into()));
        }
        self.reset_pending.store(false, Ordering::SeqCst);
        self.push_event(json!({ "type": "session_reset" }));
        Ok(())
    }

    fn reset_pending(&self) -> bool {
        self.reset_pending.load(Ordering::SeqCst)
    }

    fn mark_reset_pending(&self) {
        self.reset_pending.store(true, Ordering::SeqCst);
    }

    async fn close_connection(&self) -> RelayResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Harness {
    pub controller: Arc<SessionController>,
    pub flags: Arc<SessionFlags>,
    pub capture: Arc<MockCapture>,
    pub api: Arc<MockApi>,
    pub hub: BroadcastHub,
    pub events: broadcast::Receiver<OutboundEvent>,
}

/// Passthrough audio config: capture rate equals the endpoint rate and the
/// source is mono, so the bytes sent equal the bytes buffered.
pub fn passthrough_config() -> Config {
    let mut cfg = Config::default();
    cfg.audio.sample_rate = 24000;
    cfg.audio.api_sample_rate = 24000;
    cfg.audio.channels = 1;
    cfg
}

pub fn harness(cfg: Config, frames: Vec<AudioFrame>, frame_interval: Duration) -> Harness {
    let flags = Arc::new(SessionFlags::default());
    let hub = BroadcastHub::new(Arc::clone(&flags), cfg.session.max_api_calls);
    let events = hub.subscribe();
    let capture = MockCapture::new(frames, frame_interval);
    let api = MockApi::new();

    let controller = SessionController::new(
        cfg,
        Arc::clone(&flags),
        Arc::clone(&capture) as Arc<dyn AudioCapture>,
        Arc::clone(&api) as Arc<dyn RealtimeApi>,
        hub.clone(),
    );

    Harness {
        controller,
        flags,
        capture,
        api,
        hub,
        events,
    }
}

/// A mono PCM16 frame holding `samples` samples of a quiet constant tone.
pub fn frame_of(samples: usize) -> AudioFrame {
    AudioFrame {
        samples: vec![1000; samples],
        sample_rate: 24000,
        channels: 1,
        timestamp_ms: 0,
    }
}

/// Collect everything currently sitting in a broadcast receiver.
pub fn drain(rx: &mut broadcast::Receiver<OutboundEvent>) -> Vec<OutboundEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

/// Status transitions, in broadcast order.
pub fn statuses(events: &[OutboundEvent]) -> Vec<ptt_relay::ws::Status> {
    events
        .iter()
        .filter_map(|e| match e {
            OutboundEvent::Status { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}
