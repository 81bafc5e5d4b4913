//! Microphone capture via `cpal`.
//!
//! `cpal::Stream` is not `Send`, so each open stream lives on a dedicated
//! thread that owns it for its whole lifetime; frames cross into async land
//! over a tokio mpsc channel and the thread parks until told to stop.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc as std_mpsc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{error, info, warn};

use super::capture::{AudioCapture, AudioFrame};
use crate::error::{RelayError, RelayResult};

/// Frames buffered between the audio thread and the producer task
const FRAME_CHANNEL_CAPACITY: usize = 64;

struct ActiveStream {
    frames: mpsc::Receiver<AudioFrame>,
    stop_tx: std_mpsc::Sender<()>,
}

/// Default-input-device capture behind [`AudioCapture`].
pub struct MicCapture {
    inner: Mutex<Option<ActiveStream>>,
}

impl MicCapture {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }
}

impl Default for MicCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AudioCapture for MicCapture {
    async fn start_stream(&self) -> RelayResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.is_some() {
            warn!("Capture stream already open");
            return Ok(());
        }

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

        std::thread::spawn(move || {
            audio_thread(frame_tx, stop_rx, ready_tx);
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                info!("Capture stream opened");
                *inner = Some(ActiveStream {
                    frames: frame_rx,
                    stop_tx,
                });
                Ok(())
            }
            Ok(Err(msg)) => Err(RelayError::Device(msg)),
            Err(_) => Err(RelayError::Device("audio thread died during setup".into())),
        }
    }

    async fn stop_stream(&self) -> RelayResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(active) = inner.take() {
            // The audio thread drops the stream when this lands (or when the
            // sender is dropped, whichever comes first).
            let _ = active.stop_tx.send(());
            info!("Capture stream closed");
        }
        Ok(())
    }

    async fn read_frame(&self) -> RelayResult<AudioFrame> {
        let mut inner = self.inner.lock().await;
        let active = inner
            .as_mut()
            .ok_or_else(|| RelayError::Device("capture stream is not open".into()))?;

        active
            .frames
            .recv()
            .await
            .ok_or_else(|| RelayError::Device("capture stream ended".into()))
    }

    fn name(&self) -> &str {
        "cpal-mic"
    }
}

/// Owns the cpal stream for its lifetime; parks until the stop signal.
fn audio_thread(
    frame_tx: mpsc::Sender<AudioFrame>,
    stop_rx: std_mpsc::Receiver<()>,
    ready_tx: oneshot::Sender<Result<(), String>>,
) {
    let host = cpal::default_host();
    let device = match host.default_input_device() {
        Some(d) => d,
        None => {
            let _ = ready_tx.send(Err("no input device found".into()));
            return;
        }
    };

    let supported = match device.default_input_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("failed to query input config: {e}")));
            return;
        }
    };

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let config: cpal::StreamConfig = supported.into();
    let started = Instant::now();

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let samples: Vec<i16> = data
                .iter()
                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .collect();
            let frame = AudioFrame {
                samples,
                sample_rate,
                channels,
                timestamp_ms: started.elapsed().as_millis() as u64,
            };
            // Drop frames when the consumer lags; the capture thread must
            // never block inside the audio callback.
            let _ = frame_tx.try_send(frame);
        },
        |err: cpal::StreamError| {
            error!("cpal stream error: {err}");
        },
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("failed to build input stream: {e}")));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(format!("failed to start input stream: {e}")));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Park until stop is signalled or the controller side goes away.
    let _ = stop_rx.recv();
    drop(stream);
}
