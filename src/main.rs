use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use ptt_relay::audio::{AudioCapture, MicCapture};
use ptt_relay::realtime::{OpenAiRealtimeClient, RealtimeApi};
use ptt_relay::session::{SessionController, SessionFlags};
use ptt_relay::ws::{create_router, AppState, BroadcastHub, Status};
use ptt_relay::Config;

#[derive(Parser, Debug)]
#[command(name = "ptt-relay")]
#[command(about = "Push-to-talk relay to a realtime speech/text AI endpoint")]
struct Args {
    /// Configuration file (optional; defaults apply when absent)
    #[arg(long, default_value = "config/ptt-relay")]
    config: String,

    /// Override the control-surface port
    #[arg(long)]
    port: Option<u16>,

    /// Maximum number of API calls (-1 for unlimited)
    #[arg(long)]
    max_api_calls: Option<i64>,

    /// Realtime model name
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(port) = args.port {
        cfg.server.port = port;
    }
    if let Some(max_api_calls) = args.max_api_calls {
        cfg.session.max_api_calls = max_api_calls;
    }
    if let Some(model) = args.model {
        cfg.api.model = model;
    }

    let api_key =
        std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;

    info!("ptt-relay v0.1.0");
    info!("Realtime model: {}", cfg.api.model);
    info!("Max API calls: {}", cfg.session.max_api_calls);

    let flags = Arc::new(SessionFlags::default());
    let hub = BroadcastHub::new(Arc::clone(&flags), cfg.session.max_api_calls);
    let capture: Arc<dyn AudioCapture> = Arc::new(MicCapture::new());
    let api: Arc<dyn RealtimeApi> =
        Arc::new(OpenAiRealtimeClient::new(cfg.api.clone(), api_key));

    let (control_tx, control_rx) = mpsc::channel(32);
    let router = create_router(AppState {
        hub: hub.clone(),
        control_tx,
    });

    let addr = format!("{}:{}", cfg.server.bind, cfg.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Control surface listening on ws://{}/ws", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Control-surface server failed: {}", e);
        }
    });

    api.connect()
        .await
        .context("Failed to connect to the realtime endpoint")?;
    api.initialize_session()
        .await
        .context("Failed to initialize the realtime session")?;

    let controller = SessionController::new(cfg, flags, capture, api, hub.clone());

    hub.status(Status::Ready);
    info!("Voice relay is ready. Waiting for a client to start listening...");

    controller.run(control_rx).await;
    Ok(())
}
