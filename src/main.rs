use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use deskcast::capture::{PlatformFactory, SourceRegistry, StreamAcquirer};
use deskcast::ledger::UsageLedger;
use deskcast::otp::{HttpMailer, OtpGate};
use deskcast::session::{EventBus, SessionController};
use deskcast::storage::{detect_opener, RecordingsLister, VideosDirSink};
use deskcast::{create_router, AppState, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "deskcast", about = "Screen and microphone recorder backend")]
struct Args {
    /// Path to a config file (TOML), without extension
    #[arg(long)]
    config: Option<String>,

    /// Override the HTTP bind address, e.g. 127.0.0.1:4830
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::load(args.config.as_deref())?;

    info!("Deskcast v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let platform = PlatformFactory::create(&cfg.platform.backend, &cfg.platform.screens)?;
    let acquirer = Arc::new(StreamAcquirer::new(platform.clone()));
    let registry = Arc::new(SourceRegistry::new(platform.clone()));

    let ledger_path = cfg.ledger_path();
    info!("Usage ledger: {}", ledger_path.display());
    let ledger = Arc::new(UsageLedger::open(ledger_path));

    let mailer = HttpMailer::new(
        cfg.auth.email_api_url.clone(),
        cfg.auth.email_api_key.clone(),
        cfg.auth.email_from.clone(),
    );
    let otp = Arc::new(OtpGate::new(Arc::new(mailer)).with_ttl(cfg.otp_ttl()));

    let output_dir = cfg.output_dir();
    info!("Recordings directory: {}", output_dir.display());
    let sink = Arc::new(VideosDirSink::new(output_dir.clone()));
    let lister = Arc::new(RecordingsLister::new(
        output_dir,
        platform.output_extension(),
    ));

    let events = Arc::new(EventBus::new());
    let controller = SessionController::new(
        platform.clone(),
        acquirer.clone(),
        ledger.clone(),
        sink,
        lister.clone(),
        events.clone(),
    );

    let state = AppState {
        controller,
        registry,
        acquirer,
        ledger,
        otp,
        lister,
        opener: detect_opener(),
        events,
    };

    let router = create_router(state, cfg.service.dev_server_origin.clone());

    let addr = args.bind.unwrap_or_else(|| cfg.bind_addr());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
