use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use backend_lib::{
    config::{LogFormat, Settings},
    router, AppState,
};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

/// Multi-guard authentication server
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML config file; defaults to ./config.toml when present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address from the config
    #[arg(long)]
    bind: Option<SocketAddr>,
}

fn init_tracing(settings: &Settings) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Settings::load().context("loading config")?,
    };
    if let Some(bind) = cli.bind {
        settings.bind_addr = bind;
    }

    init_tracing(&settings);

    let state = Arc::new(AppState::from_settings(&settings)?);

    // Background task for session cleanup
    let sessions = state.sessions.clone();
    let session_every = Duration::from_secs(settings.session.cleanup_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = interval(session_every);
        loop {
            interval.tick().await;
            let removed = sessions.cleanup_expired().await;
            tracing::debug!(removed, "session sweep finished");
        }
    });

    // Background task for login throttle cleanup
    let throttle = state.throttle.clone();
    let throttle_every = Duration::from_secs(settings.throttle.cleanup_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = interval(throttle_every);
        loop {
            interval.tick().await;
            let removed = throttle.cleanup();
            tracing::debug!(removed, "throttle sweep finished");
        }
    });

    let app = router::create_router(state);

    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("binding {}", settings.bind_addr))?;
    tracing::info!(addr = %settings.bind_addr, storage = ?settings.storage, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutting down");
    })
    .await?;

    Ok(())
}
