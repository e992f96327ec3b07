use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use masjid_bot::channel::OutboundChannel;
use masjid_bot::config::Config;
use masjid_bot::server::{AppState, build_app};
use masjid_bot_waha::{EventListener, WahaClient};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EVENT_BUFFER: usize = 128;

/// WhatsApp assistant for mosque communities.
#[derive(Parser, Debug)]
#[command(name = "masjid-bot", version, about, long_about = None)]
struct Cli {
    /// Optional YAML config; environment variables override it.
    #[arg(short, long, default_value = "masjid-bot.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default).
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print gateway version and session status.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load_with_env(&cli.config)
        .await
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Commands::Status => status(config).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,masjid_bot=info,masjid_bot_waha=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let waha = WahaClient::new(config.gateway.waha()).context("failed to build WAHA client")?;
    let channel: Arc<dyn OutboundChannel> = Arc::new(waha.clone());
    let state = AppState::from_config(&config, channel)?;

    info!(
        gateway = %config.gateway.base_url,
        session = %config.gateway.session,
        admins = state.admins.len(),
        "Starting masjid-bot"
    );

    match waha.start_session(config.gateway.webhook_url.as_deref()).await {
        Ok(session) => info!(session = %session.name, status = %session.status, "Gateway session ready"),
        Err(e) => warn!(error = %e, "Could not start gateway session, continuing"),
    }
    if let Some(url) = &config.gateway.webhook_url {
        if let Err(e) = waha.register_webhook(url).await {
            warn!(error = %e, url = %url, "Could not register gateway webhook");
        }
    }

    if config.gateway.websocket {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let listener = EventListener::new(&config.gateway.waha());
        info!(url = %listener.ws_url(), "Listening for gateway events over WebSocket");
        listener.spawn(tx);

        let bot = state.bot.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                bot.handle_event(event).await;
            }
        });
    }

    let app = build_app(state, config.server.request_timeout_seconds);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited unexpectedly")?;

    info!("masjid-bot shutdown complete");
    Ok(())
}

async fn status(config: Config) -> anyhow::Result<()> {
    let waha = WahaClient::new(config.gateway.waha()).context("failed to build WAHA client")?;
    let version = waha.version().await.context("gateway unreachable")?;
    let session = waha.session_info().await.context("failed to read session")?;

    println!("Gateway:  {}", waha.base_url());
    println!("Version:  {version}");
    println!("Session:  {} ({})", session.name, session.status);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
