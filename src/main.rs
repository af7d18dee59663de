use anyhow::Context;
use clap::Parser;

use record_hub::config::AppConfig;
use record_hub::state::{build_router, AppState};

/// Shared record collections with owner/editor/viewer access control.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON). Defaults to `record_hub.*`
    /// in the working directory when present.
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address, overriding `server.bind`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "record_hub=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting record-hub server...");

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    let names: Vec<&str> = config.collections.iter().map(|c| c.name.as_str()).collect();
    tracing::info!(store = ?config.store, collections = ?names, "Configuration loaded");

    let state = AppState::from_config(&config)
        .await
        .context("Failed to initialize application state")?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    tracing::info!("Listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
