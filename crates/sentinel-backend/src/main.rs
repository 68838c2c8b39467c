//! KubeSentinel analysis backend server.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sentinel_backend::{run_server, AppState, BackendSettings};

/// Serve log analysis over HTTP, backed by an Ollama-compatible model.
#[derive(Parser)]
#[command(name = "sentinel-backend")]
#[command(about = "KubeSentinel analysis backend")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, env = "SENTINEL_LOG_JSON")]
    log_json: bool,

    #[command(flatten)]
    settings: BackendSettings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let settings = cli.settings;
    let addr = settings.listen;
    info!(
        ollama = %settings.ollama_host,
        model = %settings.ollama_model,
        timeout_secs = settings.ollama_timeout_secs,
        "Analysis backend configured"
    );

    let state = AppState::new(settings).context("Failed to initialise backend")?;
    if !state.ollama.check_connection().await {
        warn!("Model server is not reachable yet; analysis requests will fall back");
    }

    tokio::select! {
        result = run_server(state, addr) => result?,
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("sentinel_backend=debug,tower_http=debug,info")
        } else {
            EnvFilter::new("sentinel_backend=info,warn")
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
