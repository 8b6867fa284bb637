use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use driftwire_server::{AppState, DriftwireServer, FanoutConfig, ServerConfig};
use driftwire_store::{MemoryStore, SqliteStore};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "driftwire-server", about = "Horizontally-scalable SSE fan-out service")]
#[command(version)]
struct Cli {
    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 7410)]
    port: u16,

    /// Path to the SQLite database; omit for a volatile in-memory store
    #[arg(long)]
    database: Option<PathBuf>,

    /// API key required on publish and connect endpoints
    #[arg(long, env = "DRIFTWIRE_API_KEY")]
    api_key: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("driftwire={default_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let state = match &cli.database {
        Some(path) => {
            let store = Arc::new(SqliteStore::open(path)?);
            tracing::info!(path = %path.display(), "using sqlite store");
            AppState::new(
                store.clone(),
                store.clone(),
                store,
                FanoutConfig::default(),
            )
        }
        None => {
            tracing::warn!("no --database given, events will not survive restarts");
            let store = Arc::new(MemoryStore::new());
            AppState::new(
                store.clone(),
                store.clone(),
                store,
                FanoutConfig::default(),
            )
        }
    }
    .with_api_key(cli.api_key);

    let server = DriftwireServer::with_state(
        ServerConfig::new(cli.host, cli.port),
        Arc::new(state),
    );

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    server.run().await?;
    Ok(())
}
