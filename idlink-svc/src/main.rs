//! idlink-svc - contact identity reconciliation service
//!
//! Resolves configuration (CLI → environment → TOML → defaults), opens the
//! contact database and serves `POST /identify` until Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use idlink_common::config::{CliOverrides, ServiceConfig, TomlConfig};
use idlink_common::db::init::init_database;
use idlink_svc::store::{CheckedStore, ContactStore, MemoryContactStore, SqliteContactStore};
use idlink_svc::{build_router, AppState, Reconciler};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for idlink-svc
#[derive(Parser, Debug)]
#[command(name = "idlink-svc")]
#[command(about = "Contact identity reconciliation service")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "IDLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the SQLite contact database
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Address to bind
    #[arg(short, long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Keep contacts in memory instead of SQLite (lost on exit)
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    let config = ServiceConfig::resolve(
        CliOverrides {
            database_path: args.database,
            bind_address: args.bind,
            port: args.port,
            log_level: args.log_level,
        },
        file,
    )
    .context("Invalid configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("idlink_svc={0},idlink_common={0},tower_http=info", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting idlink-svc v{}", env!("CARGO_PKG_VERSION"));
    info!("Merge cascade to child contacts: {}", config.cascade_children);

    let store: Arc<dyn ContactStore> = if args.in_memory {
        info!("Using in-memory contact store");
        Arc::new(CheckedStore::new(MemoryContactStore::new()))
    } else {
        info!("Database path: {}", config.database_path.display());
        let pool = init_database(&config.database_path)
            .await
            .context("Failed to initialize database")?;
        Arc::new(CheckedStore::new(SqliteContactStore::new(pool)))
    };

    let reconciler = Reconciler::new(store).with_cascade_children(config.cascade_children);
    let app = build_router(AppState::new(reconciler));

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("idlink-svc listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
