//! reelmeta-ingest - short-form video metadata ingest service
//!
//! Extracts metadata for YouTube, Instagram and TikTok URLs with every
//! registered strategy, merges the results and saves them to the document
//! and tabular sinks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use reelmeta_common::config::{self as common_config, TomlConfig, DATABASE_FILE};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelmeta_ingest::config::CredentialFile;
use reelmeta_ingest::extractors::registry::default_extractor;
use reelmeta_ingest::quota::QuotaGovernor;
use reelmeta_ingest::saver::UnifiedSaver;
use reelmeta_ingest::sinks::{SqliteDocumentSink, SqliteTabularSink};
use reelmeta_ingest::AppState;

/// Command-line arguments for reelmeta-ingest
#[derive(Parser, Debug)]
#[command(name = "reelmeta-ingest")]
#[command(about = "Short-form video metadata ingest service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5760", env = "REELMETA_PORT")]
    port: u16,

    /// Folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "REELMETA_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(common_config::default_config_path);
    let toml_config = match &config_path {
        Some(path) => common_config::load_toml_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TomlConfig::default(),
    };

    let level = &toml_config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("reelmeta_ingest={0},reelmeta_common={0},tower_http={0}", level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting reelmeta-ingest on port {}", args.port);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: built-in defaults"),
    }

    // Root folder: CLI → ENV → TOML → OS default
    let root_folder =
        common_config::resolve_root_folder(args.root_folder.as_deref(), "REELMETA_ROOT_FOLDER", Some(&toml_config));
    let db_path = root_folder.join(DATABASE_FILE);
    info!("Database: {}", db_path.display());

    let pool = reelmeta_ingest::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let credentials = reelmeta_ingest::config::resolve_credentials(&toml_config.quota);
    let governor = Arc::new(QuotaGovernor::from_settings(&toml_config.quota, &credentials));
    if !governor.has_credentials() {
        warn!("No API credentials: YouTube lookups use unauthenticated strategies only");
    }

    let shutdown = CancellationToken::new();
    let sweeper = governor.clone().spawn_sweeper(
        Duration::from_secs(toml_config.quota.sweep_interval_secs.max(1)),
        shutdown.clone(),
    );

    let extractor = default_extractor(&toml_config.extraction, governor.clone())
        .context("Failed to build HTTP client")?;

    let saver = UnifiedSaver::from_settings(
        &toml_config.saver,
        Arc::new(SqliteDocumentSink::new(pool.clone())),
        Arc::new(SqliteTabularSink::new(pool.clone())),
    );

    let mut state = AppState::new(
        governor,
        Arc::new(extractor),
        Arc::new(saver),
        Duration::from_millis(toml_config.extraction.call_timeout_ms),
    );
    // Keys from the environment are never written to the config file
    match &config_path {
        Some(path) if !reelmeta_ingest::config::credentials_from_env() => {
            info!("Credential changes are saved to {}", path.display());
            state = state.with_credential_file(CredentialFile::new(path));
        }
        _ => info!("Credential changes are kept in memory only"),
    }
    let app = reelmeta_ingest::build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("Quota sweeper ended abnormally: {}", e);
    }
    pool.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM and cancels background tasks
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

    shutdown.cancel();
}
