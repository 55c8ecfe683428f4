//! pxkv server entry point.
//!
//! Sets up logging, the storage engine and the TCP listener, then accepts
//! connections until Ctrl+C.

use pxkv::commands::CommandHandler;
use pxkv::config::{CliAction, Config, HELP};
use pxkv::connection::{handle_connection, ConnectionStats};
use pxkv::storage::{start_expiry_sweeper, StorageEngine};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_args(std::env::args().skip(1))? {
        CliAction::Run(config) => config,
        CliAction::Help => {
            println!("{}", HELP);
            return Ok(());
        }
        CliAction::Version => {
            println!("pxkv version {}", pxkv::VERSION);
            return Ok(());
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Shared by every connection
    let storage = Arc::new(StorageEngine::new());
    info!("Storage engine initialized");

    let sweeper = start_expiry_sweeper(Arc::clone(&storage));

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(version = pxkv::VERSION, "Listening on {}", config.bind_address());

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    };

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&storage), Arc::clone(&stats), config.max_frame_size) => {}
        _ = shutdown => {}
    }

    drop(sweeper);

    let db = storage.stats();
    let conns = stats.snapshot();
    info!(
        keys = db.keys,
        get_ops = db.get_ops,
        set_ops = db.set_ops,
        expired = db.expired,
        connections = conns.accepted,
        requests = conns.requests,
        "Server shutdown complete"
    );
    Ok(())
}

/// Accepts connections forever, one task per client.
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
    max_frame_size: usize,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = CommandHandler::new(Arc::clone(&storage));
                let stats = Arc::clone(&stats);

                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, stats, max_frame_size).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
