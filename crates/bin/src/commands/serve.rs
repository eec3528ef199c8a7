//! Serve command - runs a dedicated mapping server.

use std::{path::Path, time::Duration};

use rosetta::{
    EntryTree,
    sync::{Server, ServerConfig},
};
use tokio::signal::unix::{SignalKind, signal};

use crate::{checksum::checksum_or_default, cli::ServeArgs, delta_log};

/// Run the mapping server until SIGINT or SIGTERM
pub async fn run(args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let checksum = checksum_or_default(args.jar.as_deref())?;
    let config = ServerConfig::new(format!("{}:{}", args.host, args.port))
        .with_checksum(checksum)
        .with_password(args.password.clone());

    let server = Server::start(config, EntryTree::new()).await?;

    println!("Rosetta server listening on {}", server.local_addr());
    if args.password.is_empty() {
        println!("No password set, anyone can join");
    }
    println!("Press Ctrl+C to shutdown");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut ticker = tokio::time::interval(Duration::from_secs(args.delta_interval.max(1)));
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => flush_delta(&server, args.delta_log.as_deref()).await?,
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                break;
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown...");
                break;
            }
        }
    }

    flush_delta(&server, args.delta_log.as_deref()).await?;
    server.stop().await?;

    println!("Server shut down");
    Ok(())
}

/// Take the changes made since the last call and log them.
async fn flush_delta(server: &Server, log: Option<&Path>) -> rosetta::Result<()> {
    let delta = server.take_delta().await?;
    if delta.is_empty() {
        return Ok(());
    }

    tracing::info!(changes = delta.len(), "Mappings changed");
    if let Some(path) = log {
        if let Err(e) = delta_log::append(path, &delta) {
            tracing::error!("Failed to write delta log {}: {e}", path.display());
        }
    }
    Ok(())
}
