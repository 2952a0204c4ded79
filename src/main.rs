//! Envelope Server - Entry Point
//!
//! Starts the TCP listener and Hub actor, accepting connections until
//! Ctrl-C.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use envelope_server::{
    bind, handle_connection, Connection, Envelope, Hub, MessageHandler, ServerConfig,
};

/// Logs application messages; real deployments install their own handler
struct LogHandler;

impl MessageHandler for LogHandler {
    fn on_message(&self, envelope: Envelope, connection: &Connection) {
        info!(
            "Message '{}' from {} ({})",
            envelope.payload.command, connection.id, connection.peer_addr
        );
    }

    fn on_close(&self, connection: &Connection) {
        info!("Connection {} left", connection.id);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=envelope_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("envelope_server=info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let (hub, handle) = Hub::new(&config, Arc::new(LogHandler));

    // Fatal: bind reports the failure on the hub's event channel first
    let listener = bind(&config.addr, handle.events()).await?;
    info!("{} v{} listening on {}", config.system, config.version, config.addr);

    let hub_task = tokio::spawn(hub.run());

    info!("Hub actor started");

    // Connection accept loop
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let handle = handle.clone();

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handle).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    let _ = handle.shutdown().await;
    let _ = hub_task.await;

    Ok(())
}
