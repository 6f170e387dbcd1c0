//! echo-socket: A WebSocket echo server
//!
//! Every text and binary message is echoed back verbatim. Two text
//! payloads act as session commands:
//! - `ServerClose`: the server closes with 1000 "Closing from Server"
//! - `ServerAbort`: the server drops the connection without a close frame
//!
//! Features:
//! - Peer close frames are answered with the same status and reason
//! - Per-frame audit log at debug level
//! - Optional per-operation I/O timeout
//! - Configuration via CLI arguments or TOML file

mod config;
mod protocols;
mod server;
mod transport;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        workers = ?config.workers,
        max_connections = config.max_connections,
        max_message_size = config.max_message_size,
        io_timeout = ?config.io_timeout,
        "Starting echo-socket server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.build()?;

    runtime.block_on(async {
        let server = Server::new(config);
        server.run().await.map_err(|e| e as Box<dyn std::error::Error>)
    })
}
