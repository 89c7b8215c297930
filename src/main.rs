//! tcp-echo: a TCP echo server
//!
//! Accepts connections and writes back every byte it reads from each one,
//! unchanged and in order, until the peer closes or an I/O error occurs.
//!
//! Features:
//! - One task per connection, no shared state between connections
//! - Optional cap on concurrent connections
//! - Configuration via CLI arguments or TOML file

mod config;
mod echo;
mod listener;
mod server;

use config::Config;
use server::{Server, ServerError};
use tracing::{error, info};
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
        backlog = config.backlog,
        buffer_size = config.buffer_size,
        max_connections = ?config.max_connections,
        accept_errors = ?config.accept_errors,
        "Starting tcp-echo server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    if let Err(e) = runtime.block_on(run(config)) {
        error!(error = %e, "Server stopped");
        return Err(e.into());
    }

    Ok(())
}

/// Bind and serve until a fatal error.
async fn run(config: Config) -> Result<(), ServerError> {
    let server = Server::bind(config).await?;
    server.run().await
}
