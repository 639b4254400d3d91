//! framechat: a multi-client TCP chat demo
//!
//! The server accepts any number of clients and acknowledges every message
//! they send. The client reads lines from stdin and sends each one to the
//! server.
//!
//! Features:
//! - Fixed-width, length-prefixed framing shared by both sides
//! - One task per connection on the server
//! - Configuration via CLI arguments or TOML file

mod client;
mod config;
mod protocol;
mod server;

use config::{Config, Role, SessionConfig};
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

    match config.role {
        Role::Server { listen } => run_server(listen, config.session),
        Role::Client { connect } => run_client(connect, config.session),
    }
}

/// Run the server on a multi-threaded runtime, one task per client
fn run_server(listen: String, session: SessionConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        listen = %listen,
        header_width = session.header_width,
        max_payload = session.max_payload,
        "[STARTING] Server is starting..."
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let server = server::Server::bind(&listen, session)
            .await
            .map_err(|e| {
                error!(error = %e, "[ERROR] Could not start server. Is another process using {listen}?");
                e
            })?;
        server.run().await;
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}

/// Run the interactive client on a single thread
fn run_client(connect: String, session: SessionConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(client::run(&connect, session))?;
    Ok(())
}
