//! DB Broker - Main entry point.
//!
//! Serves the connection broker over HTTP with a WebSocket status channel.

use db_broker::Broker;
use db_broker::config::Config;
use db_broker::transport::{HttpTransport, Transport};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    info!(
        probe_interval_secs = config.probe_interval().as_secs(),
        "Starting DB Broker v{}",
        env!("CARGO_PKG_VERSION")
    );

    let broker = Broker::from_config(&config)?;

    let transport = HttpTransport::new(
        broker,
        &config.http_host,
        config.http_port,
        &config.api_prefix,
        &config.ws_path,
    )
    .with_subscriber_buffer(config.subscriber_buffer);

    info!(
        transport = transport.name(),
        host = %config.http_host,
        port = config.http_port,
        "Using HTTP transport"
    );

    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
