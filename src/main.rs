//! CORS relay
//!
//! Forwards HTTP requests to allow-listed hosts and adds
//! `Access-Control-Allow-Origin: *` to the response.
//!
//! # Architecture Overview
//!
//! ```text
//!     Caller (browser page on an allowed referrer)
//!        │  GET /?url=https://api.example/data    Referer: https://allowed.example/
//!        ▼
//!   ┌──────────┐   ┌────────────────────────────────────────────────────┐
//!   │ listener │──▶│ ForwardHandler                                     │
//!   │ HTTP or  │   │  referrer ✓ → target ✓ → buffer body → 5 headers   │
//!   │ FastCGI  │◀──│  ← upstream headers + ACAO:* ← 200? stream body     │
//!   └──────────┘   └──────────────────────────┬─────────────────────────┘
//!                                             │ reqwest
//!                                             ▼
//!                                      Upstream server
//! ```

use clap::Parser;
use tokio::net::TcpListener;

use cors_relay::cli::Cli;
use cors_relay::config::ListenerMode;
use cors_relay::net::fastcgi::FastCgiServer;
use cors_relay::observability::{logging, metrics};
use cors_relay::{HttpServer, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init_tracing(&config.observability.log_level);

    tracing::info!("cors-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        mode = ?config.listener.mode,
        target_hosts = ?config.allow.hosts,
        referrer_hosts = ?config.allow.referrers,
        request_timeout_secs = ?config.timeouts.request_secs,
        "Configuration loaded"
    );

    if let Some(addr) = &config.observability.metrics_address {
        metrics::init_metrics(addr.parse()?)?;
    }

    let server = HttpServer::new(&config)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    match config.listener.mode {
        ListenerMode::Http => server.run(listener, shutdown.subscribe()).await?,
        ListenerMode::FastCgi => {
            let max_body_bytes = config.limits.max_body_bytes.unwrap_or(usize::MAX);
            FastCgiServer::new(server.router(), max_body_bytes)
                .run(listener, shutdown.subscribe())
                .await?
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
