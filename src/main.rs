//! Waitlist intake service.
//!
//! # Architecture Overview
//!
//! ```text
//!     POST /api/waitlist
//!     ───────────────────▶ http server ──▶ intake pipeline
//!                          (request id,     origin → validate → honeypot
//!                           trace span,     → signals → rate limit
//!                           panic capture)  → bot verification → upsert
//!                                                  │          │        │
//!                                                  ▼          ▼        ▼
//!                                              Upstash   Turnstile  MongoDB
//!                                              (or memory)          (or memory)
//! ```
//!
//! Configuration is read once from an optional TOML file plus environment
//! secrets; every gate and the store are chosen at startup.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use waitlist_intake::config::load_config;
use waitlist_intake::http::HttpServer;
use waitlist_intake::lifecycle::{build_services, wait_for_signal, Shutdown};
use waitlist_intake::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "waitlist-intake")]
#[command(about = "Waitlist sign-up intake service", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        profile = config.profile.as_str(),
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        external_call_ms = config.timeouts.external_call_ms,
        "waitlist-intake starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Metrics exporter disabled");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = build_services(&config).await?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, services.pipeline);
    let serving = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();
    serving.await??;

    if let Some(store) = services.memory_store {
        if let Err(e) = store.save_snapshot() {
            tracing::error!(error = %e, "Failed to save waitlist snapshot");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
