//! Payment probe agent.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                          PAYMENT PROBE                           │
//!   │                                                                  │
//!   │  ┌───────────┐   ┌────────┐   ┌─────────────────┐   getToken     │
//!   │  │ scheduler │──▶│ prober │──▶│ request pipeline│──────────────▶ │ Payment
//!   │  │ (period)  │   │ + pacer│   │ token → redeem  │   redirect/{t} │ API
//!   │  └─────▲─────┘   └────────┘   └───────┬─────────┘──────────────▶ │
//!   │        │                              │                          │
//!   │        │ force-run                    ▼                          │
//!   │  ┌─────┴─────┐   ┌──────────┐   ┌────────────┐   ┌───────────┐   │
//!   │  │   http    │◀──│ exporter │◀──│ aggregator │   │failure log│   │
//!   │  │ /metrics  │   │(snapshot)│   │ (per batch)│   │ (history) │   │
//!   │  └───────────┘   └──────────┘   └────────────┘   └───────────┘   │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use payment_probe::config::load_config;
use payment_probe::http::HttpServer;
use payment_probe::lifecycle::{self, Shutdown};
use payment_probe::observability::logging;

#[derive(Parser)]
#[command(name = "payment-probe")]
#[command(about = "Synthetic availability and latency probe for a payment API", long_about = None)]
struct Args {
    /// TOML configuration file; defaults and environment apply without one.
    #[arg(short, long, env = "PROBE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    logging::init(&config.observability);
    tracing::info!("payment-probe v{} starting", env!("CARGO_PKG_VERSION"));

    let bind_address = config.listener.bind_address.clone();
    let agent = lifecycle::build(config)?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let scheduler = agent.scheduler.clone().spawn(&shutdown);

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            lifecycle::wait_for_signal().await;
            shutdown.trigger();
        });
    }

    let server = HttpServer::new(agent.app_state(), &agent.config);
    server.run(listener, shutdown.subscribe()).await?;

    scheduler.shutdown().await;
    let history = agent.history.clone();
    tokio::task::spawn_blocking(move || history.close()).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
