//! Dynamic API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ http::server ──▶ routing::RouteTable::find
//!                                     │
//!                                     ▼
//!                              filter::FilterChain
//!        blacklist → request log → decryption → response shaping → route filters
//!                                     │
//!                                     ▼
//!                              http::dispatch ──▶ upstream
//!
//!   store (PostgreSQL) ──▶ routing::RouteStore ◀──▶ cache (Redis)
//!                                     ▲
//!   "route-updates" ──▶ routing::RouteCacheInvalidator ──▶ table refresh
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;

use dynamic_gateway::admin;
use dynamic_gateway::config::{load_config, validate_config, GatewayConfig};
use dynamic_gateway::lifecycle::{self, Backends, Gateway, Shutdown};
use dynamic_gateway::observability::{logging, metrics};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "dynamic-gateway", version, about = "Dynamic routing API gateway")]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let config = GatewayConfig::default();
            if let Err(errors) = validate_config(&config) {
                let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
                return Err(joined.join("; ").into());
            }
            config
        }
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = ?args.config, "dynamic-gateway starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let backends = Backends::from_config(&config.backend).await?;
    let shutdown = Shutdown::new();
    let gateway = Gateway::start(&config, backends, &shutdown).await;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let signals = shutdown.clone();
    tokio::spawn(async move { signals.listen_for_signals().await });

    let admin_task = if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = gateway.admin.clone();
        let admin_shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = admin::run_admin(state, admin_listener, &admin_shutdown).await {
                tracing::error!(error = %e, "Admin listener failed");
            }
        }))
    } else {
        None
    };

    let served = gateway.server().run(listener, &shutdown).await;
    shutdown.trigger();

    if let Some(task) = admin_task {
        lifecycle::reap("admin", task).await;
    }
    gateway.join(SHUTDOWN_DEADLINE).await;

    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}
