//! LeadNest admission gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                   ADMISSION GATEWAY                  │
//!                    │                                                      │
//!   Client Request   │  ┌──────────┐   ┌──────────┐   ┌───────────────────┐ │
//!   ─────────────────┼─▶│ request  │──▶│ classify │──▶│ security check    │ │
//!                    │  │ id/trace │   │  route   │   │ (UA / referer)    │ │
//!                    │  └──────────┘   └──────────┘   └─────────┬─────────┘ │
//!                    │                                          ▼           │
//!                    │                 ┌──────────┐   ┌───────────────────┐ │
//!                    │                 │  token   │◀──│ rate limit        │ │
//!                    │                 │  check   │   │ (fixed window)    │ │
//!                    │                 └────┬─────┘   └───────────────────┘ │
//!                    │                      ▼                               │
//!   Client Response  │  ┌──────────┐   ┌──────────┐                         │
//!   ◀────────────────┼──│ security │◀──│ upstream │◀────────────────────────┼── LeadNest
//!                    │  │ headers  │   │ forward  │                         │   web app
//!                    │  └──────────┘   └──────────┘                         │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use leadnest_gate::config::{load_config, watcher::ConfigWatcher, GateConfig};
use leadnest_gate::lifecycle::{shutdown_on_signal, Shutdown};
use leadnest_gate::observability::{logging, metrics};
use leadnest_gate::{GateServer, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is normal outside development.
    let _ = dotenvy::dotenv();

    let config_path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config: GateConfig = load_config(&config_path)?;

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        "leadnest-gate starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                error = %e,
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Hot reload. The watcher must outlive the server.
    let (watcher, config_updates) = ConfigWatcher::new(&config_path);
    let _watcher = match watcher.run() {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let bind_address: SocketAddr = config.listener.bind_address.parse()?;
    let tls = config.listener.tls.is_some();
    let server = GateServer::new(config)?;

    if tls {
        server.run_tls(bind_address, config_updates, shutdown.subscribe()).await?;
    } else {
        let listener = TcpListener::bind(bind_address).await?;
        server.run(listener, config_updates, shutdown.subscribe()).await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
