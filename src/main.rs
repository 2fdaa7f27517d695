//! Certificate relay.
//!
//! # Architecture Overview
//!
//! ```text
//!     Inbound request          ┌──────────────────────────────────────────────────────┐
//!     ─────────────────────────┼─▶ relay server ──▶ routing headers ──▶ certificates   │
//!                              │   (axum)           (default | bound)    + bound client │
//!                              │                                             │          │
//!                              │                                             ▼          │
//!     Relayed response         │                    resilience pipeline: retry          │
//!     ◀────────────────────────┼── response ◀────── → breaker → timeout → transport ───┼──▶ Remote API
//!                              │                                                        │
//!                              │   admin API: status, certificate reset, client reset   │
//!                              └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use cert_relay::admin::{setup_admin_router, AdminState};
use cert_relay::config::{load_config, RelayConfig};
use cert_relay::lifecycle::{shutdown_on_signal, Shutdown};
use cert_relay::net::load_tls_config;
use cert_relay::observability::{logging, metrics};
use cert_relay::{RelayServer, RequestForwarder};

#[derive(Parser)]
#[command(name = "cert-relay", version, about = "Certificate-aware HTTP relay")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "CERT_RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cert-relay starting");
    tracing::info!(
        base_domain = ?config.client.base_domain,
        bind_address = %config.relay.bind_address,
        max_retries = config.resilience.max_retries,
        attempt_timeout_ms = config.resilience.attempt_timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let forwarder = Arc::new(RequestForwarder::new(&config)?);
    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let admin = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let router = setup_admin_router(AdminState {
            forwarder: forwarder.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        });
        let mut stop = shutdown.subscribe();
        Some(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await
        }))
    } else {
        None
    };

    let server = RelayServer::new(forwarder, &config.relay);
    match &config.relay.tls {
        Some(tls) => {
            let addr: SocketAddr = config.relay.bind_address.parse()?;
            let tls = load_tls_config(tls).await?;
            server.run_tls(addr, tls, shutdown.subscribe()).await?;
        }
        None => {
            let listener = TcpListener::bind(&config.relay.bind_address).await?;
            server.run(listener, shutdown.subscribe()).await?;
        }
    }

    // Stop the admin API too when the relay exits first.
    shutdown.trigger();
    if let Some(admin) = admin {
        admin.await??;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
