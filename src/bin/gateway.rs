//! BACnet/IP gateway entry point.
//!
//! Parses `--respath`, loads the local `.ini` configuration, connects
//! to the document database, installs the console logger plus the
//! `Logs`-collection forwarding layer, and runs the service runtime
//! until a shutdown signal arrives: `clap` derive args,
//! `tracing_subscriber` env-filter init, then hand off to the
//! long-running runtime.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bacnet_gateway::adapters::mongodb_store::{MongoConfig, MongoStore};
use bacnet_gateway::config::ConfigStore;
use bacnet_gateway::logging::LogForwardingLayer;
use bacnet_gateway::runtime::{self, RuntimeConfig};
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// BACnet/IP building-automation gateway.
#[derive(Parser, Debug)]
#[command(name = "bacnet-gateway")]
#[command(about = "Discovers BACnet/IP devices, polls their points, and reconciles snapshots to a document database", long_about = None)]
struct Args {
    /// Directory holding local-device.ini, ini.events, and object-graph.bin
    #[arg(long)]
    respath: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    eprintln!("starting bacnet gateway, respath={}", args.respath.display());

    let config = Arc::new(ConfigStore::load(&args.respath).context("failed to load local-device.ini")?);

    let tz = config
        .read("device", "tz")?
        .as_str()
        .unwrap_or("UTC")
        .to_string();
    let nukid = config
        .read("device", "nukid")?
        .as_str()
        .unwrap_or_default()
        .to_string();

    let mongo_config = MongoConfig {
        connection_string: config
            .read("mongodb", "connectionString")?
            .as_str()
            .unwrap_or_default()
            .to_string(),
        cert_path: PathBuf::from(config.read("mongodb", "certpath")?.as_str().unwrap_or_default()),
        db_name: config.read("mongodb", "dbname")?.as_str().unwrap_or_default().to_string(),
    };
    let store = Arc::new(
        MongoStore::connect(&mongo_config)
            .await
            .context("failed to connect to mongodb")?,
    );
    store.ping().await.context("mongodb ping failed")?;

    // Tracing comes up once a store exists to forward into: console
    // output via `tracing_subscriber::fmt`, plus every INFO-and-above
    // event mirrored into the `Logs` collection (§6).
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bacnet_gateway=info")))
        .with(tracing_subscriber::fmt::layer())
        .with(LogForwardingLayer::spawn(store.clone(), tz.clone()))
        .init();

    info!("mongodb connection established");

    let stack = Arc::new(production_bacnet_stack(&config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    runtime::run(
        RuntimeConfig {
            respath: args.respath,
            tz,
            nukid,
            config,
            stack,
            store,
        },
        shutdown_rx,
    )
    .await?;

    Ok(())
}

/// The real BACnet/IP wire stack is consumed only through the
/// `BacnetStack` port. This crate ships only the simulated adapter for
/// tests; wiring a production stack means implementing `BacnetStack`
/// against that library and constructing it here instead.
fn production_bacnet_stack(
    config: &ConfigStore,
) -> Result<bacnet_gateway::adapters::sim_bacnet::SimulatedStack> {
    let interface = config.read("network", "interface")?;
    info!(interface = %interface, "no production BACnet/IP stack adapter is wired; running with an empty simulated stack");
    Ok(bacnet_gateway::adapters::sim_bacnet::SimulatedStack::new())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down..."),
        _ = terminate => info!("received SIGTERM, shutting down..."),
    }
}
