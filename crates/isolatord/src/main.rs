//! Host isolation relay daemon
//!
//! Main entry point for isolatord. Loads configuration, wires the router and
//! controller clients into the REST API and serves until SIGINT/SIGTERM.

use anyhow::Context;
use clap::Parser;
use ovs_isolatord::{
    AppState, BlacklistStore, FlowInspector, IsolationEngine, IsolatorConfig, LuciClient,
    RyuClient,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Host isolation relay for OpenWrt routers and Ryu-managed switches
#[derive(Parser, Debug)]
#[command(name = "isolatord")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = ovs_isolatord::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the listen port from the configuration file
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("isolatord: Starting host isolation relay");

    match run(args).await {
        Ok(()) => {
            info!("isolatord: Exiting normally");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "isolatord: Exiting with error");
            Err(e)
        }
    }
}

/// Initialize structured logging
fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set logger")?;
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = IsolatorConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!(
        router = %config.router.host,
        controller = %config.controller.base_url(),
        blacklist = %config.blacklist.path.display(),
        "isolatord: Configuration loaded"
    );

    let controller = Arc::new(RyuClient::new(&config.controller)?);
    let devices = Arc::new(LuciClient::new(&config.router)?);
    let store = BlacklistStore::new(config.blacklist.path.clone());

    let state = AppState {
        engine: Arc::new(IsolationEngine::new(
            controller.clone(),
            store,
            config.controller.default_dpid,
        )),
        inspector: Arc::new(FlowInspector::new(controller, config.controller.default_dpid)),
        devices,
    };

    let addr = format!("{}:{}", config.server.listen_addr, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    ovs_isolatord::serve(listener, state, shutdown_signal()).await?;

    info!("isolatord: Graceful shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            error!("isolatord: Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "isolatord: Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("isolatord: Received shutdown signal");
}
