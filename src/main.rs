//! Stagelink CLI entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stagelink::hub::websocket::{run_server, WsState};
use stagelink::hub::{Hub, HubConfig};
use stagelink::osc::bridge::{BridgeConfig, OscBridge};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "stagelink")]
#[command(about = "Live message relay for browser widgets and OSC rigs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay hub
    Serve {
        /// Address to bind to
        #[arg(short, long, default_value = "0.0.0.0:3000", env = "STAGELINK_BIND")]
        bind: String,

        /// Directory of static client files to serve
        #[arg(long, env = "STAGELINK_PUBLIC")]
        public: Option<PathBuf>,

        /// Hub display name announced to connecting clients
        #[arg(long, default_value = "stagelink-hub", env = "STAGELINK_NAME")]
        name: String,
    },

    /// Run the OSC UDP bridge against a hub
    Bridge {
        /// Hub WebSocket URL
        #[arg(long, default_value = "ws://127.0.0.1:3000/hub", env = "STAGELINK_HUB_URL")]
        hub: String,

        /// Local UDP port to receive OSC on
        #[arg(long, default_value_t = 57120, env = "OSC_IN_PORT")]
        osc_in: u16,

        /// UDP port OSC output is sent to
        #[arg(long, default_value_t = 57121, env = "OSC_OUT_PORT")]
        osc_out: u16,

        /// Host OSC output is sent to
        #[arg(long, default_value = "127.0.0.1", env = "OSC_TARGET_HOST")]
        osc_host: String,

        /// Display name the bridge registers under
        #[arg(long, default_value = "osc-bridge")]
        username: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, public, name } => serve(bind, public, name).await,
        Commands::Bridge {
            hub,
            osc_in,
            osc_out,
            osc_host,
            username,
        } => bridge(hub, osc_in, osc_out, osc_host, username).await,
    }
}

async fn serve(bind: String, public: Option<PathBuf>, name: String) -> Result<()> {
    let bind_addr: SocketAddr = bind.parse().context("Invalid bind address")?;

    let hub = Arc::new(Hub::new(HubConfig {
        name,
        ..HubConfig::default()
    }));
    let state = WsState { hub };

    tokio::select! {
        result = run_server(bind_addr, state, public) => {
            result?;
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping hub");
        }
    }

    Ok(())
}

async fn bridge(
    hub: String,
    osc_in: u16,
    osc_out: u16,
    osc_host: String,
    username: String,
) -> Result<()> {
    let config = BridgeConfig {
        username,
        osc_in,
        osc_out,
        osc_host,
        ..BridgeConfig::new(hub)
    };
    let bridge = OscBridge::new(config);

    tokio::select! {
        result = bridge.run() => {
            result?;
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping bridge");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
