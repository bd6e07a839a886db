//! Datacenter node binary

use clap::{Parser, Subcommand};
use minifs::common::Config;
use minifs::NodeServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minifs-node")]
#[command(about = "minifs datacenter node")]
#[command(version)]
struct Cli {
    /// Config file (TOML); defaults to $MINIFS_CONFIG or ./minifs.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node
    Serve {
        /// Datacenter code served by this node
        #[arg(long)]
        dc: Option<String>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Root data directory
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config from file, then override with CLI arguments
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve { dc, bind, data } => {
            if let Some(dc) = dc {
                // A node started by code alone listens on that code's configured port.
                if bind.is_none() {
                    if let Some(port) = config.cluster.address_of(&dc).and_then(port_of) {
                        config.node.bind_addr.set_port(port);
                    }
                }
                config.node.datacenter = dc;
            }
            if let Some(bind) = bind {
                config.node.bind_addr = bind;
            }
            if let Some(data) = data {
                config.node.data_dir = data;
            }

            tracing::info!("minifs {}", minifs::BUILD_INFO);
            let server = NodeServer::new(config.node, Arc::new(config.cluster))?;
            server.serve().await?;
        }
    }

    Ok(())
}

/// Port of a base URL such as `http://localhost:5002`.
fn port_of(address: &str) -> Option<u16> {
    address
        .trim_end_matches('/')
        .rsplit(':')
        .next()
        .and_then(|port| port.parse().ok())
}
