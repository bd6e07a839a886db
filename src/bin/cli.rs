//! Client CLI

use clap::{Parser, Subcommand};
use minifs::common::{Config, Decision, ReplicationStatus};
use minifs::Client;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "minifs")]
#[command(about = "minifs multi-datacenter file store CLI")]
#[command(version)]
struct Cli {
    /// Config file (TOML); defaults to $MINIFS_CONFIG or ./minifs.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Datacenter that serves cache misses
    #[arg(long)]
    bootstrap: Option<String>,

    /// Cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Keep the cache in memory for this invocation only
    #[arg(long)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a file (cache first, then the bootstrap datacenter)
    Read {
        /// Filename
        filename: String,
    },

    /// Write a file through its primary datacenter
    Write {
        /// Filename
        filename: String,

        /// New content
        #[arg(long)]
        content: String,
    },

    /// Check that a datacenter answers
    Ping {
        /// Datacenter code
        datacenter: String,
    },

    /// Show every datacenter and the files it holds
    Status,

    /// Drop every cached file
    ClearCache,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(bootstrap) = cli.bootstrap {
        config.client.bootstrap = bootstrap;
    }
    if let Some(dir) = cli.cache_dir {
        config.client.cache_dir = Some(dir);
    }
    if cli.no_cache {
        config.client.cache_dir = None;
    }

    let cluster = Arc::new(config.cluster);
    let client = Client::from_config(cluster.clone(), &config.client)?;

    match cli.command {
        Commands::Read { filename } => {
            let read = client.read(&filename).await?;
            if read.cached {
                println!(
                    "[CACHE] {} (fetched from {} at {})",
                    filename,
                    read.entry.source_node,
                    read.entry.fetch_time.to_rfc3339()
                );
            } else {
                println!("[NETWORK] {} from {}", filename, read.entry.source_node);
            }
            println!("---- File Content ----");
            println!("{}", read.entry.content);
            println!("----------------------");
        }

        Commands::Write { filename, content } => {
            let receipt = client.write(&filename, &content).await?;
            println!("Write result: {} (primary {})", receipt.status, receipt.primary);
            println!("  Votes:");
            for vote in receipt.votes.iter() {
                let decision = match vote.decision {
                    Decision::Yes => "yes",
                    Decision::No => "no",
                };
                match &vote.reason {
                    Some(reason) => println!("    {}: {} ({})", vote.node, decision, reason),
                    None => println!("    {}: {}", vote.node, decision),
                }
            }
            println!("  Replication:");
            for result in receipt.replication_results.iter() {
                let status = match result.status {
                    ReplicationStatus::Replicated => "replicated",
                    ReplicationStatus::Failed => "failed",
                };
                match &result.detail {
                    Some(detail) => println!("    {}: {} ({})", result.node, status, detail),
                    None => println!("    {}: {}", result.node, status),
                }
            }
            println!("[CACHE] Cache invalidated for {}", filename);
        }

        Commands::Ping { datacenter } => {
            let pong = client.ping(&datacenter).await?;
            println!("{}: {}", pong.datacenter, pong.status);
        }

        Commands::Status => {
            println!("Cluster status:");
            for dc in cluster.codes() {
                match client.list(dc).await {
                    Ok(listing) => {
                        println!("  {}: online, {} files", dc, listing.files.len());
                        for file in listing.files {
                            println!("    {}", file);
                        }
                    }
                    Err(e) => println!("  {}: unreachable ({})", dc, e),
                }
            }
            let cached = client.cache().filenames()?;
            match client.cache().dir() {
                Some(dir) => println!("  Cached: {} (in {})", cached.len(), dir.display()),
                None => println!("  Cached: {} (in memory)", cached.len()),
            }
            for file in cached {
                println!("    {}", file);
            }
        }

        Commands::ClearCache => {
            client.cache().clear()?;
            println!("Cache cleared");
        }
    }

    Ok(())
}
