//! Coordinator binary

use clap::{Parser, Subcommand};
use scatterfs::common::CoordinatorConfig;
use scatterfs::CoordinatorServer;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scatterfs-coord")]
#[command(about = "scatterfs coordinator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start coordinator server
    Serve {
        /// Bind address for the HTTP API
        #[arg(long)]
        bind: Option<String>,

        /// Metadata database directory
        #[arg(long)]
        db: Option<PathBuf>,

        /// Default replication factor
        #[arg(long)]
        replication: Option<u32>,

        /// Default chunk size in bytes
        #[arg(long)]
        chunk_size: Option<u64>,

        /// Default placement strategy (round_robin, hash, random)
        #[arg(long)]
        strategy: Option<String>,

        /// Heartbeat timeout in milliseconds
        #[arg(long)]
        heartbeat_timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            db,
            replication,
            chunk_size,
            strategy,
            heartbeat_timeout_ms,
        } => {
            // File config is the base; CLI flags win.
            let mut config = scatterfs::Config::load().coordinator.unwrap_or_default();
            if let Some(bind) = bind {
                config.bind_addr = bind.parse()?;
            }
            if let Some(db) = db {
                config.db_path = db;
            }
            if let Some(replication) = replication {
                config.replication_factor = replication;
            }
            if let Some(chunk_size) = chunk_size {
                config.chunk_size = chunk_size;
            }
            if let Some(strategy) = strategy {
                config.strategy = strategy;
            }
            if let Some(timeout) = heartbeat_timeout_ms {
                config.heartbeat_timeout_ms = timeout;
            }

            validate(&config)?;
            CoordinatorServer::new(config).serve().await?;
        }
    }

    Ok(())
}

fn validate(config: &CoordinatorConfig) -> anyhow::Result<()> {
    config.strategy.parse::<scatterfs::coordinator::placement::PlacementStrategy>()?;
    if config.replication_factor == 0 {
        anyhow::bail!("replication factor must be positive");
    }
    if config.chunk_size == 0 {
        anyhow::bail!("chunk size must be positive");
    }
    Ok(())
}
