//! Storage node agent binary

use clap::{Parser, Subcommand};
use scatterfs::common::AgentConfig;
use scatterfs::NodeAgent;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scatterfs-node")]
#[command(about = "scatterfs storage node agent")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start node agent
    Serve {
        /// Node ID
        #[arg(long)]
        id: String,

        /// Bind address for the chunk API
        #[arg(long, default_value = "0.0.0.0:6000")]
        bind: String,

        /// Data directory for chunk blobs
        #[arg(long, default_value = "./node-data")]
        data: PathBuf,

        /// Coordinator base URL
        #[arg(long, default_value = "http://localhost:5000")]
        coordinator: String,

        /// Address advertised to the coordinator
        #[arg(long)]
        advertise: Option<String>,

        /// Heartbeat interval in milliseconds
        #[arg(long, default_value = "5000")]
        heartbeat_interval_ms: u64,
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
            id,
            bind,
            data,
            coordinator,
            advertise,
            heartbeat_interval_ms,
        } => {
            let file_config = scatterfs::Config::load().agent;

            let mut config = AgentConfig {
                node_id: id,
                bind_addr: bind.parse()?,
                data_dir: data,
                coordinator_url: coordinator,
                advertise_url: advertise,
                heartbeat_interval_ms,
                max_chunk_bytes: 256 * 1024 * 1024,
            };
            if let Some(file_config) = file_config {
                config.max_chunk_bytes = file_config.max_chunk_bytes;
            }

            NodeAgent::new(config).serve().await?;
        }
    }

    Ok(())
}
