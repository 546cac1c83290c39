//! CLI client for cluster operations

use clap::{Parser, Subcommand};
use scatterfs::common::format_bytes;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scatterfs")]
#[command(about = "scatterfs distributed file storage CLI")]
#[command(version)]
struct Cli {
    /// Coordinator URL
    #[arg(long, default_value = "http://localhost:5000")]
    coordinator: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file
    Upload {
        /// File path
        file: PathBuf,

        /// Chunk size in bytes
        #[arg(long)]
        chunk_size: Option<u64>,

        /// Replication factor
        #[arg(long)]
        replication: Option<u32>,

        /// Placement strategy (round_robin, hash, random)
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Download a file
    Download {
        /// File ID returned by upload
        file_id: String,

        /// Output file
        #[arg(long)]
        out: PathBuf,
    },

    /// List uploaded files
    List,

    /// Show cluster status
    Status,

    /// Mark a node offline (administrative override)
    NodeOffline {
        /// Node ID
        node_id: String,
    },

    /// Mark a node online (administrative override)
    NodeOnline {
        /// Node ID
        node_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Upload {
            file,
            chunk_size,
            replication,
            strategy,
        } => {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "unnamed".to_string());
            let data = tokio::fs::read(&file).await?;
            println!("Uploading {} ({})", name, format_bytes(data.len() as u64));

            let mut url = format!("{}/files?name={}", cli.coordinator, name);
            if let Some(chunk_size) = chunk_size {
                url.push_str(&format!("&chunk_size={}", chunk_size));
            }
            if let Some(replication) = replication {
                url.push_str(&format!("&replication={}", replication));
            }
            if let Some(strategy) = strategy {
                url.push_str(&format!("&strategy={}", strategy));
            }

            let response = client.post(&url).body(data).send().await?;
            let status = response.status();
            let body: serde_json::Value = response.json().await?;
            if !status.is_success() {
                anyhow::bail!("upload failed: {}", body["error"]);
            }

            println!("Upload complete");
            println!("  file_id: {}", body["file_id"].as_str().unwrap_or("?"));
            println!("  chunks: {}", body["total_chunks"]);
            println!("  checksum: {}", body["checksum"].as_str().unwrap_or("?"));
        }

        Commands::Download { file_id, out } => {
            let url = format!("{}/files/{}", cli.coordinator, file_id);
            let response = client.get(&url).send().await?;
            if !response.status().is_success() {
                let body: serde_json::Value = response.json().await?;
                anyhow::bail!("download failed: {}", body["error"]);
            }
            let bytes = response.bytes().await?;
            tokio::fs::write(&out, &bytes).await?;
            println!(
                "Downloaded {} ({}) to {}",
                file_id,
                format_bytes(bytes.len() as u64),
                out.display()
            );
        }

        Commands::List => {
            let url = format!("{}/files", cli.coordinator);
            let body: serde_json::Value = client.get(&url).send().await?.json().await?;
            let files = body["files"].as_array().cloned().unwrap_or_default();
            if files.is_empty() {
                println!("(no files uploaded)");
            }
            for file in files {
                let created = file["created_at"]
                    .as_u64()
                    .and_then(|secs| chrono::DateTime::from_timestamp(secs as i64, 0))
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "{}  {}  {}  {} chunks  [{}]  {}",
                    file["file_id"].as_str().unwrap_or("?"),
                    file["name"].as_str().unwrap_or("?"),
                    format_bytes(file["size"].as_u64().unwrap_or(0)),
                    file["total_chunks"],
                    file["status"].as_str().unwrap_or("?"),
                    created,
                );
            }
        }

        Commands::Status => {
            let url = format!("{}/status", cli.coordinator);
            let body: serde_json::Value = client.get(&url).send().await?.json().await?;
            println!(
                "Nodes: {} healthy, {} failed",
                body["healthy_nodes"], body["failed_nodes"]
            );
            for node in body["nodes"].as_array().cloned().unwrap_or_default() {
                println!(
                    "  {}  {}  [{}]  {} used",
                    node["node_id"].as_str().unwrap_or("?"),
                    node["address"].as_str().unwrap_or("?"),
                    node["status"].as_str().unwrap_or("?"),
                    format_bytes(node["used_bytes"].as_u64().unwrap_or(0)),
                );
            }
            println!(
                "Files: {}",
                body["files"].as_array().map(|f| f.len()).unwrap_or(0)
            );
        }

        Commands::NodeOffline { node_id } => {
            let url = format!("{}/nodes/{}/offline", cli.coordinator, node_id);
            let response = client.post(&url).send().await?;
            if !response.status().is_success() {
                let body: serde_json::Value = response.json().await?;
                anyhow::bail!("node-offline failed: {}", body["error"]);
            }
            println!("{} marked offline", node_id);
        }

        Commands::NodeOnline { node_id } => {
            let url = format!("{}/nodes/{}/online", cli.coordinator, node_id);
            let response = client.post(&url).send().await?;
            if !response.status().is_success() {
                let body: serde_json::Value = response.json().await?;
                anyhow::bail!("node-online failed: {}", body["error"]);
            }
            println!("{} marked online", node_id);
        }
    }

    Ok(())
}
