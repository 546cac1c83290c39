//! Node agent server
//!
//! Serves the chunk API, self-registers with the coordinator at startup
//! and pushes heartbeats on an interval. If the coordinator restarts
//! and forgets this node, the heartbeat loop re-registers it, which is
//! how the registry gets rebuilt.

use crate::agent::http::{create_router, AgentState};
use crate::agent::store::ChunkStore;
use crate::common::{AgentConfig, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub struct NodeAgent {
    config: AgentConfig,
}

impl NodeAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        let config = self.config;
        tracing::info!("starting node agent: {}", config.node_id);
        tracing::info!("  chunk API: {}", config.bind_addr);
        tracing::info!("  data dir: {}", config.data_dir.display());
        tracing::info!("  coordinator: {}", config.coordinator_url);

        let store = Arc::new(ChunkStore::open(&config.data_dir)?);

        let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
        let advertised = match &config.advertise_url {
            Some(url) => url.clone(),
            None => format!("http://{}", listener.local_addr()?),
        };

        let heartbeats = tokio::spawn(heartbeat_loop(
            config.node_id.clone(),
            advertised,
            config.coordinator_url.clone(),
            config.heartbeat_interval(),
            store.clone(),
        ));

        let state = AgentState {
            store,
            node_id: config.node_id.clone(),
        };
        let router = create_router(state, config.max_chunk_bytes as usize);
        tracing::info!("node agent ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown signal received");
            })
            .await?;

        heartbeats.abort();
        Ok(())
    }
}

/// Register with the coordinator, then push heartbeats forever. A
/// rejected heartbeat (unknown node) triggers re-registration.
async fn heartbeat_loop(
    node_id: String,
    address: String,
    coordinator_url: String,
    interval: Duration,
    store: Arc<ChunkStore>,
) {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("heartbeat client: {}", e);
            return;
        }
    };

    let mut registered = false;
    loop {
        if !registered {
            registered = register(&client, &coordinator_url, &node_id, &address).await;
        }

        if registered {
            let used_bytes = store.stats().map(|s| s.bytes).unwrap_or(0);
            let url = format!("{}/nodes/{}/heartbeat", coordinator_url, node_id);
            match client
                .post(&url)
                .json(&json!({ "used_bytes": used_bytes }))
                .send()
                .await
            {
                Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                    tracing::warn!("coordinator does not know this node, re-registering");
                    registered = false;
                }
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!("heartbeat rejected: {}", response.status());
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("heartbeat failed: {}", e);
                }
            }
        }

        tokio::time::sleep(interval).await;
    }
}

async fn register(
    client: &reqwest::Client,
    coordinator_url: &str,
    node_id: &str,
    address: &str,
) -> bool {
    let url = format!("{}/nodes/register", coordinator_url);
    match client
        .post(&url)
        .json(&json!({ "node_id": node_id, "address": address }))
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            tracing::info!("registered with coordinator as {}", node_id);
            true
        }
        Ok(response) => {
            tracing::warn!("registration rejected: {}", response.status());
            false
        }
        Err(e) => {
            tracing::warn!("registration failed: {}", e);
            false
        }
    }
}
