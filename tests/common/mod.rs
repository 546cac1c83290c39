//! Shared harness: an in-process cluster with real node agents
//!
//! Agents are real axum servers on ephemeral ports backed by tempdir
//! chunk stores, so uploads and downloads exercise the actual HTTP
//! transport. The coordinator pieces are driven directly; recovery is
//! invoked explicitly instead of through the background loop so tests
//! stay deterministic.

#![allow(dead_code)]

use bytes::Bytes;
use scatterfs::agent::http::{create_router, AgentState};
use scatterfs::agent::store::ChunkStore;
use scatterfs::common::{encode_chunk_id, CoordinatorConfig};
use scatterfs::coordinator::agent_client::AgentClient;
use scatterfs::coordinator::metadata::{MetadataStore, Placement, PlacementState};
use scatterfs::coordinator::placement::PlacementStrategy;
use scatterfs::coordinator::recovery::RecoveryEngine;
use scatterfs::coordinator::registry::{NodeEvent, NodeRegistry};
use scatterfs::coordinator::server::UploadRequest;
use scatterfs::Coordinator;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct TestAgent {
    pub node_id: String,
    pub address: String,
    pub store: Arc<ChunkStore>,
    pub data_dir: TempDir,
    server: JoinHandle<()>,
}

impl TestAgent {
    /// Kill the agent's HTTP server, leaving its registration intact
    pub fn stop(&self) {
        self.server.abort();
    }
}

pub struct TestCluster {
    pub coordinator: Arc<Coordinator>,
    pub recovery: Arc<RecoveryEngine>,
    pub registry: Arc<NodeRegistry>,
    pub metadata: Arc<MetadataStore>,
    pub events: mpsc::UnboundedReceiver<NodeEvent>,
    pub agents: Vec<TestAgent>,
    _meta_dir: TempDir,
}

impl TestCluster {
    pub fn agent(&self, node_id: &str) -> &TestAgent {
        self.agents
            .iter()
            .find(|a| a.node_id == node_id)
            .expect("unknown test agent")
    }

    /// Synced placements of a chunk, node ids sorted
    pub fn synced_nodes(&self, chunk_id: &str) -> Vec<String> {
        let mut nodes: Vec<String> = self
            .metadata
            .placements_for_chunk(chunk_id)
            .unwrap()
            .into_iter()
            .filter(|p| p.state == PlacementState::Synced)
            .map(|p| p.node_id)
            .collect();
        nodes.sort();
        nodes
    }

    pub fn placements(&self, chunk_id: &str) -> Vec<Placement> {
        self.metadata.placements_for_chunk(chunk_id).unwrap()
    }
}

pub async fn start_cluster(nodes: usize) -> TestCluster {
    let meta_dir = TempDir::new().unwrap();
    let config = CoordinatorConfig {
        db_path: meta_dir.path().join("meta"),
        agent_timeout_ms: 2_000,
        ..Default::default()
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let registry = Arc::new(NodeRegistry::new(events_tx));
    let metadata = Arc::new(MetadataStore::open(&config.db_path).unwrap());
    let coordinator = Arc::new(
        Coordinator::new(registry.clone(), metadata.clone(), config.clone()).unwrap(),
    );
    let recovery = Arc::new(RecoveryEngine::new(
        registry.clone(),
        metadata.clone(),
        AgentClient::new(config.agent_timeout()).unwrap(),
        config.recovery_concurrency,
        config.recovery_attempts,
        config.conflict_retry_budget,
    ));

    let mut agents = Vec::with_capacity(nodes);
    for i in 0..nodes {
        let agent = spawn_agent(&format!("node-{}", i)).await;
        registry.register(&agent.node_id, &agent.address);
        agents.push(agent);
    }

    TestCluster {
        coordinator,
        recovery,
        registry,
        metadata,
        events: events_rx,
        agents,
        _meta_dir: meta_dir,
    }
}

pub async fn spawn_agent(node_id: &str) -> TestAgent {
    let data_dir = TempDir::new().unwrap();
    let store = Arc::new(ChunkStore::open(data_dir.path()).unwrap());

    let state = AgentState {
        store: store.clone(),
        node_id: node_id.to_string(),
    };
    let router = create_router(state, 64 * 1024 * 1024);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestAgent {
        node_id: node_id.to_string(),
        address,
        store,
        data_dir,
        server,
    }
}

/// Deterministic pseudo-random payload
pub fn test_bytes(len: usize, seed: u64) -> Bytes {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut data = Vec::with_capacity(len);
    for _ in 0..len {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        data.push((state >> 33) as u8);
    }
    Bytes::from(data)
}

pub fn upload_request(chunk_size: u64, replication_factor: u32) -> UploadRequest {
    UploadRequest {
        name: "test.bin".to_string(),
        chunk_size,
        replication_factor,
        strategy: PlacementStrategy::RoundRobin,
    }
}

/// Overwrite a stored chunk blob with garbage, bypassing the agent API
pub fn corrupt_chunk_on_disk(agent: &TestAgent, chunk_id: &str) {
    let target = encode_chunk_id(chunk_id);
    let path = find_file(agent.data_dir.path(), &target)
        .unwrap_or_else(|| panic!("chunk {} not stored on {}", chunk_id, agent.node_id));
    fs::write(path, b"garbage bytes that fail the checksum").unwrap();
}

fn find_file(dir: &Path, name: &str) -> Option<std::path::PathBuf> {
    for entry in fs::read_dir(dir).ok()? {
        let path = entry.ok()?.path();
        if path.is_dir() {
            if let Some(found) = find_file(&path, name) {
                return Some(found);
            }
        } else if path.file_name().and_then(|n| n.to_str()) == Some(name) {
            return Some(path);
        }
    }
    None
}
