//! Coordinator: orchestrates upload, download and cluster state
//!
//! The coordinator owns no data itself. Uploads split, plan and push
//! replicas before committing metadata atomically; a push failure rolls
//! back every already-stored replica and commits nothing. Downloads
//! verify every chunk and fall back through the replica set before
//! surfacing an error.

use crate::common::{sha256_hex, timestamp_now, CoordinatorConfig, Result};
use crate::coordinator::agent_client::AgentClient;
use crate::coordinator::chunker::{self, ChunkPiece};
use crate::coordinator::heartbeat::HeartbeatMonitor;
use crate::coordinator::http::{create_router, CoordState};
use crate::coordinator::metadata::{
    ChunkRecord, FileRecord, FileStatus, MetadataStore, Placement, PlacementState,
};
use crate::coordinator::placement::{PlacementStrategy, Planner};
use crate::coordinator::recovery::RecoveryEngine;
use crate::coordinator::registry::{Node, NodeRegistry, NodeStatus};
use bytes::Bytes;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Parameters of one upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub chunk_size: u64,
    pub replication_factor: u32,
    pub strategy: PlacementStrategy,
}

/// Read-only cluster snapshot
#[derive(Debug, Clone, Serialize)]
pub struct ClusterStatus {
    pub healthy_nodes: usize,
    pub failed_nodes: usize,
    pub nodes: Vec<Node>,
    pub files: Vec<FileRecord>,
}

pub struct Coordinator {
    registry: Arc<NodeRegistry>,
    metadata: Arc<MetadataStore>,
    agents: AgentClient,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        registry: Arc<NodeRegistry>,
        metadata: Arc<MetadataStore>,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        let agents = AgentClient::new(config.agent_timeout())?;
        Ok(Self {
            registry,
            metadata,
            agents,
            config,
        })
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn metadata(&self) -> &Arc<MetadataStore> {
        &self.metadata
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Upload a file: split, plan, push every replica, then commit
    /// metadata in one atomic batch. Nothing becomes visible unless all
    /// replicas acknowledged.
    pub async fn upload(&self, data: Bytes, request: UploadRequest) -> Result<FileRecord> {
        if request.replication_factor == 0 {
            return Err(crate::Error::InvalidConfig(
                "replication factor must be positive".into(),
            ));
        }

        let size = data.len() as u64;
        let split = chunker::split(data, request.chunk_size)?;
        let file_id = Uuid::new_v4().to_string();

        let chunks: Vec<ChunkRecord> = split
            .pieces
            .iter()
            .map(|piece| ChunkRecord {
                chunk_id: ChunkRecord::id_for(&file_id, piece.index),
                file_id: file_id.clone(),
                index: piece.index,
                size: piece.data.len() as u64,
                checksum: piece.checksum.clone(),
            })
            .collect();

        let healthy = self.registry.list_healthy();
        let planner = Planner::new(request.strategy);
        let mut plan = planner.plan(&chunks, request.replication_factor as usize, &healthy)?;

        tracing::info!(
            "upload {}: {} chunks x{} replicas over {} nodes ({})",
            file_id,
            chunks.len(),
            request.replication_factor,
            healthy.len(),
            request.strategy
        );

        // Push every replica concurrently. Replicas of the same chunk
        // share an exclusion set so a retried push never lands on a node
        // that already holds (or is receiving) the chunk.
        let mut pushes = Vec::new();
        for (chunk, piece) in chunks.iter().zip(&split.pieces) {
            let assigned = plan.remove(&chunk.chunk_id).expect("chunk was planned");
            let used: Arc<Mutex<HashSet<String>>> =
                Arc::new(Mutex::new(assigned.iter().cloned().collect()));
            for target in assigned {
                pushes.push(self.push_replica(
                    chunk,
                    piece.data.clone(),
                    target,
                    request.strategy,
                    used.clone(),
                ));
            }
        }

        let results: Vec<Result<Placement>> = stream::iter(pushes)
            .buffer_unordered(self.config.transfer_concurrency.max(1))
            .collect()
            .await;

        let mut placements = Vec::new();
        let mut failure = None;
        for result in results {
            match result {
                Ok(placement) => placements.push(placement),
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = failure {
            tracing::warn!("upload {} aborted: {}", file_id, e);
            self.rollback(&placements).await;
            return Err(e);
        }

        let file = FileRecord {
            file_id: file_id.clone(),
            name: request.name,
            size,
            chunk_size: request.chunk_size,
            total_chunks: chunks.len() as u32,
            checksum: split.file_checksum,
            replication_factor: request.replication_factor,
            strategy: request.strategy,
            status: FileStatus::Active,
            version: 1,
            created_at: timestamp_now(),
        };

        if let Err(e) = self.metadata.register_file(&file, &chunks, &placements) {
            self.rollback(&placements).await;
            return Err(e);
        }

        tracing::info!("upload {} committed ({} bytes)", file_id, size);
        Ok(file)
    }

    /// Download a file, verifying every chunk and falling back through
    /// replicas on integrity or connectivity failures.
    pub async fn download(&self, file_id: &str) -> Result<Bytes> {
        let manifest = self.metadata.lookup(file_id)?;

        let jobs: Vec<(ChunkRecord, Vec<Placement>)> = manifest
            .chunks
            .iter()
            .map(|chunk| {
                let placements = manifest
                    .placements
                    .get(&chunk.chunk_id)
                    .cloned()
                    .unwrap_or_default();
                (chunk.clone(), placements)
            })
            .collect();

        let pieces: Vec<ChunkPiece> = stream::iter(jobs.into_iter().map(|(chunk, placements)| {
            async move { self.fetch_chunk(&chunk, placements).await }
        }))
        .buffered(self.config.transfer_concurrency.max(1))
        .try_collect()
        .await?;

        let bytes = chunker::reconstruct(&pieces)?;
        let actual = sha256_hex(&bytes);
        if actual != manifest.file.checksum {
            return Err(crate::Error::Internal(format!(
                "whole-file checksum mismatch for {}: expected {}, got {}",
                file_id, manifest.file.checksum, actual
            )));
        }

        tracing::info!("download {} complete ({} bytes)", file_id, bytes.len());
        Ok(Bytes::from(bytes))
    }

    /// Read-only snapshot composed from registry and metadata
    pub fn status(&self) -> Result<ClusterStatus> {
        let nodes = self.registry.list_all();
        let healthy_nodes = nodes.iter().filter(|n| n.status.is_healthy()).count();
        let failed_nodes = nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Failed)
            .count();
        Ok(ClusterStatus {
            healthy_nodes,
            failed_nodes,
            nodes,
            files: self.metadata.list_files()?,
        })
    }

    /// Administrative liveness override
    pub fn node_offline(&self, node_id: &str) -> Result<()> {
        self.registry.mark_offline(node_id)
    }

    /// Administrative liveness override
    pub fn node_online(&self, node_id: &str) -> Result<()> {
        self.registry.mark_online(node_id)
    }

    async fn push_replica(
        &self,
        chunk: &ChunkRecord,
        data: Bytes,
        initial_target: String,
        strategy: PlacementStrategy,
        used: Arc<Mutex<HashSet<String>>>,
    ) -> Result<Placement> {
        let mut target_id = initial_target;
        let mut last_err = None;

        for attempt in 0..self.config.push_attempts.max(1) {
            match self.registry.get(&target_id) {
                Some(node) => {
                    match self
                        .agents
                        .store_chunk(&node, &chunk.chunk_id, &chunk.checksum, data.clone())
                        .await
                    {
                        Ok(()) => {
                            return Ok(Placement {
                                chunk_id: chunk.chunk_id.clone(),
                                node_id: target_id,
                                state: PlacementState::Synced,
                            });
                        }
                        Err(e) => {
                            tracing::warn!(
                                "push of chunk {} to {} failed (attempt {}): {}",
                                chunk.chunk_id,
                                target_id,
                                attempt + 1,
                                e
                            );
                            if !e.is_retryable() {
                                return Err(e);
                            }
                            last_err = Some(e);
                        }
                    }
                }
                None => {
                    last_err = Some(crate::Error::NotFound(format!("node {}", target_id)));
                }
            }

            // Prefer an alternate node not already holding this chunk;
            // retry the same node only when none is left.
            if let Some(next) = self.alternate_target(chunk, strategy, &used) {
                target_id = next;
            }
        }

        Err(last_err.unwrap_or(crate::Error::InsufficientNodes {
            needed: 1,
            available: 0,
        }))
    }

    fn alternate_target(
        &self,
        chunk: &ChunkRecord,
        strategy: PlacementStrategy,
        used: &Arc<Mutex<HashSet<String>>>,
    ) -> Option<String> {
        let healthy = self.registry.list_healthy();
        let mut used = used.lock().unwrap();
        let candidates: Vec<Node> = healthy
            .into_iter()
            .filter(|n| !used.contains(&n.node_id))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let picked = Planner::new(strategy)
            .select(chunk, 1, &candidates)
            .ok()?
            .pop()?;
        used.insert(picked.clone());
        Some(picked)
    }

    async fn fetch_chunk(
        &self,
        chunk: &ChunkRecord,
        placements: Vec<Placement>,
    ) -> Result<ChunkPiece> {
        // Synced replicas only, healthiest first; known-failed nodes are
        // still tried last rather than skipped.
        let mut replicas: Vec<Node> = placements
            .iter()
            .filter(|p| p.state == PlacementState::Synced)
            .filter_map(|p| self.registry.get(&p.node_id))
            .collect();
        replicas.sort_by_key(|n| status_rank(n.status));

        for node in &replicas {
            match self.agents.retrieve_chunk(node, &chunk.chunk_id).await {
                Ok((data, _)) => {
                    let actual = sha256_hex(&data);
                    if actual != chunk.checksum {
                        tracing::warn!(
                            "chunk {} corrupt on {}: expected {}, got {}; trying next replica",
                            chunk.chunk_id,
                            node.node_id,
                            chunk.checksum,
                            actual
                        );
                        continue;
                    }
                    return Ok(ChunkPiece {
                        index: chunk.index,
                        data,
                        checksum: chunk.checksum.clone(),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "chunk {} fetch from {} failed: {}; trying next replica",
                        chunk.chunk_id,
                        node.node_id,
                        e
                    );
                }
            }
        }

        Err(crate::Error::FileUnavailable {
            file_id: chunk.file_id.clone(),
            chunk_index: chunk.index,
        })
    }

    /// Best-effort delete of replicas pushed by an aborted upload
    async fn rollback(&self, placements: &[Placement]) {
        for placement in placements {
            if let Some(node) = self.registry.get(&placement.node_id) {
                if let Err(e) = self.agents.delete_chunk(&node, &placement.chunk_id).await {
                    tracing::debug!(
                        "rollback delete of {} on {} failed: {}",
                        placement.chunk_id,
                        placement.node_id,
                        e
                    );
                }
            }
        }
    }
}

fn status_rank(status: NodeStatus) -> u8 {
    match status {
        NodeStatus::Healthy => 0,
        NodeStatus::Suspected => 1,
        NodeStatus::Failed => 2,
    }
}

/// Wires the coordinator together and serves its HTTP API
pub struct CoordinatorServer {
    config: CoordinatorConfig,
}

impl CoordinatorServer {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        let config = self.config;
        tracing::info!("starting coordinator");
        tracing::info!("  HTTP API: {}", config.bind_addr);
        tracing::info!("  DB path: {}", config.db_path.display());
        tracing::info!(
            "  defaults: {} replicas, {} byte chunks, {} strategy",
            config.replication_factor,
            config.chunk_size,
            config.strategy
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(NodeRegistry::new(events_tx));
        let metadata = Arc::new(MetadataStore::open(&config.db_path)?);
        let coordinator = Arc::new(Coordinator::new(
            registry.clone(),
            metadata.clone(),
            config.clone(),
        )?);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let monitor = HeartbeatMonitor::new(
            registry.clone(),
            config.heartbeat_interval(),
            config.heartbeat_timeout(),
        );
        let monitor_handle = monitor.spawn(shutdown_rx.clone());

        let recovery = Arc::new(RecoveryEngine::new(
            registry,
            metadata,
            AgentClient::new(config.agent_timeout())?,
            config.recovery_concurrency,
            config.recovery_attempts,
            config.conflict_retry_budget,
        ));
        let recovery_handle =
            recovery.spawn(events_rx, shutdown_rx, config.recovery_interval());

        let router = create_router(
            CoordState { coordinator },
            config.max_upload_bytes as usize,
        );
        let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
        tracing::info!("coordinator ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown signal received");
            })
            .await?;

        let _ = shutdown_tx.send(true);
        let _ = monitor_handle.await;
        let _ = recovery_handle.await;
        Ok(())
    }
}
