//! Recovery engine: re-replicates under-protected chunks
//!
//! Consumes failure events from the registry and runs a periodic at-risk
//! sweep as a safety net, so chunks that exhaust their attempt budget in
//! one cycle converge in a later one. Recovery is idempotent: a chunk
//! that already has enough synced replicas only gets its stale records
//! cleaned up, and replica counts never exceed the replication factor.

use crate::common::{sha256_hex, with_conflict_retry, Result};
use crate::coordinator::agent_client::AgentClient;
use crate::coordinator::metadata::{
    AtRiskChunk, ChunkRecord, FileStatus, MetadataStore, Placement, PlacementState,
};
use crate::coordinator::placement::Planner;
use crate::coordinator::registry::{Node, NodeEvent, NodeRegistry};
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Outcome of one recovery cycle
#[derive(Debug, Default, Clone)]
pub struct RecoveryReport {
    pub chunks_checked: usize,
    pub chunks_recovered: usize,
    pub chunks_lost: usize,
    pub chunks_incomplete: usize,
    pub bytes_copied: u64,
}

enum ChunkOutcome {
    Converged,
    Recovered { bytes: u64 },
    Lost,
    Incomplete,
}

pub struct RecoveryEngine {
    registry: Arc<NodeRegistry>,
    metadata: Arc<MetadataStore>,
    agents: AgentClient,
    concurrency: usize,
    attempts: usize,
    conflict_budget: usize,
}

impl RecoveryEngine {
    pub fn new(
        registry: Arc<NodeRegistry>,
        metadata: Arc<MetadataStore>,
        agents: AgentClient,
        concurrency: usize,
        attempts: usize,
        conflict_budget: usize,
    ) -> Self {
        Self {
            registry,
            metadata,
            agents,
            concurrency,
            attempts,
            conflict_budget,
        }
    }

    /// Start the background event loop. Failure events trigger targeted
    /// recovery; the interval tick sweeps for anything left at risk.
    pub fn spawn(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<NodeEvent>,
        mut shutdown: watch::Receiver<bool>,
        sweep_interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                "recovery engine started ({:?} sweep interval)",
                sweep_interval
            );
            let mut tick = tokio::time::interval(sweep_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tick.tick().await;

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(NodeEvent::Failed(node_id)) => {
                            if let Err(e) = self.handle_node_failure(&node_id).await {
                                tracing::error!("recovery for failed node {}: {}", node_id, e);
                            }
                        }
                        Some(NodeEvent::Rejoined(node_id)) => {
                            tracing::info!("node {} rejoined, capacity available again", node_id);
                        }
                        None => break,
                    },
                    _ = tick.tick() => {
                        if let Err(e) = self.sweep().await {
                            tracing::error!("at-risk sweep failed: {}", e);
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("recovery engine stopped");
                        break;
                    }
                }
            }
        })
    }

    /// React to a node failure: demote its synced placements to stale,
    /// then bring every affected chunk back to full replication.
    pub async fn handle_node_failure(&self, node_id: &str) -> Result<RecoveryReport> {
        let demoted = self.metadata.mark_node_stale(node_id)?;
        tracing::warn!(
            "node {} failed, {} placements demoted to stale",
            node_id,
            demoted
        );
        self.sweep().await
    }

    /// One pass over every at-risk chunk, with bounded concurrency
    pub async fn sweep(&self) -> Result<RecoveryReport> {
        let at_risk = self.metadata.list_at_risk()?;
        if at_risk.is_empty() {
            return Ok(RecoveryReport::default());
        }
        tracing::info!("recovering {} at-risk chunks", at_risk.len());

        let outcomes: Vec<ChunkOutcome> = stream::iter(at_risk.into_iter().map(|entry| {
            let chunk_id = entry.chunk.chunk_id.clone();
            async move {
                match self.recover_chunk(entry).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!("recovery of chunk {} failed: {}", chunk_id, e);
                        ChunkOutcome::Incomplete
                    }
                }
            }
        }))
        .buffer_unordered(self.concurrency.max(1))
        .collect()
        .await;

        let mut report = RecoveryReport::default();
        for outcome in outcomes {
            report.chunks_checked += 1;
            match outcome {
                ChunkOutcome::Converged => {}
                ChunkOutcome::Recovered { bytes } => {
                    report.chunks_recovered += 1;
                    report.bytes_copied += bytes;
                }
                ChunkOutcome::Lost => report.chunks_lost += 1,
                ChunkOutcome::Incomplete => report.chunks_incomplete += 1,
            }
        }

        tracing::info!(
            "recovery cycle: {} checked, {} recovered, {} lost, {} incomplete",
            report.chunks_checked,
            report.chunks_recovered,
            report.chunks_lost,
            report.chunks_incomplete
        );
        Ok(report)
    }

    async fn recover_chunk(&self, entry: AtRiskChunk) -> Result<ChunkOutcome> {
        let chunk = entry.chunk;

        // Re-read the current state: another cycle may already have
        // converged this chunk.
        let Some(file) = self.metadata.get_file(&chunk.file_id)? else {
            return Ok(ChunkOutcome::Converged);
        };
        let placements = self.metadata.placements_for_chunk(&chunk.chunk_id)?;
        let replication_factor = file.replication_factor as usize;

        let synced_healthy: Vec<Node> = placements
            .iter()
            .filter(|p| p.state == PlacementState::Synced)
            .filter_map(|p| self.registry.get(&p.node_id))
            .filter(|n| n.status.is_healthy())
            .collect();
        let stale: Vec<Placement> = placements
            .iter()
            .filter(|p| p.state == PlacementState::Stale)
            .cloned()
            .collect();

        if synced_healthy.len() >= replication_factor {
            self.cleanup_stale(&chunk, &stale).await;
            return Ok(ChunkOutcome::Converged);
        }

        if synced_healthy.is_empty() {
            // No surviving replica: the chunk is lost. Never fabricate
            // data; mark the owning file degraded and keep the stale
            // records as evidence of where the bytes were.
            tracing::error!(
                "chunk {} lost: no surviving synced replica",
                chunk.chunk_id
            );
            if file.status == FileStatus::Active {
                let metadata = &self.metadata;
                let file_id = chunk.file_id.clone();
                with_conflict_retry(self.conflict_budget, || {
                    let file_id = file_id.clone();
                    async move {
                        let current = metadata
                            .get_file(&file_id)?
                            .ok_or_else(|| crate::Error::NotFound(file_id.clone()))?;
                        metadata.set_file_status(&file_id, FileStatus::Degraded, current.version)
                    }
                })
                .await?;
            }
            return Ok(ChunkOutcome::Lost);
        }

        let need = replication_factor - synced_healthy.len();
        let holders: HashSet<String> = placements.iter().map(|p| p.node_id.clone()).collect();
        let candidates: Vec<Node> = self
            .registry
            .list_healthy()
            .into_iter()
            .filter(|n| !holders.contains(&n.node_id))
            .collect();

        let planner = Planner::new(file.strategy);
        let targets = match planner.select(&chunk, need, &candidates) {
            Ok(targets) => targets,
            Err(crate::Error::InsufficientNodes { needed, available }) => {
                tracing::warn!(
                    "chunk {} stays under-replicated: need {} nodes, {} available",
                    chunk.chunk_id,
                    needed,
                    available
                );
                return Ok(ChunkOutcome::Incomplete);
            }
            Err(e) => return Err(e),
        };

        let mut copied = 0u64;
        for target_id in targets {
            let Some(target) = self.registry.get(&target_id) else {
                continue;
            };

            let mut stored = false;
            for attempt in 0..self.attempts.max(1) {
                let source = &synced_healthy[attempt % synced_healthy.len()];
                match self.copy_replica(&chunk, source, &target).await {
                    Ok(bytes) => {
                        copied += bytes;
                        stored = true;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "copy of chunk {} from {} to {} failed (attempt {}): {}",
                            chunk.chunk_id,
                            source.node_id,
                            target.node_id,
                            attempt + 1,
                            e
                        );
                    }
                }
            }

            if !stored {
                tracing::warn!(
                    "{}",
                    crate::Error::RecoveryIncomplete {
                        chunk_id: chunk.chunk_id.clone(),
                        attempts: self.attempts,
                    }
                );
                return Ok(ChunkOutcome::Incomplete);
            }

            let metadata = &self.metadata;
            let chunk_id = chunk.chunk_id.clone();
            let node_id = target_id.clone();
            with_conflict_retry(self.conflict_budget, || {
                let (chunk_id, node_id, file_id) =
                    (chunk_id.clone(), node_id.clone(), chunk.file_id.clone());
                async move {
                    let current = metadata
                        .get_file(&file_id)?
                        .ok_or_else(|| crate::Error::NotFound(file_id.clone()))?;
                    metadata.update_placement(
                        &chunk_id,
                        &node_id,
                        PlacementState::Synced,
                        current.version,
                    )
                }
            })
            .await?;
            tracing::info!("chunk {} re-replicated to {}", chunk.chunk_id, target_id);
        }

        self.cleanup_stale(&chunk, &stale).await;
        Ok(ChunkOutcome::Recovered { bytes: copied })
    }

    /// Transfer one replica: fetch from the source, verify, push to the
    /// replacement. The agent re-verifies the checksum on store.
    async fn copy_replica(&self, chunk: &ChunkRecord, source: &Node, target: &Node) -> Result<u64> {
        let (data, _) = self.agents.retrieve_chunk(source, &chunk.chunk_id).await?;
        let actual = sha256_hex(&data);
        if actual != chunk.checksum {
            return Err(crate::Error::Integrity {
                index: chunk.index,
                expected: chunk.checksum.clone(),
                actual,
            });
        }

        let bytes = data.len() as u64;
        self.agents
            .store_chunk(target, &chunk.chunk_id, &chunk.checksum, data)
            .await?;
        Ok(bytes)
    }

    /// Drop stale placement records once the chunk is protected again.
    /// Blob deletion on the (usually dead) node is best-effort.
    async fn cleanup_stale(&self, chunk: &ChunkRecord, stale: &[Placement]) {
        for placement in stale {
            let metadata = &self.metadata;
            let result = with_conflict_retry(self.conflict_budget, || {
                let (chunk_id, node_id, file_id) = (
                    placement.chunk_id.clone(),
                    placement.node_id.clone(),
                    chunk.file_id.clone(),
                );
                async move {
                    let current = metadata
                        .get_file(&file_id)?
                        .ok_or_else(|| crate::Error::NotFound(file_id.clone()))?;
                    metadata.remove_placement(&chunk_id, &node_id, current.version)
                }
            })
            .await;
            if let Err(e) = result {
                tracing::warn!(
                    "stale placement ({}, {}) not removed: {}",
                    placement.chunk_id,
                    placement.node_id,
                    e
                );
                continue;
            }

            if let Some(node) = self.registry.get(&placement.node_id) {
                if node.status.is_healthy() {
                    if let Err(e) = self.agents.delete_chunk(&node, &placement.chunk_id).await {
                        tracing::debug!(
                            "stale blob delete on {} failed: {}",
                            placement.node_id,
                            e
                        );
                    }
                }
            }
        }
    }
}
