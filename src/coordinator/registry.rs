//! Node registry: process-wide table of known storage nodes
//!
//! Populated by agent self-registration (or administrative seeding) and
//! torn down with the coordinator. Every status transition, whether the
//! heartbeat monitor detected it or an operator forced it, runs through
//! the same path and emits at most one event per episode.

use crate::common::{timestamp_now_millis, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc::UnboundedSender;

/// Node liveness state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Healthy,
    Suspected,
    Failed,
}

impl NodeStatus {
    /// Is this node usable for placements and reads?
    pub fn is_healthy(&self) -> bool {
        matches!(self, NodeStatus::Healthy)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Healthy => write!(f, "healthy"),
            NodeStatus::Suspected => write!(f, "suspected"),
            NodeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A registered storage node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub address: String,
    pub status: NodeStatus,
    /// Unix millis of the last received heartbeat
    pub last_heartbeat: u64,
    pub used_bytes: u64,
}

/// Liveness events consumed by the recovery engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Failed(String),
    Rejoined(String),
}

/// In-memory node table. Rebuilt from agent re-registration after a
/// coordinator restart; never persisted.
pub struct NodeRegistry {
    nodes: RwLock<HashMap<String, Node>>,
    events: UnboundedSender<NodeEvent>,
}

impl NodeRegistry {
    pub fn new(events: UnboundedSender<NodeEvent>) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Register a node or refresh its address. A re-registering failed
    /// node comes back healthy, as if a heartbeat arrived.
    pub fn register(&self, node_id: &str, address: &str) {
        let mut nodes = self.nodes.write().unwrap();
        match nodes.get_mut(node_id) {
            Some(node) => {
                node.address = address.to_string();
                node.last_heartbeat = timestamp_now_millis();
                let previous = node.status;
                node.status = NodeStatus::Healthy;
                drop(nodes);
                if previous == NodeStatus::Failed {
                    let _ = self.events.send(NodeEvent::Rejoined(node_id.to_string()));
                }
                tracing::info!("node {} re-registered at {}", node_id, address);
            }
            None => {
                nodes.insert(
                    node_id.to_string(),
                    Node {
                        node_id: node_id.to_string(),
                        address: address.to_string(),
                        status: NodeStatus::Healthy,
                        last_heartbeat: timestamp_now_millis(),
                        used_bytes: 0,
                    },
                );
                drop(nodes);
                tracing::info!("node {} registered at {}", node_id, address);
            }
        }
    }

    /// Record a heartbeat. A failed node rejoins directly as healthy.
    pub fn record_heartbeat(&self, node_id: &str, used_bytes: u64) -> Result<()> {
        let mut nodes = self.nodes.write().unwrap();
        let node = nodes
            .get_mut(node_id)
            .ok_or_else(|| crate::Error::NotFound(format!("node {}", node_id)))?;

        node.last_heartbeat = timestamp_now_millis();
        node.used_bytes = used_bytes;
        let previous = node.status;
        node.status = NodeStatus::Healthy;
        drop(nodes);

        if previous == NodeStatus::Failed {
            tracing::info!("node {} rejoined", node_id);
            let _ = self.events.send(NodeEvent::Rejoined(node_id.to_string()));
        }
        Ok(())
    }

    /// Set a node's status. Transitions are linearized per node under the
    /// table lock; entering `Failed` emits `NodeFailed` exactly once per
    /// episode, leaving it for `Healthy` emits `NodeRejoined`.
    pub fn set_status(&self, node_id: &str, status: NodeStatus) -> Result<()> {
        let mut nodes = self.nodes.write().unwrap();
        let node = nodes
            .get_mut(node_id)
            .ok_or_else(|| crate::Error::NotFound(format!("node {}", node_id)))?;

        let previous = node.status;
        if previous == status {
            return Ok(());
        }
        node.status = status;
        if status == NodeStatus::Healthy {
            // Keep the monitor from immediately re-suspecting a node an
            // operator just brought back.
            node.last_heartbeat = timestamp_now_millis();
        }
        drop(nodes);

        tracing::info!("node {} status {} -> {}", node_id, previous, status);
        match (previous, status) {
            (_, NodeStatus::Failed) => {
                let _ = self.events.send(NodeEvent::Failed(node_id.to_string()));
            }
            (NodeStatus::Failed, NodeStatus::Healthy) => {
                let _ = self.events.send(NodeEvent::Rejoined(node_id.to_string()));
            }
            _ => {}
        }
        Ok(())
    }

    /// Administrative override: force a node offline
    pub fn mark_offline(&self, node_id: &str) -> Result<()> {
        self.set_status(node_id, NodeStatus::Failed)
    }

    /// Administrative override: force a node back online
    pub fn mark_online(&self, node_id: &str) -> Result<()> {
        self.set_status(node_id, NodeStatus::Healthy)
    }

    pub fn get(&self, node_id: &str) -> Option<Node> {
        self.nodes.read().unwrap().get(node_id).cloned()
    }

    /// All healthy nodes, sorted by node id
    pub fn list_healthy(&self) -> Vec<Node> {
        let mut healthy: Vec<Node> = self
            .nodes
            .read()
            .unwrap()
            .values()
            .filter(|n| n.status.is_healthy())
            .cloned()
            .collect();
        healthy.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        healthy
    }

    /// Every known node, sorted by node id
    pub fn list_all(&self) -> Vec<Node> {
        let mut all: Vec<Node> = self.nodes.read().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        all
    }

    pub fn len(&self) -> usize {
        self.nodes.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().unwrap().is_empty()
    }

    #[cfg(test)]
    pub(crate) fn backdate_heartbeat(&self, node_id: &str, millis_ago: u64) {
        let mut nodes = self.nodes.write().unwrap();
        if let Some(node) = nodes.get_mut(node_id) {
            node.last_heartbeat = timestamp_now_millis().saturating_sub(millis_ago);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn registry() -> (NodeRegistry, mpsc::UnboundedReceiver<NodeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (NodeRegistry::new(tx), rx)
    }

    #[test]
    fn test_register_and_list() {
        let (reg, _rx) = registry();
        reg.register("node-b", "http://localhost:6001");
        reg.register("node-a", "http://localhost:6000");

        let healthy = reg.list_healthy();
        assert_eq!(healthy.len(), 2);
        assert_eq!(healthy[0].node_id, "node-a");
        assert_eq!(healthy[1].node_id, "node-b");
    }

    #[test]
    fn test_failed_event_once_per_episode() {
        let (reg, mut rx) = registry();
        reg.register("node-a", "http://localhost:6000");

        reg.mark_offline("node-a").unwrap();
        reg.mark_offline("node-a").unwrap();

        assert_eq!(rx.try_recv().unwrap(), NodeEvent::Failed("node-a".into()));
        assert!(rx.try_recv().is_err());
        assert!(reg.list_healthy().is_empty());
    }

    #[test]
    fn test_rejoin_event() {
        let (reg, mut rx) = registry();
        reg.register("node-a", "http://localhost:6000");
        reg.mark_offline("node-a").unwrap();
        assert_eq!(rx.try_recv().unwrap(), NodeEvent::Failed("node-a".into()));

        reg.record_heartbeat("node-a", 42).unwrap();
        assert_eq!(rx.try_recv().unwrap(), NodeEvent::Rejoined("node-a".into()));
        assert_eq!(reg.get("node-a").unwrap().used_bytes, 42);
        assert!(reg.get("node-a").unwrap().status.is_healthy());
    }

    #[test]
    fn test_suspected_to_healthy_is_silent() {
        let (reg, mut rx) = registry();
        reg.register("node-a", "http://localhost:6000");
        reg.set_status("node-a", NodeStatus::Suspected).unwrap();
        reg.record_heartbeat("node-a", 0).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_heartbeat_for_unknown_node() {
        let (reg, _rx) = registry();
        assert!(matches!(
            reg.record_heartbeat("ghost", 0),
            Err(crate::Error::NotFound(_))
        ));
    }

    #[test]
    fn test_reregistration_revives_failed_node() {
        let (reg, mut rx) = registry();
        reg.register("node-a", "http://localhost:6000");
        reg.mark_offline("node-a").unwrap();
        let _ = rx.try_recv();

        reg.register("node-a", "http://localhost:7000");
        assert_eq!(rx.try_recv().unwrap(), NodeEvent::Rejoined("node-a".into()));
        assert_eq!(reg.get("node-a").unwrap().address, "http://localhost:7000");
    }
}
