//! Distribution planner: chooses which nodes hold each chunk's replicas
//!
//! Strategies are pure: given a chunk and a candidate list they return an
//! ordered replica set, so recovery can reuse the same strategy with the
//! current holders excluded.

use crate::common::{HashRing, Result};
use crate::coordinator::metadata::ChunkRecord;
use crate::coordinator::registry::Node;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Replica placement strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    RoundRobin,
    Hash,
    Random,
}

impl FromStr for PlacementStrategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "round_robin" | "round-robin" | "roundrobin" => Ok(PlacementStrategy::RoundRobin),
            "hash" => Ok(PlacementStrategy::Hash),
            "random" => Ok(PlacementStrategy::Random),
            other => Err(crate::Error::InvalidConfig(format!(
                "unknown placement strategy: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PlacementStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlacementStrategy::RoundRobin => write!(f, "round_robin"),
            PlacementStrategy::Hash => write!(f, "hash"),
            PlacementStrategy::Random => write!(f, "random"),
        }
    }
}

/// Plans replica placement over the currently healthy node set
pub struct Planner {
    strategy: PlacementStrategy,
}

impl Planner {
    pub fn new(strategy: PlacementStrategy) -> Self {
        Self { strategy }
    }

    /// Assign `replication_factor` distinct nodes to every chunk.
    pub fn plan(
        &self,
        chunks: &[ChunkRecord],
        replication_factor: usize,
        healthy: &[Node],
    ) -> Result<HashMap<String, Vec<String>>> {
        if healthy.len() < replication_factor {
            return Err(crate::Error::InsufficientNodes {
                needed: replication_factor,
                available: healthy.len(),
            });
        }

        let ids = sorted_ids(healthy);
        let ring = match self.strategy {
            PlacementStrategy::Hash => Some(HashRing::new(&ids)),
            _ => None,
        };

        let mut assignments = HashMap::with_capacity(chunks.len());
        for chunk in chunks {
            let replicas = match &ring {
                Some(ring) => ring.replicas(&chunk.chunk_id, replication_factor),
                None => self.pick(chunk, replication_factor, &ids),
            };
            assignments.insert(chunk.chunk_id.clone(), replicas);
        }

        Ok(assignments)
    }

    /// Select `need` nodes for a single chunk from an already-filtered
    /// candidate list. Recovery passes candidates with current holders
    /// excluded.
    pub fn select(
        &self,
        chunk: &ChunkRecord,
        need: usize,
        candidates: &[Node],
    ) -> Result<Vec<String>> {
        if candidates.len() < need {
            return Err(crate::Error::InsufficientNodes {
                needed: need,
                available: candidates.len(),
            });
        }

        let ids = sorted_ids(candidates);
        let replicas = match self.strategy {
            PlacementStrategy::Hash => HashRing::new(&ids).replicas(&chunk.chunk_id, need),
            _ => self.pick(chunk, need, &ids),
        };
        Ok(replicas)
    }

    fn pick(&self, chunk: &ChunkRecord, need: usize, ids: &[String]) -> Vec<String> {
        match self.strategy {
            PlacementStrategy::RoundRobin => {
                let start = chunk.index as usize % ids.len();
                (0..need)
                    .map(|offset| ids[(start + offset) % ids.len()].clone())
                    .collect()
            }
            PlacementStrategy::Random => {
                let mut rng = rand::thread_rng();
                rand::seq::index::sample(&mut rng, ids.len(), need)
                    .into_iter()
                    .map(|i| ids[i].clone())
                    .collect()
            }
            PlacementStrategy::Hash => unreachable!("hash strategy handled via ring"),
        }
    }
}

fn sorted_ids(nodes: &[Node]) -> Vec<String> {
    let mut ids: Vec<String> = nodes.iter().map(|n| n.node_id.clone()).collect();
    ids.sort();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::registry::NodeStatus;

    fn mock_node(id: &str) -> Node {
        Node {
            node_id: id.to_string(),
            address: format!("http://localhost/{}", id),
            status: NodeStatus::Healthy,
            last_heartbeat: 0,
            used_bytes: 0,
        }
    }

    fn mock_chunk(index: u32) -> ChunkRecord {
        ChunkRecord {
            chunk_id: format!("file-1-{:06}", index),
            file_id: "file-1".to_string(),
            index,
            size: 1024,
            checksum: "deadbeef".to_string(),
        }
    }

    fn nodes(n: usize) -> Vec<Node> {
        (0..n).map(|i| mock_node(&format!("node-{}", i))).collect()
    }

    #[test]
    fn test_round_robin_consecutive_offsets() {
        let planner = Planner::new(PlacementStrategy::RoundRobin);
        let chunks: Vec<ChunkRecord> = (0..3).map(mock_chunk).collect();

        let plan = planner.plan(&chunks, 2, &nodes(4)).unwrap();
        assert_eq!(
            plan[&chunks[0].chunk_id],
            vec!["node-0".to_string(), "node-1".to_string()]
        );
        assert_eq!(
            plan[&chunks[1].chunk_id],
            vec!["node-1".to_string(), "node-2".to_string()]
        );
        assert_eq!(
            plan[&chunks[2].chunk_id],
            vec!["node-2".to_string(), "node-3".to_string()]
        );
    }

    #[test]
    fn test_round_robin_wraps() {
        let planner = Planner::new(PlacementStrategy::RoundRobin);
        let chunks: Vec<ChunkRecord> = (0..4).map(mock_chunk).collect();

        let plan = planner.plan(&chunks, 2, &nodes(3)).unwrap();
        assert_eq!(
            plan[&chunks[2].chunk_id],
            vec!["node-2".to_string(), "node-0".to_string()]
        );
        assert_eq!(
            plan[&chunks[3].chunk_id],
            vec!["node-0".to_string(), "node-1".to_string()]
        );
    }

    #[test]
    fn test_insufficient_nodes() {
        let planner = Planner::new(PlacementStrategy::RoundRobin);
        let chunks = vec![mock_chunk(0)];
        let result = planner.plan(&chunks, 3, &nodes(2));
        assert!(matches!(
            result,
            Err(crate::Error::InsufficientNodes {
                needed: 3,
                available: 2
            })
        ));
    }

    #[test]
    fn test_hash_deterministic_and_distinct() {
        let planner = Planner::new(PlacementStrategy::Hash);
        let chunks: Vec<ChunkRecord> = (0..8).map(mock_chunk).collect();

        let first = planner.plan(&chunks, 3, &nodes(5)).unwrap();
        let second = planner.plan(&chunks, 3, &nodes(5)).unwrap();
        assert_eq!(first, second);

        for replicas in first.values() {
            assert_eq!(replicas.len(), 3);
            let mut dedup = replicas.clone();
            dedup.dedup();
            assert_eq!(dedup.len(), 3);
        }
    }

    #[test]
    fn test_random_distinct_replicas() {
        let planner = Planner::new(PlacementStrategy::Random);
        let chunks: Vec<ChunkRecord> = (0..16).map(mock_chunk).collect();

        let plan = planner.plan(&chunks, 3, &nodes(6)).unwrap();
        for replicas in plan.values() {
            assert_eq!(replicas.len(), 3);
            let mut sorted = replicas.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), 3);
        }
    }

    #[test]
    fn test_select_with_exclusion() {
        let planner = Planner::new(PlacementStrategy::RoundRobin);
        let chunk = mock_chunk(1);

        // Candidates already exclude the two current holders.
        let candidates = vec![mock_node("node-2"), mock_node("node-3")];
        let picked = planner.select(&chunk, 1, &candidates).unwrap();
        assert_eq!(picked.len(), 1);
        assert!(candidates.iter().any(|n| n.node_id == picked[0]));

        assert!(planner.select(&chunk, 3, &candidates).is_err());
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "round_robin".parse::<PlacementStrategy>().unwrap(),
            PlacementStrategy::RoundRobin
        );
        assert_eq!(
            "round-robin".parse::<PlacementStrategy>().unwrap(),
            PlacementStrategy::RoundRobin
        );
        assert_eq!(
            "hash".parse::<PlacementStrategy>().unwrap(),
            PlacementStrategy::Hash
        );
        assert_eq!(
            "random".parse::<PlacementStrategy>().unwrap(),
            PlacementStrategy::Random
        );
        assert!("raid0".parse::<PlacementStrategy>().is_err());
        assert_eq!(PlacementStrategy::Hash.to_string(), "hash");
    }
}
