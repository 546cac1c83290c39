//! Hashing utilities for scatterfs
//!
//! - SHA-256 for chunk and whole-file checksums
//! - Ring placement hashing for the hash distribution strategy

use sha2::{Digest, Sha256};

/// Compute SHA-256 of data, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(digest)
}

/// Compute SHA-256 incrementally (for streaming)
pub struct ChecksumHasher {
    hasher: Sha256,
}

impl ChecksumHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl Default for ChecksumHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a u64 ring position from an identifier
pub fn hash64(id: &str) -> u64 {
    let digest = Sha256::digest(id.as_bytes());
    u64::from_le_bytes(digest[0..8].try_into().unwrap())
}

/// Compute the two-level directory fan-out prefix for a chunk id
///
/// Returns (aa, bb) from the first two bytes of SHA-256(chunk_id). This
/// keeps any single directory on a node agent from growing unbounded:
/// chunks/aa/bb/chunk_id
pub fn fanout_prefix(chunk_id: &str) -> (String, String) {
    let digest = Sha256::digest(chunk_id.as_bytes());
    (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
}

/// Consistent hash ring for the hash placement strategy
///
/// Each node contributes one point at `hash64(node_id)`. A chunk's primary
/// is the first point clockwise from `hash64(chunk_id)`; replicas are the
/// next distinct nodes on the ring. Adding or removing a node only
/// reassigns chunks adjacent to its point.
pub struct HashRing {
    points: Vec<(u64, String)>,
}

impl HashRing {
    pub fn new(node_ids: &[String]) -> Self {
        let mut points: Vec<(u64, String)> = node_ids
            .iter()
            .map(|id| (hash64(id), id.clone()))
            .collect();
        points.sort();
        Self { points }
    }

    /// Select up to `n` distinct nodes clockwise from the chunk's position
    pub fn replicas(&self, chunk_id: &str, n: usize) -> Vec<String> {
        if self.points.is_empty() {
            return Vec::new();
        }

        let position = hash64(chunk_id);
        let start = self
            .points
            .partition_point(|(point, _)| *point < position);

        let mut selected = Vec::with_capacity(n);
        for offset in 0..self.points.len() {
            let (_, node) = &self.points[(start + offset) % self.points.len()];
            if !selected.contains(node) {
                selected.push(node.clone());
            }
            if selected.len() == n {
                break;
            }
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        let hash = sha256_hex(b"hello world");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_checksum_hasher_matches_oneshot() {
        let mut hasher = ChecksumHasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), sha256_hex(b"hello world"));
    }

    #[test]
    fn test_hash64_deterministic() {
        assert_eq!(hash64("node-1"), hash64("node-1"));
        assert_ne!(hash64("node-1"), hash64("node-2"));
    }

    #[test]
    fn test_ring_deterministic() {
        let nodes = vec![
            "node-1".to_string(),
            "node-2".to_string(),
            "node-3".to_string(),
            "node-4".to_string(),
        ];
        let ring = HashRing::new(&nodes);

        let first = ring.replicas("chunk-a", 2);
        let second = ring.replicas("chunk-a", 2);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_ne!(first[0], first[1]);
    }

    #[test]
    fn test_ring_caps_at_node_count() {
        let nodes = vec!["node-1".to_string(), "node-2".to_string()];
        let ring = HashRing::new(&nodes);
        assert_eq!(ring.replicas("chunk-a", 5).len(), 2);
    }

    #[test]
    fn test_ring_removal_only_moves_adjacent_chunks() {
        let nodes: Vec<String> = (0..8).map(|i| format!("node-{}", i)).collect();
        let full = HashRing::new(&nodes);

        let removed = "node-3".to_string();
        let remaining: Vec<String> =
            nodes.iter().filter(|n| **n != removed).cloned().collect();
        let reduced = HashRing::new(&remaining);

        // Every chunk whose primary was not the removed node keeps its primary.
        for i in 0..64 {
            let chunk = format!("chunk-{}", i);
            let before = full.replicas(&chunk, 1);
            if before[0] != removed {
                assert_eq!(reduced.replicas(&chunk, 1), before);
            }
        }
    }
}
