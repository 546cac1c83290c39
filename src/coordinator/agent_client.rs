//! HTTP client for the node agent RPC surface
//!
//! Every call carries the configured timeout; connection failures and
//! timeouts surface as `NodeUnreachable` so callers can fall back to
//! another replica instead of retrying the same node forever.

use crate::common::Result;
use crate::coordinator::registry::Node;
use bytes::Bytes;
use std::time::Duration;

/// Header carrying a chunk's SHA-256 on store and retrieve
pub const CHECKSUM_HEADER: &str = "x-chunk-checksum";

#[derive(Clone)]
pub struct AgentClient {
    http: reqwest::Client,
}

impl AgentClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Internal(format!("http client: {}", e)))?;
        Ok(Self { http })
    }

    /// Push chunk bytes to a node. The agent verifies the checksum
    /// before acknowledging.
    pub async fn store_chunk(
        &self,
        node: &Node,
        chunk_id: &str,
        checksum: &str,
        data: Bytes,
    ) -> Result<()> {
        let url = format!("{}/chunks/{}", node.address, chunk_id);
        let response = self
            .http
            .put(&url)
            .header(CHECKSUM_HEADER, checksum)
            .body(data)
            .send()
            .await
            .map_err(|e| unreachable_err(node, e))?;

        if !response.status().is_success() {
            return Err(crate::Error::NodeUnreachable {
                node_id: node.node_id.clone(),
                reason: format!("store returned {}", response.status()),
            });
        }
        Ok(())
    }

    /// Fetch chunk bytes and the checksum the node computed for them
    pub async fn retrieve_chunk(&self, node: &Node, chunk_id: &str) -> Result<(Bytes, String)> {
        let url = format!("{}/chunks/{}", node.address, chunk_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| unreachable_err(node, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(crate::Error::NotFound(format!(
                "chunk {} on node {}",
                chunk_id, node.node_id
            )));
        }
        if !response.status().is_success() {
            return Err(crate::Error::NodeUnreachable {
                node_id: node.node_id.clone(),
                reason: format!("retrieve returned {}", response.status()),
            });
        }

        let checksum = response
            .headers()
            .get(CHECKSUM_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let data = response.bytes().await.map_err(|e| unreachable_err(node, e))?;
        Ok((data, checksum))
    }

    /// Delete a chunk blob; missing blobs are not an error
    pub async fn delete_chunk(&self, node: &Node, chunk_id: &str) -> Result<()> {
        let url = format!("{}/chunks/{}", node.address, chunk_id);
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| unreachable_err(node, e))?;

        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(crate::Error::NodeUnreachable {
                node_id: node.node_id.clone(),
                reason: format!("delete returned {}", response.status()),
            });
        }
        Ok(())
    }

    /// Liveness probe
    pub async fn health(&self, node: &Node) -> Result<()> {
        let url = format!("{}/health", node.address);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| unreachable_err(node, e))?;

        if !response.status().is_success() {
            return Err(crate::Error::NodeUnreachable {
                node_id: node.node_id.clone(),
                reason: format!("health returned {}", response.status()),
            });
        }
        Ok(())
    }
}

fn unreachable_err(node: &Node, e: reqwest::Error) -> crate::Error {
    crate::Error::NodeUnreachable {
        node_id: node.node_id.clone(),
        reason: e.to_string(),
    }
}
