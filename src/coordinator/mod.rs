//! Coordinator implementation
//!
//! The coordinator is responsible for:
//! - Chunking and reassembly of file content
//! - Placement decisions (round-robin, hash ring, random)
//! - Write orchestration against node agents
//! - Liveness tracking and failure recovery
//! - Durable file/chunk/placement metadata

pub mod agent_client;
pub mod chunker;
pub mod heartbeat;
pub mod http;
pub mod metadata;
pub mod placement;
pub mod recovery;
pub mod registry;
pub mod server;

pub use server::{Coordinator, CoordinatorServer};
