//! # scatterfs
//!
//! Distributed file storage that scatters chunked, checksummed file
//! content across a fleet of independent storage nodes, tolerates a
//! bounded number of node failures without data loss, and reconstructs
//! files on demand.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               Coordinator                   │
//! │  - chunking + placement planning            │
//! │  - file/chunk/placement metadata (RocksDB)  │
//! │  - heartbeat monitor + recovery engine      │
//! └───────────┬─────────────────────────────────┘
//!             │ HTTP
//!   ┌─────────┴──────────┬──────────────┐
//!   │                    │              │
//! ┌─▼──────────┐   ┌─────▼──────┐   ┌───▼────────┐
//! │ Node 1     │   │ Node 2     │   │ Node 3     │
//! │ chunk blobs│   │ chunk blobs│   │ chunk blobs│
//! └────────────┘   └────────────┘   └────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start the coordinator
//! ```bash
//! scatterfs-coord serve --bind 0.0.0.0:5000 --db ./coord-data
//! ```
//!
//! ### Start a storage node
//! ```bash
//! scatterfs-node serve \
//!   --id node-1 \
//!   --bind 0.0.0.0:6000 \
//!   --data ./node-data \
//!   --coordinator http://localhost:5000
//! ```
//!
//! ### Use the CLI
//! ```bash
//! # Upload a file (3 MiB file, 1 MiB chunks, 2 replicas)
//! scatterfs upload ./data.bin --replication 2
//!
//! # Download it back
//! scatterfs download <file-id> --out ./out.bin
//!
//! # Operational commands
//! scatterfs status
//! scatterfs node-offline node-2
//! scatterfs node-online node-2
//! ```

pub mod agent;
pub mod common;
pub mod coordinator;

// Re-export commonly used types
pub use agent::NodeAgent;
pub use common::{Config, Error, Result};
pub use coordinator::{Coordinator, CoordinatorServer};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
