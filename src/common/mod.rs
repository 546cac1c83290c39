//! Common utilities and types shared across scatterfs

pub mod config;
pub mod error;
pub mod hash;
pub mod utils;

pub use config::{AgentConfig, Config, CoordinatorConfig};
pub use error::{Error, Result};
pub use hash::{fanout_prefix, hash64, sha256_hex, ChecksumHasher, HashRing};
pub use utils::{
    encode_chunk_id, format_bytes, timestamp_now, timestamp_now_millis, with_conflict_retry,
};
