//! Utility functions for scatterfs

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

/// Percent-encoding set for chunk ids used as file names
const CHUNK_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'\\')
    .add(b'%')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&');

/// Encode a chunk id for filesystem usage
pub fn encode_chunk_id(chunk_id: &str) -> String {
    utf8_percent_encode(chunk_id, CHUNK_ENCODE_SET).to_string()
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

/// Get current Unix timestamp (seconds)
pub fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Get current Unix timestamp (milliseconds)
pub fn timestamp_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Retry a versioned metadata write that may lose an optimistic-concurrency
/// race. The closure re-reads the current version on every attempt; only
/// `Error::MetadataConflict` is retried, anything else propagates.
pub async fn with_conflict_retry<F, Fut, T>(budget: usize, mut f: F) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let mut last = None;
    for attempt in 0..budget.max(1) {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e @ crate::Error::MetadataConflict { .. }) => {
                tracing::debug!("versioned write lost race (attempt {}): {}", attempt + 1, e);
                last = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last.unwrap_or_else(|| crate::Error::Internal("retry budget exhausted".into())))
}
