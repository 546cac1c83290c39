//! Error types for scatterfs

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Integrity Errors ===
    #[error("Integrity failure on chunk {index}: expected {expected}, got {actual}")]
    Integrity {
        index: u32,
        expected: String,
        actual: String,
    },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    // === Placement Errors ===
    #[error("Insufficient nodes: need {needed}, have {available}")]
    InsufficientNodes { needed: usize, available: usize },

    // === Availability Errors ===
    #[error("File {file_id} unavailable: all replicas of chunk {chunk_index} exhausted")]
    FileUnavailable { file_id: String, chunk_index: u32 },

    #[error("Node {node_id} unreachable: {reason}")]
    NodeUnreachable { node_id: String, reason: String },

    // === Metadata Errors ===
    #[error("Metadata conflict on file {file_id}: stale version")]
    MetadataConflict { file_id: String },

    #[error("Duplicate file: {0}")]
    DuplicateFile(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Metadata corrupted: {0}")]
    MetadataCorrupted(String),

    // === Recovery Errors ===
    #[error("Recovery incomplete for chunk {chunk_id} after {attempts} attempts")]
    RecoveryIncomplete { chunk_id: String, attempts: usize },

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::Http(_)
                | Error::NodeUnreachable { .. }
                | Error::MetadataConflict { .. }
        )
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::DuplicateFile(_) | Error::MetadataConflict { .. } => StatusCode::CONFLICT,
            Error::InvalidConfig(_) | Error::ChecksumMismatch { .. } => StatusCode::BAD_REQUEST,
            Error::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Error::InsufficientNodes { .. } | Error::FileUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::NodeUnreachable { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Internal(e.to_string())
    }
}
