//! Error types for ThreatSieve
//!
//! Two layers:
//! - [`StoreError`]: failures of the authoritative indicator store
//! - [`SieveError`]: unified error for everything else, wrapping store errors

use std::time::Duration;

use thiserror::Error;

/// Result type alias using SieveError
pub type Result<T> = std::result::Result<T, SieveError>;

/// Result type alias for store adapter calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures reported by a [`Store`](crate::store::Store) implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Table-level damage (bad magic, checksum mismatch, truncated block)
    #[error("Store corruption detected: {0}")]
    Corruption(String),

    /// A single row could not be decoded; the rest of the store is readable
    #[error("Malformed row: {0}")]
    MalformedRow(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The caller's deadline passed before the store answered
    #[error("Store deadline exceeded after {0:?}")]
    Timeout(Duration),

    #[error("Record serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether the failure is confined to one row (skippable during a build)
    pub fn is_row_level(&self) -> bool {
        matches!(self, StoreError::MalformedRow(_))
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Unified error type for ThreatSieve operations
#[derive(Debug, Error)]
pub enum SieveError {
    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Index Build Errors
    // -------------------------------------------------------------------------
    /// Key enumeration failed partway; nothing was published
    #[error("Index build aborted after {inserted} keys: {source}")]
    Build {
        inserted: u64,
        #[source]
        source: StoreError,
    },

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Error message returned by a remote server
    #[error("Server error: {0}")]
    Remote(String),
}

impl From<bincode::Error> for SieveError {
    fn from(e: bincode::Error) -> Self {
        SieveError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for SieveError {
    fn from(e: serde_json::Error) -> Self {
        SieveError::Serialization(e.to_string())
    }
}
