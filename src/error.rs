//! Error types for atlasstore
//!
//! One error type for the facade and the engines underneath it. Callers match
//! on the variant to decide their own retry policy; nothing here retries.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for atlasstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------
    /// Expected outcome of `get` on an absent key
    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // Backend Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Failed to open engine for store '{name}': {reason}")]
    EngineOpen { name: String, reason: String },

    #[error("Store '{0}' is closed")]
    EngineClosed(String),

    // -------------------------------------------------------------------------
    // Engine Operation Errors
    // -------------------------------------------------------------------------
    #[error("Engine write failed: {0}")]
    EngineWrite(String),

    #[error("Engine read failed: {0}")]
    EngineRead(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL / Storage Errors (engine internals)
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Build an `EngineOpen` error for the named store
    pub fn engine_open(name: &str, reason: impl std::fmt::Display) -> Self {
        StoreError::EngineOpen {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Re-tag a low-level engine failure as a write failure.
    ///
    /// `NotFound`, `EngineClosed` and `Config` pass through untouched.
    pub fn into_write(self) -> Self {
        match self {
            e @ (StoreError::NotFound
            | StoreError::EngineClosed(_)
            | StoreError::Config(_)
            | StoreError::EngineWrite(_)) => e,
            other => StoreError::EngineWrite(other.to_string()),
        }
    }

    /// Re-tag a low-level engine failure as a read failure.
    pub fn into_read(self) -> Self {
        match self {
            e @ (StoreError::NotFound
            | StoreError::EngineClosed(_)
            | StoreError::Config(_)
            | StoreError::EngineRead(_)) => e,
            other => StoreError::EngineRead(other.to_string()),
        }
    }

    /// True for the expected "key absent" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
