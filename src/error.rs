//! Unified error handling for the location-history library.
//!
//! Store mutations never fail; these errors only come out of explicit
//! storage calls (`load`, `flush`, `open`) and day-key parsing.

use thiserror::Error;

/// Error type for location-history storage and parsing operations.
#[derive(Debug, Error)]
pub enum LocationHistoryError {
    /// Snapshot file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite backend failure
    #[cfg(feature = "persistence")]
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A day key that is not a valid `YYYY-MM-DD` calendar date
    #[error("Invalid day key '{key}': expected YYYY-MM-DD")]
    InvalidDayKey { key: String },

    /// Stored JSON that holds neither history nor settings
    #[error("Unrecognized history document: {message}")]
    UnrecognizedDocument { message: String },

    /// A queued snapshot could not be written
    #[error("Snapshot write failed: {message}")]
    WriteFailed { message: String },

    /// The background snapshot writer has shut down
    #[error("Snapshot writer unavailable: {message}")]
    WriterUnavailable { message: String },
}

/// Result type alias for location-history operations.
pub type Result<T> = std::result::Result<T, LocationHistoryError>;
