//! Error taxonomy for the keywarden engine
//!
//! Scan-time per-item errors (permission denied, transient I/O) never reach
//! this enum; detectors swallow them and skip the item. Everything surfaced
//! to a caller goes through `WardenError` so the catalog-update decision can
//! be made on the error kind.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Invalid passphrase")]
    InvalidPassphrase,

    #[error("Plaintext and encrypted forms both exist: {0}")]
    Conflict(PathBuf),

    #[error("Another transition is already running on: {0}")]
    Busy(PathBuf),

    #[error("Catalog is empty, nothing to back up")]
    EmptyCatalog,

    /// Cleanup after a failed transition itself failed. The primary error is
    /// carried as the source and stays visible; the cleanup failure never
    /// replaces it.
    #[error("Rollback failed: {cleanup} (after: {source})")]
    Rollback {
        source: Box<WardenError>,
        cleanup: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WardenError {
    /// The primary error of a transition, unwrapping a rollback wrapper.
    pub fn primary(&self) -> &WardenError {
        match self {
            WardenError::Rollback { source, .. } => source.primary(),
            other => other,
        }
    }
}
