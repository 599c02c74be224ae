// Graph persistence - versioned snapshot cache

pub mod cache;
pub mod snapshot;

use cellgraph_engine::error::GraphError;
use thiserror::Error;

/// Snapshot format version
/// Increment when the schema changes in a way that old versions can't read
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Errors surfaced by snapshot persistence and restore.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The snapshot on disk was written by a different format version.
    /// Callers treat this as "rebuild", not as a failure.
    #[error("snapshot format version {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    /// A restored handle points at something the live source no longer has.
    #[error("stale reference: {0}")]
    StaleReference(String),

    #[error(transparent)]
    Build(#[from] GraphError),
}
