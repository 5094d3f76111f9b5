//! Error taxonomy for the storage layer and the playback engine.
//!
//! Store failures surface as explicit `StoreError` outcomes to the caller;
//! repositories catch them, record a human-readable error string, and keep
//! their last consistent cache. Nothing here is fatal to the process.

use thiserror::Error;

/// Failures surfaced by the record store provider.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert attempted with an id that already exists in the collection.
    #[error("record '{0}' already exists")]
    DuplicateKey(String),
    /// Query referenced a secondary index that was never declared for the
    /// collection. Programmer error, not a runtime condition.
    #[error("unknown index '{index}' on collection '{collection}'")]
    UnknownIndex { collection: String, index: String },
    /// The underlying store failed or refused the operation (I/O, quota,
    /// schema-version mismatch).
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A persisted record could not be encoded or decoded.
    #[error("corrupt record in collection '{collection}': {source}")]
    Corrupt {
        collection: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Failures surfaced by the playback engine and media backends.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Playback was requested for a track without an audio payload.
    #[error("track '{0}' has no playable payload")]
    NoPlayableSource(String),
    /// The media backend failed to open or decode the payload.
    #[error("media resource error: {0}")]
    MediaResource(String),
}
