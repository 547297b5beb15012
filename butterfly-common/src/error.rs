//! Error types for the butterfly-map toolkit
//!
//! Library-level failures only. Query handlers never bubble these up to their
//! callers directly: they translate them into a [`ReplyStatus`](crate::ReplyStatus)
//! at the request boundary.

use thiserror::Error;

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for butterfly-map operations
#[derive(Debug, Error)]
pub enum Error {
    /// No map with this id is loaded (or present on disk when loading)
    #[error("map {0:09} is not loaded")]
    MapNotFound(u32),

    /// An item id that must resolve inside the map does not
    #[error("item 0x{item_id:08x} not found in map {map_id:09}")]
    ItemNotFound { map_id: u32, item_id: u32 },

    /// The map data violates one of its structural invariants.
    /// Treated as unrecoverable for that map: it must be regenerated.
    #[error("map {map_id:09} is corrupt: {reason}")]
    CorruptMap { map_id: u32, reason: String },

    /// Invalid configuration or parameters
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::CorruptMap`]
    pub fn corrupt(map_id: u32, reason: impl Into<String>) -> Self {
        Error::CorruptMap {
            map_id,
            reason: reason.into(),
        }
    }

    /// True for the recoverable "something is absent" family
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::MapNotFound(_) | Error::ItemNotFound { .. })
    }
}
