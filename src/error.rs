// Crate-wide error type.
//
// `NotFound` is an expected branch (a way referencing a node outside the
// imported extract), everything else is a failure of the current operation.
// Decoders never turn a malformed buffer into empty data: they return
// `CorruptRecord`.

use thiserror::Error;

use crate::binary::varint::VarIntError;

/// Errors returned by caches, codecs and the reference index.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The requested ID is not cached.
    #[error("not found")]
    NotFound,

    /// A stored record could not be decoded.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// The key-value engine failed (disk full, permissions, ...).
    #[error("store error: {0}")]
    Store(#[from] rocksdb::Error),

    /// Filesystem error outside of the engine (cache directory handling).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cache configuration file could not be read or parsed.
    #[error("invalid cache config: {0}")]
    Config(String),

    /// A linear-import background writer failed.
    #[error("background write failed: {0}")]
    Background(String),
}

impl CacheError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptRecord(msg.into())
    }

    /// True for the expected "ID is not cached" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<VarIntError> for CacheError {
    fn from(e: VarIntError) -> Self {
        Self::CorruptRecord(e.to_string())
    }
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;
