use record::RecordError;
use segment::SegmentError;
use std::io;
use thiserror::Error;

/// Errors surfaced by the store's public operation surface.
///
/// Validation failures (`InvalidKey`, `OversizedKey`, `OversizedValue`,
/// `InvalidConfig`) are reported before any side effect. `KeydirStale` means
/// the in-memory index disagrees with the log; the store treats that as
/// corruption and shuts itself down.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Keys must carry at least one byte.
    #[error("key must not be empty")]
    InvalidKey,

    /// The key exceeds the configured maximum.
    #[error("key of {len} bytes exceeds the configured maximum of {max}")]
    OversizedKey { len: usize, max: usize },

    /// The value exceeds the configured maximum.
    #[error("value of {len} bytes exceeds the configured maximum of {max}")]
    OversizedValue { len: usize, max: usize },

    /// The framed record could not fit even an empty segment.
    #[error("record of {size} bytes cannot fit a {max}-byte segment")]
    OversizedRecord { size: u64, max: u64 },

    /// Rejected at `open` before touching the data directory.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Another store instance holds the data directory.
    #[error("data directory is locked by another store instance")]
    AlreadyLocked,

    /// The store was closed; reopen to resume.
    #[error("store is closed")]
    Closed,

    /// The keydir points at a record whose timestamp disagrees with the log.
    /// Fatal: the store closes itself so the process can restart and rebuild.
    #[error(
        "keydir entry for {key:?} disagrees with segment {segment_id} at offset {offset}"
    )]
    KeydirStale {
        key: String,
        segment_id: u64,
        offset: u64,
    },

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Segment(#[from] SegmentError),
}

impl StoreError {
    /// Lifts manager append errors, promoting the oversized case to the
    /// store-level kind.
    pub(crate) fn from_append(err: SegmentError) -> StoreError {
        match err {
            SegmentError::OversizedRecord { size, max } => {
                StoreError::OversizedRecord { size, max }
            }
            other => StoreError::Segment(other),
        }
    }
}
