//! Structured store events.
//!
//! The core reports what it does through a single injected callback; it
//! knows nothing of request ids, log formats, or transports. What happens
//! to an event is entirely the service layer's business, including dropping
//! it on the floor with [`NullSink`].

/// One structured event emitted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A `put` was appended and indexed.
    StorePut {
        key: String,
        segment_id: u64,
        offset: u64,
    },
    /// A `get` completed, hit or miss.
    StoreGet { key: String, found: bool },
    /// A `delete` appended its tombstone.
    StoreDelete {
        key: String,
        segment_id: u64,
        offset: u64,
    },
    /// The active segment was sealed and a successor created.
    SegmentRotate { sealed_id: u64, new_id: u64 },
    /// Open-time recovery finished rebuilding the keydir.
    RecoveryComplete { segments: usize, live_keys: usize },
    /// A segment's index was unusable and its log was scanned instead.
    RecoveryFallbackScan { segment_id: u64 },
}

/// Receives every [`Event`] the store emits.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Discards all events. The default sink for [`crate::Store::open`].
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &Event) {}
}
