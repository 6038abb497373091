use crate::{Event, EventSink, StoreOptions};
use parking_lot::Mutex;
use std::sync::Arc;

/// Options sized so a handful of writes exercises rotation. The key and
/// value caps shrink with the segment so the set still validates.
pub(crate) fn tiny_opts() -> StoreOptions {
    StoreOptions {
        max_entries_per_segment: 3,
        max_segment_size: 4096,
        max_key_size: 64,
        max_value_size: 1024,
        ..StoreOptions::default()
    }
}

/// Sink that records every event for later assertions.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Arc<RecordingSink> {
        Arc::new(RecordingSink::default())
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}
