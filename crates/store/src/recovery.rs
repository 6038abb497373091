/// Open-time keydir reconstruction.
///
/// Segments are visited in ascending id order. For each one the index
/// sidecar is preferred; the `.log` is scanned only when the index is
/// missing, malformed, or disagrees with the log, and the scan result is
/// then authoritative, with the sidecars rewritten from it. Conflicts
/// across segments resolve by latest timestamp, then segment id, then
/// offset, so the outcome does not depend on traversal order.
use crate::{Event, EventSink, StoreError};
use keydir::{Keydir, KeydirBuilder, Location};
use segment::{IndexEntry, SegmentManager};

pub(crate) struct RecoveryOutcome {
    pub(crate) keydir: Keydir,
    /// Newest timestamp in the whole log history, tombstones included. The
    /// store's clock starts here so new writes always order after recovered
    /// ones, even if the wall clock regressed across the restart.
    pub(crate) max_timestamp_ms: u64,
}

pub(crate) fn rebuild_keydir(
    manager: &mut SegmentManager,
    sink: &dyn EventSink,
) -> Result<RecoveryOutcome, StoreError> {
    let mut builder = KeydirBuilder::new();
    let mut max_timestamp_ms = 0u64;

    for id in manager.segment_ids() {
        let (entries, fell_back) = segment_entries(manager, id)?;
        if fell_back {
            sink.emit(&Event::RecoveryFallbackScan { segment_id: id });
        }
        for entry in entries {
            max_timestamp_ms = max_timestamp_ms.max(entry.timestamp_ms);
            builder.observe(
                entry.key,
                Location {
                    segment_id: entry.segment_id,
                    offset: entry.offset,
                    size: entry.size,
                    timestamp_ms: entry.timestamp_ms,
                },
                entry.tombstone,
            );
        }
    }

    let keydir = builder.finish();
    sink.emit(&Event::RecoveryComplete {
        segments: manager.segment_count(),
        live_keys: keydir.len(),
    });

    Ok(RecoveryOutcome {
        keydir,
        max_timestamp_ms,
    })
}

/// Loads one segment's mutation history, preferring the index sidecar.
///
/// The boolean reports whether scan-based recovery was needed, either here
/// or earlier when the segment's metadata was rebuilt at open.
fn segment_entries(
    manager: &mut SegmentManager,
    id: u64,
) -> Result<(Vec<IndexEntry>, bool), StoreError> {
    let seg = manager.segment(id)?;
    let rebuilt_at_open = seg.recovered_by_scan();
    let log_len = seg.size();
    let record_count = seg.entries();
    let index_path = seg.index_file_path().to_path_buf();

    if let Some(entries) = segment::index::load(&index_path) {
        if plausible(&entries, id, log_len, record_count) {
            return Ok((entries, rebuilt_at_open));
        }
        tracing::warn!(segment = id, "index disagrees with log, rescanning");
    }

    let entries = manager.segment_mut(id)?.rebuild_index()?;
    Ok((entries, true))
}

/// Cheap consistency check: the index must describe exactly the records the
/// log holds, and every location must land inside the log.
fn plausible(entries: &[IndexEntry], id: u64, log_len: u64, record_count: u64) -> bool {
    entries.len() as u64 == record_count
        && entries
            .iter()
            .all(|e| e.segment_id == id && e.offset + u64::from(e.size) <= log_len)
}
