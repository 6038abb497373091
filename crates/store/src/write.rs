/// Write path: `put()` and `delete()`.
///
/// Both validate before any side effect, stamp a per-run monotonic
/// timestamp under the write lock, append through the segment manager, and
/// update the keydir before releasing the lock. Events are emitted after
/// the lock is dropped.
use crate::{Event, Store, StoreError};
use keydir::Location;
use record::Record;
use segment::AppendOutcome;

impl Store {
    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// `InvalidKey` (empty), `OversizedKey`, `OversizedValue`, `Closed`, or
    /// an I/O failure from the underlying append.
    pub fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.check_key(key)?;
        if value.len() > self.opts.max_value_size {
            return Err(StoreError::OversizedValue {
                len: value.len(),
                max: self.opts.max_value_size,
            });
        }

        let outcome = {
            let mut inner = self.inner.write();
            if inner.closed {
                return Err(StoreError::Closed);
            }
            let timestamp_ms = inner.next_timestamp();
            let rec = Record::put(timestamp_ms, key, value.to_vec())?;
            let outcome = inner
                .manager
                .append(&rec)
                .map_err(StoreError::from_append)?;
            inner.keydir.put(
                key,
                Location {
                    segment_id: outcome.segment_id,
                    offset: outcome.offset,
                    size: rec.framed_len() as u32,
                    timestamp_ms,
                },
            );
            outcome
        };

        self.emit_rotation(&outcome);
        self.sink.emit(&Event::StorePut {
            key: key.to_string(),
            segment_id: outcome.segment_id,
            offset: outcome.offset,
        });
        Ok(())
    }

    /// Deletes `key` by appending a tombstone and dropping the keydir entry.
    ///
    /// A missing key is not an error: the tombstone is written anyway,
    /// which keeps the operation idempotent and recovery simple.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_key(key)?;

        let outcome = {
            let mut inner = self.inner.write();
            if inner.closed {
                return Err(StoreError::Closed);
            }
            let timestamp_ms = inner.next_timestamp();
            let rec = Record::tombstone(timestamp_ms, key)?;
            let outcome = inner
                .manager
                .append(&rec)
                .map_err(StoreError::from_append)?;
            inner.keydir.delete(key);
            outcome
        };

        self.emit_rotation(&outcome);
        self.sink.emit(&Event::StoreDelete {
            key: key.to_string(),
            segment_id: outcome.segment_id,
            offset: outcome.offset,
        });
        Ok(())
    }

    fn check_key(&self, key: &str) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey);
        }
        if key.len() > self.opts.max_key_size {
            return Err(StoreError::OversizedKey {
                len: key.len(),
                max: self.opts.max_key_size,
            });
        }
        Ok(())
    }

    fn emit_rotation(&self, outcome: &AppendOutcome) {
        if let Some(sealed_id) = outcome.rotated_from {
            self.sink.emit(&Event::SegmentRotate {
                sealed_id,
                new_id: outcome.segment_id,
            });
        }
    }
}
