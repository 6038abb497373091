/// Read path: `get()`.
///
/// The shared lock is held only long enough to clone the keydir location
/// and the segment's log path; the file read and decode happen with no lock
/// held, so readers never serialize behind each other's I/O.
use crate::{Event, Store, StoreError};

impl Store {
    /// Looks up `key`, returning its value if live.
    ///
    /// # Errors
    ///
    /// `Closed`, `KeydirStale` (the record on disk disagrees with the
    /// keydir, which is corruption; the store closes itself), or an I/O
    /// failure.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let plan = {
            let inner = self.inner.read();
            if inner.closed {
                return Err(StoreError::Closed);
            }
            match inner.keydir.get(key).copied() {
                None => None,
                Some(location) => {
                    let log_path = inner.manager.read_plan(location.segment_id)?;
                    Some((location, log_path))
                }
            }
        };

        let Some((location, log_path)) = plan else {
            self.sink.emit(&Event::StoreGet {
                key: key.to_string(),
                found: false,
            });
            return Ok(None);
        };

        let rec = segment::read_record_at(location.segment_id, &log_path, location.offset)?;

        if rec.timestamp_ms != location.timestamp_ms {
            self.poison();
            return Err(StoreError::KeydirStale {
                key: key.to_string(),
                segment_id: location.segment_id,
                offset: location.offset,
            });
        }

        // Tombstones are never indexed, so this cannot happen with a
        // matching timestamp; answer as a miss rather than resurrect bytes.
        if rec.tombstone {
            self.sink.emit(&Event::StoreGet {
                key: key.to_string(),
                found: false,
            });
            return Ok(None);
        }

        self.sink.emit(&Event::StoreGet {
            key: key.to_string(),
            found: true,
        });
        Ok(Some(rec.value))
    }
}
