use std::collections::HashMap;

/// Location of the newest record for a key: which segment, where in its
/// `.log`, how many framed bytes, and the record's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub segment_id: u64,
    pub offset: u64,
    /// Framed record size (header + key + value).
    pub size: u32,
    pub timestamp_ms: u64,
}

impl Location {
    /// Global conflict-resolution ordering: latest timestamp wins, ties
    /// broken by larger segment id, then by larger offset. Total and
    /// independent of file-system traversal order.
    #[must_use]
    pub fn is_newer_than(&self, other: &Location) -> bool {
        (self.timestamp_ms, self.segment_id, self.offset)
            > (other.timestamp_ms, other.segment_id, other.offset)
    }
}

/// In-memory index mapping each live key to its newest record location.
#[derive(Debug, Default)]
pub struct Keydir {
    map: HashMap<String, Location>,
}

impl Keydir {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert or overwrite. The update is dropped when the existing entry is
    /// strictly newer, which only matters when records are observed out of
    /// order.
    pub fn put(&mut self, key: impl Into<String>, location: Location) {
        let key = key.into();
        match self.map.get(&key) {
            Some(existing) if existing.is_newer_than(&location) => {}
            _ => {
                self.map.insert(key, location);
            }
        }
    }

    /// Remove the entry. Idempotent; a missing key is a no-op.
    pub fn delete(&mut self, key: &str) {
        self.map.remove(key);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Location> {
        self.map.get(key)
    }

    /// Unordered snapshot of live keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Recovery-time accumulator.
///
/// Unlike [`Keydir`], the builder retains tombstone observations together
/// with their ordering key, so an older live record visited later (clock
/// regression across segments) cannot resurrect a deleted key. `finish`
/// drops the tombstones and yields the live-keys-only keydir.
#[derive(Debug, Default)]
pub struct KeydirBuilder {
    map: HashMap<String, Observation>,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    location: Location,
    tombstone: bool,
}

impl KeydirBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Apply one record observation under the conflict-resolution rule.
    pub fn observe(&mut self, key: impl Into<String>, location: Location, tombstone: bool) {
        let key = key.into();
        match self.map.get(&key) {
            Some(existing) if existing.location.is_newer_than(&location) => {}
            _ => {
                self.map.insert(
                    key,
                    Observation {
                        location,
                        tombstone,
                    },
                );
            }
        }
    }

    /// Drops tombstones and produces the keydir of live keys.
    #[must_use]
    pub fn finish(self) -> Keydir {
        let map = self
            .map
            .into_iter()
            .filter(|(_, obs)| !obs.tombstone)
            .map(|(key, obs)| (key, obs.location))
            .collect();
        Keydir { map }
    }
}
