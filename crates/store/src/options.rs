use crate::StoreError;
use segment::SegmentConfig;
use std::time::Duration;

/// Tunables consumed once at [`crate::Store::open`].
///
/// Every combination is validated up front; an invalid set fails with
/// [`StoreError::InvalidConfig`] before the data directory is touched.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Run the background flusher that periodically fsyncs the active
    /// segment's files and persists its hint.
    pub sync: bool,

    /// How often the background flusher fires.
    pub fsync_interval: Duration,

    /// fsync the `.log` after every single append. Safest and slowest; the
    /// default trades the last `fsync_interval` of writes for throughput.
    pub fsync_on_append: bool,

    /// Hard upper bound on a segment's `.log` bytes before rotation.
    pub max_segment_size: u64,

    /// Hard upper bound on records per segment before rotation.
    pub max_entries_per_segment: u64,

    /// Maximum key length accepted by `put`/`delete`. Cannot exceed the
    /// 1024-byte format bound.
    pub max_key_size: usize,

    /// Maximum value length accepted by `put`.
    pub max_value_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            sync: false,
            fsync_interval: Duration::from_secs(5),
            fsync_on_append: false,
            max_segment_size: 10 * 1024 * 1024,
            max_entries_per_segment: 1000,
            max_key_size: record::MAX_KEY_SIZE,
            max_value_size: 1024 * 1024,
        }
    }
}

impl StoreOptions {
    /// Checks the option set for internal consistency.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.max_key_size == 0 {
            return Err(StoreError::InvalidConfig(
                "max_key_size must be at least 1".into(),
            ));
        }
        if self.max_key_size > record::MAX_KEY_SIZE {
            return Err(StoreError::InvalidConfig(format!(
                "max_key_size {} exceeds the {}-byte format bound",
                self.max_key_size,
                record::MAX_KEY_SIZE
            )));
        }
        if self.max_value_size > u32::MAX as usize {
            return Err(StoreError::InvalidConfig(
                "max_value_size does not fit the 32-bit size field".into(),
            ));
        }
        if self.max_entries_per_segment == 0 {
            return Err(StoreError::InvalidConfig(
                "max_entries_per_segment must be at least 1".into(),
            ));
        }
        let max_record = record::framed_size(self.max_key_size, self.max_value_size) as u64;
        if max_record > self.max_segment_size {
            return Err(StoreError::InvalidConfig(format!(
                "a maximal record ({max_record} bytes) cannot fit a segment of {} bytes",
                self.max_segment_size
            )));
        }
        if self.sync && self.fsync_interval.is_zero() {
            return Err(StoreError::InvalidConfig(
                "fsync_interval must be nonzero when sync is enabled".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn segment_config(&self) -> SegmentConfig {
        SegmentConfig {
            max_size: self.max_segment_size,
            max_entries: self.max_entries_per_segment,
            fsync_on_append: self.fsync_on_append,
        }
    }
}
