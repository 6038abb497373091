mod index_tests;
mod manager_tests;

use crate::SegmentConfig;

pub(crate) fn test_config() -> SegmentConfig {
    SegmentConfig {
        max_size: 64 * 1024,
        max_entries: 1024,
        fsync_on_append: false,
    }
}
