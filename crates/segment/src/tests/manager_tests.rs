use super::test_config;
use crate::{SegmentConfig, SegmentError, SegmentManager};
use anyhow::Result;
use record::Record;
use tempfile::tempdir;

fn put(ts: u64, key: &str, value: &[u8]) -> Record {
    Record::put(ts, key, value.to_vec()).unwrap()
}

// -------------------- Open --------------------

#[test]
fn open_empty_dir_creates_segment_zero() -> Result<()> {
    let dir = tempdir()?;
    let manager = SegmentManager::open(dir.path(), test_config())?;

    assert_eq!(manager.active_id(), 0);
    assert_eq!(manager.segment_count(), 1);
    assert!(dir.path().join("segment_0.log").exists());
    Ok(())
}

#[test]
fn reopen_reactivates_highest_when_below_thresholds() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut manager = SegmentManager::open(dir.path(), test_config())?;
        manager.append(&put(1, "a", b"1"))?;
        manager.close()?;
    }

    let mut manager = SegmentManager::open(dir.path(), test_config())?;
    assert_eq!(manager.active_id(), 0);
    assert_eq!(manager.segment_count(), 1);

    // appends continue where the log left off
    let outcome = manager.append(&put(2, "b", b"2"))?;
    assert_eq!(outcome.segment_id, 0);
    assert!(outcome.offset > 0);
    Ok(())
}

#[test]
fn reopen_seals_full_highest_and_starts_successor() -> Result<()> {
    let dir = tempdir()?;
    let cfg = SegmentConfig {
        max_entries: 2,
        ..test_config()
    };
    {
        let mut manager = SegmentManager::open(dir.path(), cfg)?;
        manager.append(&put(1, "a", b"1"))?;
        manager.append(&put(2, "b", b"2"))?;
        manager.close()?;
    }

    let manager = SegmentManager::open(dir.path(), cfg)?;
    assert_eq!(manager.active_id(), 1);
    assert_eq!(manager.segment_count(), 2);
    assert!(!manager.segment(0)?.is_active());
    assert!(manager.segment(1)?.is_active());
    Ok(())
}

#[test]
fn reopen_after_crash_seals_stale_active_segments() -> Result<()> {
    // a hard stop leaves the active segment's hint claiming active=1
    let dir = tempdir()?;
    let cfg = SegmentConfig {
        max_entries: 1,
        ..test_config()
    };
    {
        let mut manager = SegmentManager::open(dir.path(), cfg)?;
        manager.append(&put(1, "a", b"1"))?; // fills segment 0
        manager.append(&put(2, "b", b"2"))?; // rotates, fills segment 1
        // dropped without close: nothing sealed
    }

    let manager = SegmentManager::open(dir.path(), cfg)?;
    // both discovered segments are full, so a fresh one was created
    assert_eq!(manager.active_id(), 2);
    for id in [0u64, 1] {
        assert!(manager.segment(id)?.hint().closed);
        assert!(!manager.segment(id)?.is_active());
    }
    Ok(())
}

// -------------------- Rotation --------------------

#[test]
fn rotates_on_entry_threshold() -> Result<()> {
    let dir = tempdir()?;
    let cfg = SegmentConfig {
        max_entries: 3,
        ..test_config()
    };
    let mut manager = SegmentManager::open(dir.path(), cfg)?;

    for (i, key) in ["k1", "k2", "k3"].iter().enumerate() {
        let outcome = manager.append(&put(i as u64 + 1, key, b"v"))?;
        assert_eq!(outcome.segment_id, 0);
        assert!(outcome.rotated_from.is_none());
    }

    let outcome = manager.append(&put(4, "k4", b"v4"))?;
    assert_eq!(outcome.segment_id, 1);
    assert_eq!(outcome.offset, 0);
    assert_eq!(outcome.rotated_from, Some(0));

    assert_eq!(manager.segment_count(), 2);
    assert!(manager.segment(0)?.hint().closed);
    assert_eq!(manager.read(1, 0)?.key, "k4");
    Ok(())
}

#[test]
fn rotates_on_size_threshold() -> Result<()> {
    let dir = tempdir()?;
    let rec = put(1, "k", b"0123456789abcdef");
    let cfg = SegmentConfig {
        max_size: rec.framed_len() as u64 + 4,
        ..test_config()
    };
    let mut manager = SegmentManager::open(dir.path(), cfg)?;

    manager.append(&rec)?;
    let outcome = manager.append(&rec)?;
    assert_eq!(outcome.segment_id, 1);
    assert_eq!(outcome.rotated_from, Some(0));

    // no segment log exceeds the configured bound
    for segment in manager.segments() {
        assert!(segment.size() <= cfg.max_size);
    }
    Ok(())
}

#[test]
fn segment_ids_stay_dense_across_rotations() -> Result<()> {
    let dir = tempdir()?;
    let cfg = SegmentConfig {
        max_entries: 1,
        ..test_config()
    };
    let mut manager = SegmentManager::open(dir.path(), cfg)?;
    for i in 0..5u64 {
        manager.append(&put(i + 1, &format!("k{i}"), b"v"))?;
    }

    let ids = manager.segment_ids();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    assert_eq!(manager.active_id(), 4);
    Ok(())
}

// -------------------- Oversized records --------------------

#[test]
fn oversized_record_is_rejected_without_rotating() -> Result<()> {
    let dir = tempdir()?;
    let cfg = SegmentConfig {
        max_size: 64,
        ..test_config()
    };
    let mut manager = SegmentManager::open(dir.path(), cfg)?;

    let big = put(1, "k", &vec![b'x'; 128]);
    let err = manager.append(&big).unwrap_err();
    assert!(matches!(err, SegmentError::OversizedRecord { .. }));
    assert_eq!(manager.segment_count(), 1);
    Ok(())
}

#[test]
fn record_filling_a_whole_segment_is_accepted() -> Result<()> {
    let dir = tempdir()?;
    let rec = put(1, "k", b"exactly");
    let cfg = SegmentConfig {
        max_size: rec.framed_len() as u64,
        ..test_config()
    };
    let mut manager = SegmentManager::open(dir.path(), cfg)?;

    let outcome = manager.append(&rec)?;
    assert_eq!(outcome.offset, 0);
    Ok(())
}

// -------------------- Read routing --------------------

#[test]
fn reads_route_to_sealed_segments() -> Result<()> {
    let dir = tempdir()?;
    let cfg = SegmentConfig {
        max_entries: 1,
        ..test_config()
    };
    let mut manager = SegmentManager::open(dir.path(), cfg)?;

    let first = manager.append(&put(1, "a", b"old"))?;
    let second = manager.append(&put(2, "b", b"new"))?;
    assert_ne!(first.segment_id, second.segment_id);

    assert_eq!(manager.read(first.segment_id, first.offset)?.value, b"old");
    assert_eq!(manager.read(second.segment_id, second.offset)?.value, b"new");
    Ok(())
}

#[test]
fn unknown_segment_is_an_error() -> Result<()> {
    let dir = tempdir()?;
    let manager = SegmentManager::open(dir.path(), test_config())?;
    assert!(matches!(
        manager.read(42, 0),
        Err(SegmentError::UnknownSegment(42))
    ));
    assert!(matches!(
        manager.read_plan(42),
        Err(SegmentError::UnknownSegment(42))
    ));
    Ok(())
}

// -------------------- Close --------------------

#[test]
fn close_seals_the_active_segment() -> Result<()> {
    let dir = tempdir()?;
    let mut manager = SegmentManager::open(dir.path(), test_config())?;
    manager.append(&put(1, "a", b"1"))?;
    manager.close()?;

    assert!(manager.segment(0)?.hint().closed);
    let err = manager.append(&put(2, "b", b"2")).unwrap_err();
    assert!(matches!(err, SegmentError::Sealed { .. }));
    Ok(())
}
