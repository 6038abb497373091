//! Segment manager: discovery, routing, rotation.
//!
//! The manager owns every segment of one store. Exactly one segment is
//! active at any moment; all others are sealed and read-only. Rotation
//! happens when an append would push the active segment past either
//! threshold: the record that would overflow goes to the fresh segment, so
//! thresholds are hard upper bounds.

use crate::{Segment, SegmentConfig, SegmentError};
use record::Record;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Where an append landed, and whether it forced a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub segment_id: u64,
    pub offset: u64,
    /// Id of the segment sealed to make room, when rotation occurred.
    pub rotated_from: Option<u64>,
}

/// Owns all segments of one data directory and routes reads and appends.
#[derive(Debug)]
pub struct SegmentManager {
    dir: PathBuf,
    cfg: SegmentConfig,
    /// Ascending by id; iteration order is the recovery order.
    segments: BTreeMap<u64, Segment>,
    active_id: u64,
}

impl SegmentManager {
    /// Discovers `segment_<id>.log` files and opens them, sealed, in
    /// ascending id order. The highest id is re-activated when still below
    /// both thresholds; otherwise it is sealed for good and a fresh segment
    /// with id `max + 1` is created. An empty directory starts at segment 0.
    pub fn open(dir: &Path, cfg: SegmentConfig) -> Result<SegmentManager, SegmentError> {
        fs::create_dir_all(dir)?;

        let mut ids = discover_segment_ids(dir)?;
        ids.sort_unstable();

        let mut segments = BTreeMap::new();
        for &id in &ids {
            segments.insert(id, Segment::open_existing(dir, id, &cfg)?);
        }

        let active_id = match ids.last().copied() {
            None => {
                segments.insert(0, Segment::create(dir, 0, &cfg)?);
                0
            }
            Some(max_id) => {
                let reuse = !segments[&max_id].is_full();
                for (&id, segment) in segments.iter_mut() {
                    if id != max_id || !reuse {
                        segment.seal()?;
                    }
                }
                if reuse {
                    segments
                        .get_mut(&max_id)
                        .ok_or(SegmentError::UnknownSegment(max_id))?
                        .reactivate()?;
                    max_id
                } else {
                    let next = max_id + 1;
                    segments.insert(next, Segment::create(dir, next, &cfg)?);
                    next
                }
            }
        };

        Ok(SegmentManager {
            dir: dir.to_path_buf(),
            cfg,
            segments,
            active_id,
        })
    }

    /// Appends a record to the active segment, rotating once if it is full.
    ///
    /// # Errors
    ///
    /// `OversizedRecord` when the framed record could not fit even an empty
    /// segment; otherwise whatever the underlying append fails with.
    pub fn append(&mut self, record: &Record) -> Result<AppendOutcome, SegmentError> {
        let framed = record.framed_len() as u64;
        if framed > self.cfg.max_size {
            return Err(SegmentError::OversizedRecord {
                size: framed,
                max: self.cfg.max_size,
            });
        }

        match self.active_mut()?.append(record) {
            Ok(offset) => Ok(AppendOutcome {
                segment_id: self.active_id,
                offset,
                rotated_from: None,
            }),
            Err(SegmentError::Full { .. }) => {
                let sealed_id = self.active_id;
                self.rotate()?;
                // The record fits an empty segment, so this retry is final.
                let offset = self.active_mut()?.append(record)?;
                Ok(AppendOutcome {
                    segment_id: self.active_id,
                    offset,
                    rotated_from: Some(sealed_id),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Seals the active segment and creates its successor.
    fn rotate(&mut self) -> Result<(), SegmentError> {
        self.active_mut()?.seal()?;
        let next = self.active_id + 1;
        self.segments
            .insert(next, Segment::create(&self.dir, next, &self.cfg)?);
        self.active_id = next;
        Ok(())
    }

    /// Reads the record at `offset` in segment `segment_id`.
    pub fn read(&self, segment_id: u64, offset: u64) -> Result<Record, SegmentError> {
        self.segment(segment_id)?.read_at(offset)
    }

    /// Returns the `.log` path for a segment, cloned so the caller can read
    /// it after releasing any lock that guards the manager.
    pub fn read_plan(&self, segment_id: u64) -> Result<PathBuf, SegmentError> {
        Ok(self.segment(segment_id)?.log_path().to_path_buf())
    }

    /// Flushes the active segment's files and persists its hint.
    pub fn sync_active(&mut self) -> Result<(), SegmentError> {
        self.active_mut()?.sync()
    }

    /// Seals the active segment. Terminal: the manager accepts no appends
    /// afterwards, this is the close path.
    pub fn close(&mut self) -> Result<(), SegmentError> {
        self.active_mut()?.seal()
    }

    #[must_use]
    pub fn active_id(&self) -> u64 {
        self.active_id
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, segment_id: u64) -> Result<&Segment, SegmentError> {
        self.segments
            .get(&segment_id)
            .ok_or(SegmentError::UnknownSegment(segment_id))
    }

    pub fn segment_mut(&mut self, segment_id: u64) -> Result<&mut Segment, SegmentError> {
        self.segments
            .get_mut(&segment_id)
            .ok_or(SegmentError::UnknownSegment(segment_id))
    }

    /// Segments in ascending id order, which is the order recovery visits
    /// them in.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    /// Ascending segment ids, for recovery passes that need `&mut` access
    /// one segment at a time.
    #[must_use]
    pub fn segment_ids(&self) -> Vec<u64> {
        self.segments.keys().copied().collect()
    }

    fn active_mut(&mut self) -> Result<&mut Segment, SegmentError> {
        let id = self.active_id;
        self.segment_mut(id)
    }
}

/// Parses `segment_<id>.log` names out of the data directory, ignoring
/// sidecars and anything else.
fn discover_segment_ids(dir: &Path) -> Result<Vec<u64>, SegmentError> {
    let mut ids = Vec::new();
    for dir_entry in fs::read_dir(dir)? {
        let dir_entry = dir_entry?;
        let name = dir_entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(id) = name
            .strip_prefix("segment_")
            .and_then(|rest| rest.strip_suffix(".log"))
            .and_then(|id| id.parse::<u64>().ok())
        else {
            continue;
        };
        ids.push(id);
    }
    Ok(ids)
}
