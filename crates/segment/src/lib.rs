//! # Segment — one append-only log file plus its sidecars
//!
//! A segment owns three files in the data directory:
//!
//! ```text
//! segment_<id>.log        append-only framed records (ground truth)
//! segment_<id>.hint       JSON metadata sidecar (size, count, lifecycle)
//! segment_<id>.log.index  one text line per record (fast keydir recovery)
//! ```
//!
//! Segments move through exactly one transition, `Active → Sealed`, and the
//! transition is terminal: a sealed segment serves reads only and is never
//! rewritten in place. The active segment accepts appends until either its
//! byte-size or entry-count threshold would be exceeded, at which point the
//! [`manager::SegmentManager`] seals it and rotates to a fresh id.
//!
//! ## Crash consistency
//!
//! Only the `.log` is authoritative. The hint may lag by one in-flight
//! append and the index may be missing or torn; both are rebuilt from a
//! sequential scan of the `.log` whenever they disagree with it, and a
//! partial trailing record left by a crash is truncated away in the same
//! pass. Hint persistence is atomic (temp file + fsync + rename) so a crash
//! never leaves a half-written hint.

mod hint;
pub mod index;
pub mod manager;
mod scanner;

pub use hint::SegmentHint;
pub use index::IndexEntry;
pub use manager::{AppendOutcome, SegmentManager};
pub use scanner::{LogScanner, ScanError};

use record::{Record, RecordError, HEADER_SIZE};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::hint::now_ms;

/// Errors from segment and segment-manager operations.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The append would push the segment past a size or entry threshold.
    /// Internal: the manager reacts by rotating, callers never see it.
    #[error("segment {id} is full")]
    Full { id: u64 },

    /// Append attempted on a segment that is not active.
    #[error("segment {id} is sealed")]
    Sealed { id: u64 },

    /// The record cannot fit even an empty segment.
    #[error("record of {size} bytes exceeds the {max}-byte segment capacity")]
    OversizedRecord { size: u64, max: u64 },

    /// A read was routed to a segment id the manager does not hold.
    #[error("unknown segment {0}")]
    UnknownSegment(u64),

    /// A record ran past the end of the `.log`.
    #[error("truncated record in segment {id} at offset {offset}")]
    Truncated { id: u64, offset: u64 },

    /// A well-framed region of the `.log` failed to decode. Interior
    /// corruption: the store refuses to open on this.
    #[error("invalid record in segment {id} at offset {offset}: {source}")]
    InvalidRecord {
        id: u64,
        offset: u64,
        source: RecordError,
    },
}

impl SegmentError {
    fn from_scan(id: u64, err: ScanError) -> Self {
        match err {
            ScanError::Io(e) => SegmentError::Io(e),
            ScanError::InvalidRecord { offset, source } => {
                SegmentError::InvalidRecord { id, offset, source }
            }
        }
    }
}

/// Per-segment limits and durability knobs, shared by every segment of one
/// store.
#[derive(Debug, Clone, Copy)]
pub struct SegmentConfig {
    /// Hard upper bound on `.log` bytes.
    pub max_size: u64,
    /// Hard upper bound on records per segment.
    pub max_entries: u64,
    /// fsync the `.log` after every append.
    pub fsync_on_append: bool,
}

fn log_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("segment_{id}.log"))
}

fn hint_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("segment_{id}.hint"))
}

fn index_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("segment_{id}.log.index"))
}

/// One segment: the `.log` and its two sidecars.
///
/// Write handles are held only while the segment is active; reads open a
/// fresh handle per call, so sealed segments can be read concurrently
/// without coordination.
#[derive(Debug)]
pub struct Segment {
    id: u64,
    log_path: PathBuf,
    hint_path: PathBuf,
    index_path: PathBuf,
    hint: SegmentHint,
    log_file: Option<File>,
    index_file: Option<File>,
    fsync_on_append: bool,
    recovered_by_scan: bool,
}

impl Segment {
    /// Creates a fresh active segment: empty `.log`, empty `.index`, and a
    /// hint persisted with `active`=1, `closed`=0.
    pub fn create(dir: &Path, id: u64, cfg: &SegmentConfig) -> Result<Segment, SegmentError> {
        fs::create_dir_all(dir)?;
        let log_path = log_path(dir, id);
        let hint_path = hint_path(dir, id);
        let index_path = index_path(dir, id);

        let log_file = OpenOptions::new().create(true).append(true).open(&log_path)?;
        let index_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&index_path)?;

        let mut hint = SegmentHint {
            id,
            path: log_path.display().to_string(),
            size: 0,
            entries: 0,
            max_size: cfg.max_size,
            max_entries: cfg.max_entries,
            active: true,
            closed: false,
            created_at_ms: now_ms(),
            last_synced_at_ms: 0,
        };
        hint.save(&hint_path)?;

        Ok(Segment {
            id,
            log_path,
            hint_path,
            index_path,
            hint,
            log_file: Some(log_file),
            index_file: Some(index_file),
            fsync_on_append: cfg.fsync_on_append,
            recovered_by_scan: false,
        })
    }

    /// Opens an existing segment for reading.
    ///
    /// The hint is trusted only when it parses *and* its recorded size
    /// matches the actual `.log` length; anything else rebuilds the metadata
    /// by scanning. No write handles are opened here; the manager
    /// re-activates the highest segment explicitly.
    pub fn open_existing(dir: &Path, id: u64, cfg: &SegmentConfig) -> Result<Segment, SegmentError> {
        let log_path = log_path(dir, id);
        let hint_path = hint_path(dir, id);
        let index_path = index_path(dir, id);

        let actual_len = fs::metadata(&log_path)?.len();

        match SegmentHint::load(&hint_path) {
            Some(hint) if hint.size == actual_len => Ok(Segment {
                id,
                log_path,
                hint_path,
                index_path,
                hint,
                log_file: None,
                index_file: None,
                fsync_on_append: cfg.fsync_on_append,
                recovered_by_scan: false,
            }),
            _ => Self::rebuild_from_scan(dir, id, cfg),
        }
    }

    /// Rebuilds hint and index from a full `.log` scan.
    ///
    /// A partial trailing record is truncated off the `.log` (the append
    /// that wrote it is as-if never issued). The rebuilt segment comes back
    /// sealed; interior corruption is fatal and names the byte offset.
    fn rebuild_from_scan(dir: &Path, id: u64, cfg: &SegmentConfig) -> Result<Segment, SegmentError> {
        let log_path = log_path(dir, id);
        let hint_path = hint_path(dir, id);
        let index_path = index_path(dir, id);

        let actual_len = fs::metadata(&log_path)?.len();
        let mut entries = Vec::new();
        let mut scanner = LogScanner::open(&log_path)?;
        for item in &mut scanner {
            let (offset, rec) = item.map_err(|e| SegmentError::from_scan(id, e))?;
            let size = rec.framed_len() as u32;
            entries.push(IndexEntry {
                key: rec.key,
                segment_id: id,
                offset,
                size,
                timestamp_ms: rec.timestamp_ms,
                tombstone: rec.tombstone,
            });
        }

        let valid_len = scanner.valid_len();
        if valid_len < actual_len {
            // roll back the torn append
            tracing::warn!(
                segment = id,
                valid_len,
                actual_len,
                "discarding partial trailing record"
            );
            let f = OpenOptions::new().write(true).open(&log_path)?;
            f.set_len(valid_len)?;
            f.sync_all()?;
        }

        index::rewrite(&index_path, &entries)?;

        let created_at_ms = fs::metadata(&log_path)
            .ok()
            .and_then(|m| m.created().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or_else(now_ms);

        let mut hint = SegmentHint {
            id,
            path: log_path.display().to_string(),
            size: valid_len,
            entries: entries.len() as u64,
            max_size: cfg.max_size,
            max_entries: cfg.max_entries,
            active: false,
            closed: true,
            created_at_ms,
            last_synced_at_ms: 0,
        };
        hint.save(&hint_path)?;

        Ok(Segment {
            id,
            log_path,
            hint_path,
            index_path,
            hint,
            log_file: None,
            index_file: None,
            fsync_on_append: cfg.fsync_on_append,
            recovered_by_scan: true,
        })
    }

    /// Reopens this segment for appends. Used by the manager when the
    /// highest discovered segment is still below its thresholds.
    pub(crate) fn reactivate(&mut self) -> Result<(), SegmentError> {
        self.log_file = Some(OpenOptions::new().append(true).open(&self.log_path)?);
        self.index_file = Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.index_path)?,
        );
        self.hint.active = true;
        self.hint.closed = false;
        self.hint.save(&self.hint_path)?;
        Ok(())
    }

    /// Appends one framed record to the `.log` and one line to the `.index`.
    ///
    /// Returns the byte offset the record was written at. The `.index`
    /// append is best-effort: after the `.log` write succeeded, an index
    /// failure is logged and tolerated because recovery regenerates it.
    ///
    /// # Errors
    ///
    /// `Full` when a threshold would be exceeded (the manager rotates),
    /// `Sealed` when the segment is not active, `Io` on write failure.
    pub fn append(&mut self, record: &Record) -> Result<u64, SegmentError> {
        if !self.hint.active || self.hint.closed {
            return Err(SegmentError::Sealed { id: self.id });
        }

        let framed = record.framed_len() as u64;
        if self.hint.size + framed > self.hint.max_size
            || self.hint.entries + 1 > self.hint.max_entries
        {
            return Err(SegmentError::Full { id: self.id });
        }

        let id = self.id;
        let log_file = self
            .log_file
            .as_mut()
            .ok_or(SegmentError::Sealed { id })?;

        let offset = self.hint.size;
        if let Err(err) = log_file.write_all(&record.encode()) {
            // Trim any partial write so the next append's offset stays true.
            // If even that fails, stop accepting appends; the scan on the
            // next open discards the torn bytes.
            if log_file.set_len(offset).is_err() {
                self.hint.active = false;
                self.hint.closed = true;
            }
            return Err(err.into());
        }
        if self.fsync_on_append {
            log_file.sync_all()?;
        }
        self.hint.size += framed;
        self.hint.entries += 1;

        let entry = IndexEntry {
            key: record.key.clone(),
            segment_id: self.id,
            offset,
            size: framed as u32,
            timestamp_ms: record.timestamp_ms,
            tombstone: record.tombstone,
        };
        if let Some(index_file) = self.index_file.as_mut() {
            if let Err(err) = index::append_line(index_file, &entry) {
                tracing::warn!(segment = self.id, %err, "index append failed, log is intact");
            }
        }

        Ok(offset)
    }

    /// Reads and decodes the record at `offset`, via a fresh read-only
    /// handle.
    pub fn read_at(&self, offset: u64) -> Result<Record, SegmentError> {
        read_record_at(self.id, &self.log_path, offset)
    }

    /// Sequential scan from offset 0.
    pub fn scan(&self) -> Result<LogScanner<File>, SegmentError> {
        Ok(LogScanner::open(&self.log_path)?)
    }

    /// Rescans the `.log` and atomically rewrites the `.index` from the
    /// result, returning the entries so callers can reuse them.
    pub fn rebuild_index(&mut self) -> Result<Vec<IndexEntry>, SegmentError> {
        let mut entries = Vec::new();
        let mut scanner = self.scan()?;
        for item in &mut scanner {
            let (offset, rec) = item.map_err(|e| SegmentError::from_scan(self.id, e))?;
            let size = rec.framed_len() as u32;
            entries.push(IndexEntry {
                key: rec.key,
                segment_id: self.id,
                offset,
                size,
                timestamp_ms: rec.timestamp_ms,
                tombstone: rec.tombstone,
            });
        }
        index::rewrite(&self.index_path, &entries)?;

        // The rename replaced the inode an open append handle would still
        // point at; refresh it so later appends land in the new file.
        if self.index_file.is_some() {
            self.index_file = Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.index_path)?,
            );
        }
        Ok(entries)
    }

    /// Seals the segment: `closed`=1, `active`=0, hint persisted atomically,
    /// write handles dropped. Idempotent.
    pub fn seal(&mut self) -> Result<(), SegmentError> {
        if self.hint.closed {
            return Ok(());
        }
        if let Some(log_file) = self.log_file.take() {
            log_file.sync_all()?;
        }
        if let Some(index_file) = self.index_file.take() {
            if let Err(err) = index_file.sync_all() {
                tracing::warn!(segment = self.id, %err, "index fsync failed on seal");
            }
        }
        self.hint.active = false;
        self.hint.closed = true;
        self.hint.save(&self.hint_path)?;
        Ok(())
    }

    /// Flushes `.log` and `.index` to disk and persists the hint. Called by
    /// the store's periodic flusher; a no-op for sealed segments.
    pub fn sync(&mut self) -> Result<(), SegmentError> {
        if self.hint.closed {
            return Ok(());
        }
        if let Some(log_file) = self.log_file.as_ref() {
            log_file.sync_all()?;
        }
        if let Some(index_file) = self.index_file.as_ref() {
            if let Err(err) = index_file.sync_all() {
                tracing::warn!(segment = self.id, %err, "index fsync failed");
            }
        }
        // Tolerated: the hint is rebuildable from the log.
        if let Err(err) = self.hint.save(&self.hint_path) {
            tracing::warn!(segment = self.id, %err, "hint persist failed");
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the segment currently accepts appends.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.hint.active && !self.hint.closed && self.log_file.is_some()
    }

    /// Whether either rotation threshold has been reached.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.hint.size >= self.hint.max_size || self.hint.entries >= self.hint.max_entries
    }

    /// Current `.log` byte length.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.hint.size
    }

    /// Number of records in the `.log`.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.hint.entries
    }

    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    #[must_use]
    pub fn index_file_path(&self) -> &Path {
        &self.index_path
    }

    #[must_use]
    pub fn hint(&self) -> &SegmentHint {
        &self.hint
    }

    /// Whether this open had to fall back to a full scan to rebuild the
    /// segment's metadata. Surfaced so the store can report the fallback.
    #[must_use]
    pub fn recovered_by_scan(&self) -> bool {
        self.recovered_by_scan
    }
}

/// Reads one record at `offset` in the given `.log` file.
///
/// Free function so the store can serve `get` after dropping its shared
/// lock: the lock only lives long enough to clone the location and the log
/// path.
pub fn read_record_at(id: u64, log_path: &Path, offset: u64) -> Result<Record, SegmentError> {
    let mut file = File::open(log_path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut frame = vec![0u8; HEADER_SIZE];
    read_exact_at(&mut file, &mut frame, id, offset)?;
    let header = record::Header::decode(&frame)
        .map_err(|source| SegmentError::InvalidRecord { id, offset, source })?;

    let payload_len = header.framed_len() - HEADER_SIZE;
    frame.resize(HEADER_SIZE + payload_len, 0);
    read_exact_at(&mut file, &mut frame[HEADER_SIZE..], id, offset)?;

    Record::decode(&frame).map_err(|source| match source {
        RecordError::Truncated { .. } => SegmentError::Truncated { id, offset },
        source => SegmentError::InvalidRecord { id, offset, source },
    })
}

fn read_exact_at(file: &mut File, buf: &mut [u8], id: u64, offset: u64) -> Result<(), SegmentError> {
    file.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SegmentError::Truncated { id, offset }
        } else {
            SegmentError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests;
