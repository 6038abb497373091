//! # Store — the DriftKV coordinator
//!
//! Ties the [`record`], [`segment`], and [`keydir`] crates into a complete
//! log-structured key-value store in the Bitcask mold: every mutation is one
//! framed record appended to the active segment's log, and every live key
//! has exactly one entry in an in-memory keydir pointing at its newest
//! record.
//!
//! ## Architecture
//!
//! ```text
//! Service layer
//!   |
//!   v
//! ┌──────────────────────────────────────────────────┐
//! │                     STORE                        │
//! │                                                  │
//! │ write.rs → manager.append → keydir.put           │
//! │              |                                   │
//! │              | (segment full?)                   │
//! │              v        yes                        │
//! │        seal + rotate to segment id+1             │
//! │                                                  │
//! │ read.rs  → keydir lookup → pread the `.log`      │
//! │              (location cloned, lock released)    │
//! │                                                  │
//! │ recovery.rs → index sidecars, else scan logs     │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                            |
//! |---------------|----------------------------------------------------|
//! | `lib.rs`      | `Store` struct, open/close, locking, `Debug`, `Drop` |
//! | [`options`]   | `StoreOptions` and validation                      |
//! | `write`       | `put()`, `delete()`                                |
//! | `read`        | `get()`                                            |
//! | `recovery`    | keydir reconstruction from sidecars or scans       |
//! | `flusher`     | periodic background fsync worker                   |
//! | [`events`]    | structured event sink                              |
//!
//! ## Concurrency
//!
//! Single writer, multiple readers, in process. One `RwLock` guards the
//! segment manager and the keydir: `put`/`delete`/rotation/`close` take it
//! exclusively, `get` takes it shared just long enough to clone the small
//! location record, then reads the segment file with no lock held. Sealed
//! segments are immutable, so those reads need no coordination at all.
//!
//! A `.lock` sentinel file, held with an advisory exclusive lock, keeps a
//! data directory owned by exactly one store instance.
//!
//! ## Durability
//!
//! Appends always reach the OS; `fsync_on_append` makes each append durable
//! immediately, and the optional background flusher bounds the loss window
//! to `fsync_interval` otherwise. Hints persist on create, seal, and
//! periodic flush, always via temp file + fsync + rename.

mod error;
pub mod events;
mod flusher;
pub mod options;
mod read;
mod recovery;
mod write;

pub use error::StoreError;
pub use events::{Event, EventSink, NullSink};
pub use options::StoreOptions;

use flusher::Flusher;
use fs2::FileExt;
use keydir::Keydir;
use parking_lot::{Mutex, RwLock};
use segment::SegmentManager;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Advisory single-writer sentinel in the data directory.
const LOCK_FILE: &str = ".lock";

/// Everything the store mutates, behind one lock.
pub(crate) struct Inner {
    pub(crate) manager: SegmentManager,
    pub(crate) keydir: Keydir,
    pub(crate) closed: bool,
    /// Highest timestamp handed out or recovered. Wall clock reads are
    /// clamped to this so timestamps never regress within one writer run.
    pub(crate) clock_ms: u64,
}

impl Inner {
    pub(crate) fn next_timestamp(&mut self) -> u64 {
        let ts = now_ms().max(self.clock_ms);
        self.clock_ms = ts;
        ts
    }
}

/// Milliseconds since the Unix epoch. A clock before the epoch collapses to 0.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A persistent key-value store over one data directory.
///
/// All methods take `&self`; the store is `Send + Sync` and meant to be
/// shared behind an `Arc` by the service layer.
pub struct Store {
    path: PathBuf,
    opts: StoreOptions,
    inner: Arc<RwLock<Inner>>,
    sink: Arc<dyn EventSink>,
    flusher: Mutex<Option<Flusher>>,
    lock_file: File,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("closed", &inner.closed)
            .field("live_keys", &inner.keydir.len())
            .field("segments", &inner.manager.segment_count())
            .field("active_segment", &inner.manager.active_id())
            .field("sync", &self.opts.sync)
            .field("fsync_on_append", &self.opts.fsync_on_append)
            .finish()
    }
}

impl Store {
    /// Opens (or creates) the store at `path`, discarding events.
    pub fn open(path: impl AsRef<Path>, opts: StoreOptions) -> Result<Store, StoreError> {
        Self::open_with_sink(path, opts, Arc::new(NullSink))
    }

    /// Opens (or creates) the store at `path` with an injected event sink.
    ///
    /// # Steps
    ///
    /// 1. Validate the options.
    /// 2. Create the directory and take the exclusive `.lock`.
    /// 3. Discover and open segments via the manager.
    /// 4. Rebuild the keydir from index sidecars, scanning logs where the
    ///    sidecars are missing or disagree.
    /// 5. Start the background flusher when `sync` is enabled.
    ///
    /// # Errors
    ///
    /// `InvalidConfig`, `AlreadyLocked`, `Segment` (a corrupt log refuses to
    /// open, naming segment and offset), or `Io`.
    pub fn open_with_sink(
        path: impl AsRef<Path>,
        opts: StoreOptions,
        sink: Arc<dyn EventSink>,
    ) -> Result<Store, StoreError> {
        opts.validate()?;
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::AlreadyLocked)?;

        let mut manager = SegmentManager::open(&path, opts.segment_config())?;
        let recovered = recovery::rebuild_keydir(&mut manager, sink.as_ref())?;

        let inner = Arc::new(RwLock::new(Inner {
            manager,
            keydir: recovered.keydir,
            closed: false,
            clock_ms: recovered.max_timestamp_ms,
        }));

        let flusher = if opts.sync {
            Some(Flusher::spawn(Arc::clone(&inner), opts.fsync_interval)?)
        } else {
            None
        };

        Ok(Store {
            path,
            opts,
            inner,
            sink,
            flusher: Mutex::new(flusher),
            lock_file,
        })
    }

    /// Seals the active segment, stops the flusher, and releases the
    /// directory lock. Idempotent; operations after `close` fail with
    /// [`StoreError::Closed`].
    pub fn close(&self) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.write();
            if inner.closed {
                return Ok(());
            }
            inner.manager.close()?;
            inner.closed = true;
        }
        if let Some(mut flusher) = self.flusher.lock().take() {
            flusher.stop();
        }
        let _ = self.lock_file.unlock();
        Ok(())
    }

    /// Marks the store closed after detected corruption. The flusher notices
    /// the flag on its next tick.
    pub(crate) fn poison(&self) {
        let mut inner = self.inner.write();
        inner.closed = true;
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().keydir.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().keydir.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.opts
    }
}

/// Best-effort close on drop.
///
/// Errors are swallowed because `Drop` cannot propagate them; the log is
/// append-only, so anything unsealed is rebuilt by recovery on the next
/// open.
impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests;
