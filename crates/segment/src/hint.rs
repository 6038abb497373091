//! Hint sidecar: per-segment JSON metadata.
//!
//! The hint is a small JSON object next to each `.log` file carrying size,
//! entry count, and lifecycle flags. It is persisted on create, on seal, and
//! on the store's periodic flush, never on every append, so after a crash it
//! may lag the `.log` by one in-flight record. The `.log` is always the
//! ground truth; a hint that disagrees with the actual file length is
//! discarded and rebuilt by scanning.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch. A clock before the epoch collapses to 0.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// On-disk segment metadata.
///
/// `active` and `closed` serialize as integers 0/1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentHint {
    pub id: u64,
    /// Path of the owning `.log` file, for operator inspection.
    pub path: String,
    /// Current `.log` byte length.
    pub size: u64,
    /// Number of records in the `.log`.
    pub entries: u64,
    pub max_size: u64,
    pub max_entries: u64,
    #[serde(with = "int_bool")]
    pub active: bool,
    #[serde(with = "int_bool")]
    pub closed: bool,
    pub created_at_ms: u64,
    pub last_synced_at_ms: u64,
}

impl SegmentHint {
    /// Loads a hint, returning `None` when the file is missing, unreadable,
    /// or does not parse. Callers fall back to scanning the `.log`.
    pub fn load(path: &Path) -> Option<SegmentHint> {
        let data = fs::read(path).ok()?;
        match serde_json::from_slice(&data) {
            Ok(hint) => Some(hint),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "unparseable hint file, will rescan");
                None
            }
        }
    }

    /// Persists the hint atomically: write to `<path>.tmp`, fsync, rename.
    ///
    /// If the rename fails (the target can be cached on some platforms), the
    /// hint is rewritten in place; it is small and fsynced either way.
    pub fn save(&mut self, path: &Path) -> io::Result<()> {
        self.last_synced_at_ms = now_ms();

        let tmp_path = path.with_extension("hint.tmp");
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            self.write_to(&mut f)?;
        }

        if fs::rename(&tmp_path, path).is_err() {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            self.write_to(&mut f)?;
            let _ = fs::remove_file(&tmp_path);
        }

        Ok(())
    }

    fn write_to(&self, f: &mut File) -> io::Result<()> {
        let data = serde_json::to_vec_pretty(self).map_err(io::Error::other)?;
        f.write_all(&data)?;
        f.flush()?;
        f.sync_all()
    }
}

/// Serialize a bool as 0/1 so the hint matches the documented JSON shape.
mod int_bool {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(u8::from(*v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(u8::deserialize(d)? != 0)
    }
}
