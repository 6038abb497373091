//! Index sidecar: per-segment key-location log.
//!
//! One text line per record appended to the `.log`, tab-separated:
//!
//! ```text
//! <key>\t<segment_id>\t<offset>\t<framed_size>\t<timestamp_ms>\t<tombstone>
//! ```
//!
//! Keys containing a tab, newline, or backslash are backslash-escaped.
//! Deletes append a line too, with `tombstone` = 1, so recovery can replay
//! the full mutation history without touching the `.log`.
//!
//! The index is advisory: it may be missing, truncated, or malformed, in
//! which case the `.log` is scanned instead and the index rewritten. A
//! malformed line aborts the whole file rather than being skipped, because
//! a partially applied index would silently lose deletes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

/// One parsed index line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: String,
    pub segment_id: u64,
    pub offset: u64,
    /// Framed record size in the `.log`.
    pub size: u32,
    pub timestamp_ms: u64,
    pub tombstone: bool,
}

impl IndexEntry {
    /// Formats the entry as one index line, without the trailing newline.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            escape_key(&self.key),
            self.segment_id,
            self.offset,
            self.size,
            self.timestamp_ms,
            u8::from(self.tombstone),
        )
    }

    /// Parses one line. `None` means the line is malformed and the caller
    /// must abandon the file and fall back to a scan.
    #[must_use]
    pub fn parse_line(line: &str) -> Option<IndexEntry> {
        let mut fields = line.split('\t');
        let key = unescape_key(fields.next()?)?;
        let segment_id = fields.next()?.parse().ok()?;
        let offset = fields.next()?.parse().ok()?;
        let size = fields.next()?.parse().ok()?;
        let timestamp_ms = fields.next()?.parse().ok()?;
        let tombstone = match fields.next()? {
            "0" => false,
            "1" => true,
            _ => return None,
        };
        if fields.next().is_some() {
            return None;
        }
        Some(IndexEntry {
            key,
            segment_id,
            offset,
            size,
            timestamp_ms,
            tombstone,
        })
    }
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_key(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            't' => out.push('\t'),
            'n' => out.push('\n'),
            _ => return None,
        }
    }
    Some(out)
}

/// Appends one line to an open index handle.
pub(crate) fn append_line(file: &mut File, entry: &IndexEntry) -> io::Result<()> {
    let mut line = entry.to_line();
    line.push('\n');
    file.write_all(line.as_bytes())
}

/// Loads the whole index.
///
/// Returns `None` when the file is missing, unreadable, or contains any
/// malformed line; every such case sends the caller to scan-based recovery.
pub fn load(path: &Path) -> Option<Vec<IndexEntry>> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.ok()?;
        if line.is_empty() {
            continue;
        }
        match IndexEntry::parse_line(&line) {
            Some(entry) => entries.push(entry),
            None => {
                tracing::warn!(
                    path = %path.display(),
                    line = line_num + 1,
                    "malformed index line, abandoning index file"
                );
                return None;
            }
        }
    }
    Some(entries)
}

/// Rewrites the index atomically: write `<path>.tmp`, fsync, rename.
pub(crate) fn rewrite<'a>(
    path: &Path,
    entries: impl IntoIterator<Item = &'a IndexEntry>,
) -> io::Result<()> {
    let tmp_path = path.with_extension("index.tmp");
    {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        for entry in entries {
            append_line(&mut f, entry)?;
        }
        f.flush()?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)
}
