use crate::index::{self, IndexEntry};
use anyhow::Result;
use tempfile::tempdir;

fn entry(key: &str, offset: u64, tombstone: bool) -> IndexEntry {
    IndexEntry {
        key: key.to_string(),
        segment_id: 4,
        offset,
        size: 32,
        timestamp_ms: 1_700_000_000_000,
        tombstone,
    }
}

// -------------------- Line format --------------------

#[test]
fn line_roundtrip() {
    let e = entry("user:42", 96, false);
    let line = e.to_line();
    assert_eq!(line, "user:42\t4\t96\t32\t1700000000000\t0");
    assert_eq!(IndexEntry::parse_line(&line).unwrap(), e);
}

#[test]
fn tombstone_flag_roundtrip() {
    let e = entry("gone", 0, true);
    let line = e.to_line();
    assert!(line.ends_with("\t1"));
    assert!(IndexEntry::parse_line(&line).unwrap().tombstone);
}

#[test]
fn keys_with_separators_are_escaped() {
    for key in ["tab\there", "new\nline", "back\\slash", "\t\n\\"] {
        let e = entry(key, 0, false);
        let line = e.to_line();
        // the raw separator never appears inside the escaped key field
        assert_eq!(line.matches('\t').count(), 5);
        assert!(!line.contains('\n'));
        assert_eq!(IndexEntry::parse_line(&line).unwrap().key, key);
    }
}

// -------------------- Malformed lines --------------------

#[test]
fn malformed_lines_are_rejected() {
    for line in [
        "",
        "key\t1\t2\t3\t4",            // too few fields
        "key\t1\t2\t3\t4\t0\textra",  // too many fields
        "key\tnope\t2\t3\t4\t0",      // bad integer
        "key\t1\t2\t3\t4\t2",         // tombstone out of range
        "bad\\escape\\q\t1\t2\t3\t4\t0", // unknown escape
        "dangling\\\t1\t2\t3\t4\t0",  // trailing backslash in the key
    ] {
        assert!(IndexEntry::parse_line(line).is_none(), "accepted: {line:?}");
    }
}

// -------------------- File operations --------------------

#[test]
fn rewrite_then_load_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("segment_4.log.index");
    let entries = vec![entry("a", 0, false), entry("b", 32, true), entry("a", 64, false)];

    index::rewrite(&path, &entries)?;
    assert_eq!(index::load(&path).unwrap(), entries);
    Ok(())
}

#[test]
fn load_missing_file_is_none() {
    let dir = tempdir().unwrap();
    assert!(index::load(&dir.path().join("nope.index")).is_none());
}

#[test]
fn load_aborts_on_malformed_line() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("segment_0.log.index");
    let good = entry("a", 0, false).to_line();
    std::fs::write(&path, format!("{good}\nthis is not an index line\n{good}\n"))?;

    // one bad line poisons the whole file; the caller falls back to a scan
    assert!(index::load(&path).is_none());
    Ok(())
}

#[test]
fn load_empty_file_is_empty() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("segment_0.log.index");
    std::fs::write(&path, "")?;
    assert_eq!(index::load(&path).unwrap(), Vec::new());
    Ok(())
}
