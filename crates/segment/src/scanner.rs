//! Sequential `.log` scanner.
//!
//! Walks a segment log record by record, relying on the self-describing
//! frame format. A partial trailing record (crash mid-append) terminates the
//! walk cleanly; corruption in the interior of the log is an error that
//! names the byte offset.

use record::{Header, Record, RecordError, HEADER_SIZE};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use thiserror::Error;

/// Error produced for a single scanned record.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A well-framed region in the interior of the log failed to decode.
    #[error("invalid record at offset {offset}: {source}")]
    InvalidRecord { offset: u64, source: RecordError },
}

/// Iterator over `(offset, Record)` pairs of one `.log` file.
///
/// Generic over any `Read` implementor so tests can scan in-memory buffers.
/// After the iterator is exhausted, [`LogScanner::valid_len`] reports how
/// many bytes of whole records were consumed and
/// [`LogScanner::saw_truncated_tail`] whether a partial record was discarded
/// at the end.
pub struct LogScanner<R: Read> {
    rdr: BufReader<R>,
    offset: u64,
    done: bool,
    truncated: bool,
}

impl LogScanner<File> {
    pub fn open(path: &Path) -> io::Result<LogScanner<File>> {
        Ok(LogScanner::from_reader(File::open(path)?))
    }
}

impl<R: Read> LogScanner<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            rdr: BufReader::new(reader),
            offset: 0,
            done: false,
            truncated: false,
        }
    }

    /// Byte length of the whole records consumed so far. Once the iterator
    /// is exhausted this is the length the `.log` should be truncated to if
    /// a partial tail was found.
    #[must_use]
    pub fn valid_len(&self) -> u64 {
        self.offset
    }

    /// Whether a partial trailing record was discarded.
    #[must_use]
    pub fn saw_truncated_tail(&self) -> bool {
        self.truncated
    }

    /// Reads up to `n` bytes into `buf`, tolerating a short read at EOF.
    fn read_up_to(&mut self, n: usize, buf: &mut Vec<u8>) -> io::Result<usize> {
        buf.clear();
        let got = (&mut self.rdr).take(n as u64).read_to_end(buf)?;
        Ok(got)
    }
}

impl<R: Read> Iterator for LogScanner<R> {
    type Item = Result<(u64, Record), ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut frame = Vec::with_capacity(HEADER_SIZE);
        let got = match self.read_up_to(HEADER_SIZE, &mut frame) {
            Ok(got) => got,
            Err(e) => {
                self.done = true;
                return Some(Err(ScanError::Io(e)));
            }
        };
        if got == 0 {
            // clean EOF on a record boundary
            self.done = true;
            return None;
        }
        if got < HEADER_SIZE {
            self.done = true;
            self.truncated = true;
            return None;
        }

        let header = match Header::decode(&frame) {
            Ok(h) => h,
            // unreachable with a full header, but do not panic on it
            Err(source) => {
                self.done = true;
                return Some(Err(ScanError::InvalidRecord {
                    offset: self.offset,
                    source,
                }));
            }
        };

        let payload_len = header.framed_len() - HEADER_SIZE;
        let mut payload = Vec::new();
        match self.read_up_to(payload_len, &mut payload) {
            Ok(got) if got < payload_len => {
                // partial trailing record: discard, stop cleanly
                self.done = true;
                self.truncated = true;
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                self.done = true;
                return Some(Err(ScanError::Io(e)));
            }
        }
        frame.extend_from_slice(&payload);

        match Record::decode(&frame) {
            Ok(rec) => {
                let offset = self.offset;
                self.offset += frame.len() as u64;
                Some(Ok((offset, rec)))
            }
            Err(source) => {
                self.done = true;
                Some(Err(ScanError::InvalidRecord {
                    offset: self.offset,
                    source,
                }))
            }
        }
    }
}
