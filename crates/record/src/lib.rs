//! # Record — log record codec
//!
//! The atomic unit of the DriftKV on-disk log. Every mutation (`PUT` or
//! `DELETE`) is serialized into one framed record and appended to the active
//! segment's `.log` file. The format is self-describing: a reader knows from
//! the fixed header exactly how many bytes to consume next, which is what
//! lets the segment scanner walk a log without any external length table.
//!
//! ## Binary Record Format
//!
//! All integers are **big-endian**.
//!
//! ```text
//! offset 0  : u64 timestamp_ms
//! offset 8  : u8  tombstone (0 = live put, 1 = delete)
//! offset 9  : u32 key_size      (1 ..= 1024)
//! offset 13 : u32 value_size    (0 for tombstones)
//! offset 17 : key bytes (UTF-8)
//! offset 17 + key_size : value bytes (opaque)
//! ```
//!
//! Total framed length is `17 + key_size + value_size`.
//!
//! ## Example
//!
//! ```rust
//! use record::Record;
//!
//! let rec = Record::put(1_700_000_000_000, "hello", b"world".to_vec()).unwrap();
//! let bytes = rec.encode();
//! assert_eq!(Record::decode(&bytes).unwrap(), rec);
//! ```

use byteorder::{BigEndian, ReadBytesExt};
use thiserror::Error;

/// Fixed header length in bytes: timestamp (8) + tombstone (1) + key size (4)
/// + value size (4).
pub const HEADER_SIZE: usize = 17;

/// Hard format bound on the key size. This is a property of the wire format,
/// not a tunable; store-level configuration may lower it but never raise it.
pub const MAX_KEY_SIZE: usize = 1024;

/// Errors produced while building, encoding, or decoding a record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Keys must carry at least one byte.
    #[error("key must not be empty")]
    EmptyKey,

    /// Key length exceeds the 1024-byte format bound.
    #[error("key of {len} bytes exceeds the {MAX_KEY_SIZE}-byte format bound")]
    OversizedKey {
        /// Offending key length in bytes.
        len: usize,
    },

    /// Input shorter than the fixed header or than the header-declared
    /// framed length.
    #[error("truncated record: need {expected} bytes, have {actual}")]
    Truncated {
        /// Bytes the header (or header prefix) requires.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// The key bytes of a well-framed record are not valid UTF-8.
    #[error("record key is not valid UTF-8")]
    InvalidUtf8,
}

/// Returns the total framed length of a record with the given key and value
/// sizes.
#[must_use]
pub fn framed_size(key_size: usize, value_size: usize) -> usize {
    HEADER_SIZE + key_size + value_size
}

/// The fixed 17-byte record header, decoded on its own.
///
/// The segment layer reads the header first to learn how many payload bytes
/// to consume; [`Record::decode`] then validates the full frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Milliseconds since the Unix epoch at append time.
    pub timestamp_ms: u64,
    /// `true` for a delete marker.
    pub tombstone: bool,
    /// Declared key length in bytes.
    pub key_size: u32,
    /// Declared value length in bytes.
    pub value_size: u32,
}

impl Header {
    /// Decodes the fixed header from the front of `buf`.
    ///
    /// Only frame arithmetic is checked here; key-size bounds are enforced
    /// when the full record is decoded.
    pub fn decode(buf: &[u8]) -> Result<Self, RecordError> {
        if buf.len() < HEADER_SIZE {
            return Err(RecordError::Truncated {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }
        // The length was checked above, so these reads cannot come up short.
        let truncated = |_| RecordError::Truncated {
            expected: HEADER_SIZE,
            actual: buf.len(),
        };
        let mut rdr = &buf[..HEADER_SIZE];
        let timestamp_ms = rdr.read_u64::<BigEndian>().map_err(truncated)?;
        let tombstone_byte = rdr.read_u8().map_err(truncated)?;
        let key_size = rdr.read_u32::<BigEndian>().map_err(truncated)?;
        let value_size = rdr.read_u32::<BigEndian>().map_err(truncated)?;

        Ok(Self {
            timestamp_ms,
            // Fail closed toward deletion: any nonzero flag byte is a
            // tombstone, so corrupted flags can never resurrect a key.
            tombstone: tombstone_byte != 0,
            key_size,
            value_size,
        })
    }

    /// Total framed length declared by this header.
    #[must_use]
    pub fn framed_len(&self) -> usize {
        framed_size(self.key_size as usize, self.value_size as usize)
    }
}

/// A single decoded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Milliseconds since the Unix epoch at append time.
    pub timestamp_ms: u64,
    /// `true` marks a delete; tombstones carry an empty value.
    pub tombstone: bool,
    /// UTF-8 lookup key, 1..=1024 bytes.
    pub key: String,
    /// Opaque payload bytes. Empty for tombstones.
    pub value: Vec<u8>,
}

impl Record {
    /// Builds a live record for `put`.
    ///
    /// # Errors
    ///
    /// `EmptyKey` / `OversizedKey` when the key violates the format bound.
    /// Value limits are a store configuration concern and checked there.
    pub fn put(
        timestamp_ms: u64,
        key: impl Into<String>,
        value: Vec<u8>,
    ) -> Result<Self, RecordError> {
        let key = key.into();
        Self::check_key(&key)?;
        Ok(Self {
            timestamp_ms,
            tombstone: false,
            key,
            value,
        })
    }

    /// Builds a delete marker. Tombstones always carry value size 0.
    pub fn tombstone(timestamp_ms: u64, key: impl Into<String>) -> Result<Self, RecordError> {
        let key = key.into();
        Self::check_key(&key)?;
        Ok(Self {
            timestamp_ms,
            tombstone: true,
            key,
            value: Vec::new(),
        })
    }

    fn check_key(key: &str) -> Result<(), RecordError> {
        if key.is_empty() {
            return Err(RecordError::EmptyKey);
        }
        if key.len() > MAX_KEY_SIZE {
            return Err(RecordError::OversizedKey { len: key.len() });
        }
        Ok(())
    }

    /// Total framed length of this record on disk.
    #[must_use]
    pub fn framed_len(&self) -> usize {
        framed_size(self.key.len(), self.value.len())
    }

    /// Serializes the record into a freshly allocated frame.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.framed_len());
        buf.extend_from_slice(&self.timestamp_ms.to_be_bytes());
        buf.push(u8::from(self.tombstone));
        buf.extend_from_slice(&(self.key.len() as u32).to_be_bytes());
        buf.extend_from_slice(&(self.value.len() as u32).to_be_bytes());
        buf.extend_from_slice(self.key.as_bytes());
        buf.extend_from_slice(&self.value);
        buf
    }

    /// Decodes one record from the front of `buf`.
    ///
    /// # Errors
    ///
    /// - `Truncated`: `buf` is shorter than the header or than the
    ///   header-declared framed length.
    /// - `EmptyKey` / `OversizedKey`: the declared key size violates the
    ///   format bound on an otherwise well-framed region.
    /// - `InvalidUtf8`: the key bytes are not valid UTF-8.
    pub fn decode(buf: &[u8]) -> Result<Self, RecordError> {
        let header = Header::decode(buf)?;

        let key_size = header.key_size as usize;
        if key_size == 0 {
            return Err(RecordError::EmptyKey);
        }
        if key_size > MAX_KEY_SIZE {
            return Err(RecordError::OversizedKey { len: key_size });
        }

        let framed = header.framed_len();
        if buf.len() < framed {
            return Err(RecordError::Truncated {
                expected: framed,
                actual: buf.len(),
            });
        }

        let key_bytes = &buf[HEADER_SIZE..HEADER_SIZE + key_size];
        let key = std::str::from_utf8(key_bytes)
            .map_err(|_| RecordError::InvalidUtf8)?
            .to_string();
        let value = buf[HEADER_SIZE + key_size..framed].to_vec();

        Ok(Self {
            timestamp_ms: header.timestamp_ms,
            tombstone: header.tombstone,
            key,
            value,
        })
    }
}
