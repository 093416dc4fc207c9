//! # Record codec
//!
//! A [`Record`] is the unit of durability: one entry appended to the log
//! for every `put` and every delete.
//!
//! # On-disk layout
//!
//! ```text
//! [TOMBSTONE u8][KEY_LEN u32 BE][KEY BYTES][VALUE_LEN u32 BE][VALUE BYTES]
//! ```
//!
//! - **Tombstone**: `0` for a live record, `1` for a delete marker.
//! - **Lengths**: 4-byte big-endian; keys and values are limited to
//!   `u32::MAX` bytes each.
//!
//! There is no per-record checksum and no file-level header: the log is a
//! plain concatenation of records.  A record whose declared lengths run
//! past the end of the buffer is reported as [`RecordError::Corrupt`]
//! together with the offset where the record starts.

#[cfg(test)]
mod tests;

use crate::encoding::{self, Decode, Encode, EncodingError, Reader};
use thiserror::Error;

/// Fixed framing overhead of a record: flag byte plus two length fields.
pub const RECORD_OVERHEAD: usize = 1 + 4 + 4;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by record encoding and decoding.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The bytes at `offset` do not form a complete, well-formed record.
    #[error("corrupt record at offset {offset}: {reason}")]
    Corrupt {
        /// Byte offset of the first byte of the offending record.
        offset: usize,
        /// Underlying decoding failure.
        reason: EncodingError,
    },

    /// Key or value length cannot be represented in the 4-byte length field.
    #[error("record too large: {0}")]
    TooLarge(String),
}

// ------------------------------------------------------------------------------------------------
// Record
// ------------------------------------------------------------------------------------------------

/// A single log record.
///
/// Later records for the same key supersede earlier ones during replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// `true` if this record marks `key` as deleted.
    pub tombstone: bool,

    /// Record key.
    pub key: Vec<u8>,

    /// Record value. Always empty for tombstones written by this crate.
    pub value: Vec<u8>,
}

impl Record {
    /// Creates a live record that sets `key` to `value`.
    pub fn live(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            tombstone: false,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a delete marker for `key`.
    pub fn tombstone(key: impl Into<Vec<u8>>) -> Self {
        Self {
            tombstone: true,
            key: key.into(),
            value: Vec::new(),
        }
    }

    /// Number of bytes this record occupies on disk.
    pub fn encoded_len(&self) -> usize {
        RECORD_OVERHEAD + self.key.len() + self.value.len()
    }

    /// Appends the encoded record to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), RecordError> {
        encode_record(self.tombstone, &self.key, &self.value, buf)
    }

    /// Encodes the record into a freshly-allocated buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RecordError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Decodes one record starting at `buf[offset]`.
    ///
    /// Returns the record and the offset of the byte following it.
    pub fn decode_at(buf: &[u8], offset: usize) -> Result<(Self, usize), RecordError> {
        let mut reader = Reader::new(buf.get(offset..).unwrap_or_default());
        let record = reader
            .read::<Record>()
            .map_err(|reason| RecordError::Corrupt { offset, reason })?;
        Ok((record, offset + reader.position()))
    }
}

/// Appends an encoded record built from borrowed parts to `buf`.
///
/// Both lengths are validated before any byte is pushed, so on error
/// `buf` is left untouched.
pub fn encode_record(
    tombstone: bool,
    key: &[u8],
    value: &[u8],
    buf: &mut Vec<u8>,
) -> Result<(), RecordError> {
    encoding::len_to_u32(key.len()).map_err(|e| RecordError::TooLarge(format!("key: {e}")))?;
    encoding::len_to_u32(value.len()).map_err(|e| RecordError::TooLarge(format!("value: {e}")))?;

    buf.reserve(RECORD_OVERHEAD + key.len() + value.len());
    let framed = tombstone
        .encode_to(buf)
        .and_then(|_| key.encode_to(buf))
        .and_then(|_| value.encode_to(buf));
    framed.map_err(|e| RecordError::TooLarge(e.to_string()))
}

impl Decode for Record {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, EncodingError> {
        Ok(Record {
            tombstone: reader.read()?,
            key: reader.read()?,
            value: reader.read()?,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// RecordIter
// ------------------------------------------------------------------------------------------------

/// Iterator over the records of an in-memory log image, in file order.
///
/// Yields `Err` for the first malformed record and then stops.
pub struct RecordIter<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> RecordIter<'a> {
    /// Creates an iterator over `buf`, starting at offset 0.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            failed: false,
        }
    }

    /// Offset of the next record to be decoded.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for RecordIter<'_> {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }

        match Record::decode_at(self.buf, self.offset) {
            Ok((record, next)) => {
                self.offset = next;
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
