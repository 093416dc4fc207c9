//! Big-endian primitives for the on-disk log.
//!
//! Writing goes through [`Encode`], which appends to a `Vec<u8>`.  Reading
//! goes through a [`Reader`] cursor over a borrowed buffer: every read
//! either returns the decoded value and advances, or fails with
//! [`EncodingError::UnexpectedEof`] describing how many bytes were missing.
//! The cursor position is what the record layer reports as the offset of
//! corrupt data.
//!
//! # Layout
//!
//! | Rust type  | Bytes                                   |
//! |------------|-----------------------------------------|
//! | `u8`       | 1                                       |
//! | `u32`      | 4, big-endian                           |
//! | `bool`     | 1, strictly `0x00` or `0x01`            |
//! | `[u8]`     | `u32` length, then the bytes            |
//!
//! Nothing here panics on malformed input.


use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Failure to encode or decode a primitive.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The buffer ended in the middle of a value.
    #[error("truncated input: wanted {needed} bytes, {available} left")]
    UnexpectedEof {
        /// Bytes the value required.
        needed: usize,
        /// Bytes that were left in the buffer.
        available: usize,
    },

    /// A flag byte was neither `0x00` nor `0x01`.
    #[error("invalid flag byte 0x{0:02X}")]
    InvalidBool(u8),

    /// A length does not fit the 4-byte length field.
    #[error("length overflow: {0}")]
    LengthOverflow(String),
}

// ------------------------------------------------------------------------------------------------
// Writing
// ------------------------------------------------------------------------------------------------

/// Types that append a fixed binary form of themselves to a buffer.
pub trait Encode {
    /// Appends `self` to `buf`.
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError>;
}

impl Encode for u8 {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.push(*self);
        Ok(())
    }
}

impl Encode for u32 {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.extend_from_slice(&self.to_be_bytes());
        Ok(())
    }
}

impl Encode for bool {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        u8::from(*self).encode_to(buf)
    }
}

impl Encode for [u8] {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        len_to_u32(self.len())?.encode_to(buf)?;
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl Encode for Vec<u8> {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.as_slice().encode_to(buf)
    }
}

/// Encodes `value` into a new buffer.
pub fn encode_to_vec<T: Encode + ?Sized>(value: &T) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    value.encode_to(&mut buf)?;
    Ok(buf)
}

/// Narrows an in-memory length to the on-disk `u32` length field.
pub fn len_to_u32(len: usize) -> Result<u32, EncodingError> {
    u32::try_from(len)
        .map_err(|_| EncodingError::LengthOverflow(format!("{len} bytes exceeds u32::MAX")))
}

// ------------------------------------------------------------------------------------------------
// Reading
// ------------------------------------------------------------------------------------------------

/// Forward-only cursor over an encoded buffer.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Starts reading at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns `true` once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consumes exactly `n` bytes.
    ///
    /// The check happens before any slicing, so an absurd declared length
    /// never allocates.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], EncodingError> {
        let available = self.remaining();
        if n > available {
            return Err(EncodingError::UnexpectedEof {
                needed: n,
                available,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Decodes one `T` at the cursor.
    pub fn read<T: Decode>(&mut self) -> Result<T, EncodingError> {
        T::decode(self)
    }
}

/// Types that can be read back from a [`Reader`].
pub trait Decode: Sized {
    /// Reads one value, advancing `reader` past it.
    fn decode(reader: &mut Reader<'_>) -> Result<Self, EncodingError>;
}

impl Decode for u8 {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, EncodingError> {
        Ok(reader.take(1)?[0])
    }
}

impl Decode for u32 {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, EncodingError> {
        let bytes = reader.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl Decode for bool {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, EncodingError> {
        match reader.read::<u8>()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(EncodingError::InvalidBool(other)),
        }
    }
}

impl Decode for Vec<u8> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, EncodingError> {
        let len = reader.read::<u32>()? as usize;
        Ok(reader.take(len)?.to_vec())
    }
}

/// Decodes one `T` from the start of `buf`, returning it with the number
/// of bytes consumed.
pub fn decode_from_slice<T: Decode>(buf: &[u8]) -> Result<(T, usize), EncodingError> {
    let mut reader = Reader::new(buf);
    let value = reader.read::<T>()?;
    Ok((value, reader.position()))
}
