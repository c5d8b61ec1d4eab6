//! # Payload Codec
//!
//! Field-sequence serialization for message payloads.
//!
//! ## Design
//!
//! - Fixed-width little-endian integers
//! - Strings as `u16` byte length + UTF-8
//! - Sequences as `u16` count + items
//! - Pod types copied byte-for-byte (`bytemuck`)

use bytemuck::{bytes_of, Pod};

use crate::error::{ProtocolError, ProtocolResult};

/// A record with a fixed payload shape.
pub trait WireRecord: Sized {
    /// Appends this record's fields to the writer.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] if a string or sequence
    /// does not fit its length prefix.
    fn write(&self, writer: &mut PayloadWriter) -> ProtocolResult<()>;

    /// Reads one record from the reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the fields are truncated or malformed.
    fn read(reader: &mut PayloadReader<'_>) -> ProtocolResult<Self>;
}

/// Payload writer - appends fields to a growable buffer.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buffer: Vec<u8>,
}

impl PayloadWriter {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates a writer with a pre-allocated buffer.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer and returns the payload bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a f32 in little-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a Pod type directly.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        self.buffer.extend_from_slice(bytes_of(value));
    }

    /// Writes a sequence length prefix.
    ///
    /// # Errors
    ///
    /// Fails if `len` does not fit in a `u16`.
    #[inline]
    pub fn write_len(&mut self, len: usize) -> ProtocolResult<()> {
        let prefix = u16::try_from(len).map_err(|_| ProtocolError::PayloadTooLarge {
            size: len,
            limit: usize::from(u16::MAX),
        })?;
        self.write_u16(prefix);
        Ok(())
    }

    /// Writes a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Fails if the encoded string is longer than `u16::MAX` bytes.
    pub fn write_str(&mut self, value: &str) -> ProtocolResult<()> {
        self.write_len(value.len())?;
        self.buffer.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Writes a count-prefixed sequence of records.
    ///
    /// # Errors
    ///
    /// Fails if the sequence or one of its records does not fit.
    pub fn write_seq<T: WireRecord>(&mut self, items: &[T]) -> ProtocolResult<()> {
        self.write_len(items.len())?;
        for item in items {
            item.write(self)?;
        }
        Ok(())
    }
}

/// Payload reader - reads fields from a borrowed buffer.
pub struct PayloadReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> PayloadReader<'a> {
    /// Creates a new reader over a payload.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Takes the next `len` bytes.
    fn take(&mut self, len: usize) -> ProtocolResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(ProtocolError::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Takes exactly `N` bytes as an array.
    fn take_array<const N: usize>(&mut self) -> ProtocolResult<[u8; N]> {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(self.take(N)?);
        Ok(bytes)
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Fails if the payload is exhausted.
    #[inline]
    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Reads a u16 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails if fewer than 2 bytes remain.
    #[inline]
    pub fn read_u16(&mut self) -> ProtocolResult<u16> {
        self.take_array().map(u16::from_le_bytes)
    }

    /// Reads a u32 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails if fewer than 4 bytes remain.
    #[inline]
    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        self.take_array().map(u32::from_le_bytes)
    }

    /// Reads a f32 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails if fewer than 4 bytes remain.
    #[inline]
    pub fn read_f32(&mut self) -> ProtocolResult<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads a Pod type directly.
    ///
    /// # Errors
    ///
    /// Fails if the payload is shorter than `size_of::<T>()`.
    #[inline]
    pub fn read_pod<T: Pod>(&mut self) -> ProtocolResult<T> {
        let size = std::mem::size_of::<T>();
        let slice = self.take(size)?;
        Ok(bytemuck::pod_read_unaligned(slice))
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Fails on truncation or invalid UTF-8.
    pub fn read_string(&mut self) -> ProtocolResult<String> {
        let len = usize::from(self.read_u16()?);
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Reads a count-prefixed sequence of records.
    ///
    /// # Errors
    ///
    /// Fails if any record fails to read.
    pub fn read_seq<T: WireRecord>(&mut self) -> ProtocolResult<Vec<T>> {
        let count = usize::from(self.read_u16()?);
        // The count is untrusted; don't pre-allocate more than could fit.
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(T::read(self)?);
        }
        Ok(items)
    }

    /// Ensures the whole payload was consumed.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TrailingBytes`] if bytes are left over.
    pub fn finish(&self) -> ProtocolResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}
