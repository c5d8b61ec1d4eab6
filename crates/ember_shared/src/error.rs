//! # Protocol Error Types
//!
//! Everything that can go wrong while encoding or decoding a message.

use thiserror::Error;

/// Errors raised by the payload codec and the envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The buffer ended before the field was complete.
    #[error("truncated message: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes required by the field being read.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A string field did not contain valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// The record was fully read but bytes were left over.
    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),

    /// A field or payload exceeds what the wire format can express.
    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge {
        /// Actual size.
        size: usize,
        /// Allowed size.
        limit: usize,
    },
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
