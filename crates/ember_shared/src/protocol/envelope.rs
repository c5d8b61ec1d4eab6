//! # Message Envelope
//!
//! The 2-field `(tag, payload)` wrapper every message travels in.

use super::codec::{PayloadReader, PayloadWriter, WireRecord};
use crate::constants::{ENVELOPE_HEADER_LEN, MAX_PAYLOAD_SIZE};
use crate::error::{ProtocolError, ProtocolResult};

/// Numeric message tag.
///
/// Unrecognized values are legal on the wire; the client forwards them to
/// external handlers untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u16);

impl Tag {
    /// Free-form text, used by chat-style consumers.
    pub const TEXT: Self = Self(0);
    /// Client asks the host to join the running game.
    pub const JOIN_REQUEST: Self = Self(1);
    /// Host accepts a join and sends the full state.
    pub const JOIN_ACCEPT: Self = Self(2);
    /// Host sends one tick worth of changes.
    pub const TICK_UPDATE: Self = Self(3);

    /// Returns a human readable name for logging.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self.0 {
            0 => "Text",
            1 => "JoinRequest",
            2 => "JoinAccept",
            3 => "TickUpdate",
            _ => "Unknown",
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

/// How the transport should deliver an outgoing message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Delivered once, in order. Required for handshakes.
    #[default]
    Reliable,
    /// Best effort. May be dropped or reordered.
    Unreliable,
}

/// A tagged message with an opaque payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Message tag.
    pub tag: Tag,
    /// Encoded payload.
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Creates an envelope from raw parts.
    #[must_use]
    pub const fn new(tag: Tag, payload: Vec<u8>) -> Self {
        Self { tag, payload }
    }

    /// Creates an envelope with no payload.
    #[must_use]
    pub const fn empty(tag: Tag) -> Self {
        Self::new(tag, Vec::new())
    }

    /// Encodes a record into a new envelope.
    ///
    /// # Errors
    ///
    /// Fails if the record does not fit the wire format.
    pub fn from_record<R: WireRecord>(tag: Tag, record: &R) -> ProtocolResult<Self> {
        let mut writer = PayloadWriter::with_capacity(64);
        record.write(&mut writer)?;
        if writer.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: writer.len(),
                limit: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self::new(tag, writer.into_bytes()))
    }

    /// Deserializes the payload as a fixed record shape.
    ///
    /// The whole payload must be consumed.
    ///
    /// # Errors
    ///
    /// Fails if the payload is truncated, malformed or has trailing bytes.
    pub fn read<R: WireRecord>(&self) -> ProtocolResult<R> {
        let mut reader = PayloadReader::new(&self.payload);
        let record = R::read(&mut reader)?;
        reader.finish()?;
        Ok(record)
    }

    /// Encodes the envelope as `[tag u16][len u32][payload]`.
    ///
    /// # Errors
    ///
    /// Fails if the payload exceeds [`MAX_PAYLOAD_SIZE`].
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let len = self.payload.len();
        if len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: len,
                limit: MAX_PAYLOAD_SIZE,
            });
        }
        let mut writer = PayloadWriter::with_capacity(ENVELOPE_HEADER_LEN + len);
        writer.write_u16(self.tag.0);
        // Bounded by MAX_PAYLOAD_SIZE above
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32(len as u32);
        let mut bytes = writer.into_bytes();
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }

    /// Decodes one complete envelope.
    ///
    /// # Errors
    ///
    /// Fails if the header is truncated, the declared length is too large
    /// or does not match the remaining bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut reader = PayloadReader::new(bytes);
        let (tag, len) = Self::decode_header(&mut reader)?;
        if reader.remaining() < len {
            return Err(ProtocolError::Truncated {
                needed: len,
                remaining: reader.remaining(),
            });
        }
        if reader.remaining() > len {
            return Err(ProtocolError::TrailingBytes(reader.remaining() - len));
        }
        Ok(Self::new(tag, bytes[ENVELOPE_HEADER_LEN..].to_vec()))
    }

    /// Parses the 6-byte header, returning the tag and payload length.
    ///
    /// Stream transports use this to size the next read.
    ///
    /// # Errors
    ///
    /// Fails if fewer than 6 bytes are given or the length is too large.
    pub fn parse_header(header: &[u8]) -> ProtocolResult<(Tag, usize)> {
        Self::decode_header(&mut PayloadReader::new(header))
    }

    fn decode_header(reader: &mut PayloadReader<'_>) -> ProtocolResult<(Tag, usize)> {
        let tag = Tag(reader.read_u16()?);
        let len = reader.read_u32()? as usize;
        if len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: len,
                limit: MAX_PAYLOAD_SIZE,
            });
        }
        Ok((tag, len))
    }
}
