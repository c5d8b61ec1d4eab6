//! # Ember Shared
//!
//! Wire protocol spoken between the Ember client and the authoritative host.
//!
//! ## Message Layout
//!
//! ```text
//! ┌────────────┬──────────────────┬──────────────────────────────┐
//! │ Tag (u16)  │ Payload len (u32)│ Payload (field sequence)     │
//! └────────────┴──────────────────┴──────────────────────────────┘
//! ```
//!
//! Integers are fixed-width little-endian, strings are a `u16` byte length
//! followed by UTF-8, sequences are a `u16` count followed by the items.
//!
//! ## CRITICAL RULE
//!
//! This crate does no I/O. Transports live in `ember_sync`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod error;
pub mod protocol;

pub use constants::{DEFAULT_PORT, DEFAULT_TICK_RATE, ENVELOPE_HEADER_LEN, MAX_PAYLOAD_SIZE};
pub use error::{ProtocolError, ProtocolResult};
pub use protocol::{
    DeliveryMode, DespawnRecord, Envelope, HealthRecord, JoinSnapshot, ParticipantId,
    PayloadReader, PayloadWriter, SimState, SpawnRecord, StateRecord, Tag, TextMessage,
    TickDelta, WireRecord,
};
