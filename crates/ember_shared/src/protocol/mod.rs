//! # Network Protocol
//!
//! Tagged messages with length-prefixed field payloads.
//!
//! ## Recognized Tags
//!
//! ```text
//! ┌──────┬──────────────┬──────────────┬──────────────────┐
//! │ Tag  │ Name         │ Direction    │ Payload          │
//! ├──────┼──────────────┼──────────────┼──────────────────┤
//! │ 0    │ Text         │ both         │ TextMessage      │
//! │ 1    │ JoinRequest  │ client→host  │ (empty)          │
//! │ 2    │ JoinAccept   │ host→client  │ JoinSnapshot     │
//! │ 3    │ TickUpdate   │ host→client  │ TickDelta        │
//! └──────┴──────────────┴──────────────┴──────────────────┘
//! ```

mod codec;
mod envelope;
mod records;

pub use codec::{PayloadReader, PayloadWriter, WireRecord};
pub use envelope::{DeliveryMode, Envelope, Tag};
pub use records::{
    DespawnRecord, HealthRecord, JoinSnapshot, ParticipantId, SimState, SpawnRecord,
    StateRecord, TextMessage, TickDelta,
};
