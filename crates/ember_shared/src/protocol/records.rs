//! # Protocol Records
//!
//! Payload shapes carried by the recognized tags.

use bytemuck::{Pod, Zeroable};

use super::codec::{PayloadReader, PayloadWriter, WireRecord};
use crate::error::ProtocolResult;

/// Participant identifier, assigned by the host on join.
pub type ParticipantId = u16;

/// Simulation state of a remote entity.
///
/// The client never interprets this; it is stored and handed to observers
/// as-is.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SimState {
    /// World position.
    pub position: [f32; 3],
    /// Orientation quaternion (x, y, z, w).
    pub rotation: [f32; 4],
}

impl SimState {
    /// Creates a state at `position` with identity rotation.
    #[must_use]
    pub const fn at(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: [x, y, z],
            rotation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// A participant entering the game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpawnRecord {
    /// Participant id.
    pub id: ParticipantId,
    /// Name shown above the avatar.
    pub display_name: String,
}

impl SpawnRecord {
    /// Creates a spawn record.
    pub fn new(id: ParticipantId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// A participant leaving the game.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DespawnRecord {
    /// Participant id.
    pub id: ParticipantId,
}

/// New simulation state for one participant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateRecord {
    /// Participant id.
    pub id: ParticipantId,
    /// Replacement state.
    pub sim_state: SimState,
}

/// New health value for one participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthRecord {
    /// Participant id.
    pub id: ParticipantId,
    /// Health (0-255).
    pub health: u8,
}

/// Full state sent once after a join request is accepted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JoinSnapshot {
    /// Host tick at the moment of joining.
    pub server_tick_at_join: u32,
    /// Everyone already in the game.
    pub initial_entities: Vec<SpawnRecord>,
}

/// One host tick worth of incremental change.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickDelta {
    /// Host tick this delta was produced on.
    pub server_tick: u32,
    /// Participants that appeared.
    pub spawns: Vec<SpawnRecord>,
    /// Participants that left.
    pub despawns: Vec<DespawnRecord>,
    /// Simulation state changes.
    pub state_updates: Vec<StateRecord>,
    /// Health changes.
    pub health_updates: Vec<HealthRecord>,
}

impl TickDelta {
    /// Creates an empty delta for a host tick.
    #[must_use]
    pub const fn empty(server_tick: u32) -> Self {
        Self {
            server_tick,
            spawns: Vec::new(),
            despawns: Vec::new(),
            state_updates: Vec::new(),
            health_updates: Vec::new(),
        }
    }

    /// Returns true if the delta carries no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spawns.is_empty()
            && self.despawns.is_empty()
            && self.state_updates.is_empty()
            && self.health_updates.is_empty()
    }
}

/// Free-form text payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessage {
    /// The text.
    pub text: String,
}

impl WireRecord for SpawnRecord {
    fn write(&self, writer: &mut PayloadWriter) -> ProtocolResult<()> {
        writer.write_u16(self.id);
        writer.write_str(&self.display_name)
    }

    fn read(reader: &mut PayloadReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            id: reader.read_u16()?,
            display_name: reader.read_string()?,
        })
    }
}

impl WireRecord for DespawnRecord {
    fn write(&self, writer: &mut PayloadWriter) -> ProtocolResult<()> {
        writer.write_u16(self.id);
        Ok(())
    }

    fn read(reader: &mut PayloadReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            id: reader.read_u16()?,
        })
    }
}

impl WireRecord for StateRecord {
    fn write(&self, writer: &mut PayloadWriter) -> ProtocolResult<()> {
        writer.write_u16(self.id);
        writer.write_pod(&self.sim_state);
        Ok(())
    }

    fn read(reader: &mut PayloadReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            id: reader.read_u16()?,
            sim_state: reader.read_pod()?,
        })
    }
}

impl WireRecord for HealthRecord {
    fn write(&self, writer: &mut PayloadWriter) -> ProtocolResult<()> {
        writer.write_u16(self.id);
        writer.write_u8(self.health);
        Ok(())
    }

    fn read(reader: &mut PayloadReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            id: reader.read_u16()?,
            health: reader.read_u8()?,
        })
    }
}

impl WireRecord for JoinSnapshot {
    fn write(&self, writer: &mut PayloadWriter) -> ProtocolResult<()> {
        writer.write_u32(self.server_tick_at_join);
        writer.write_seq(&self.initial_entities)
    }

    fn read(reader: &mut PayloadReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            server_tick_at_join: reader.read_u32()?,
            initial_entities: reader.read_seq()?,
        })
    }
}

impl WireRecord for TickDelta {
    fn write(&self, writer: &mut PayloadWriter) -> ProtocolResult<()> {
        writer.write_u32(self.server_tick);
        writer.write_seq(&self.spawns)?;
        writer.write_seq(&self.despawns)?;
        writer.write_seq(&self.state_updates)?;
        writer.write_seq(&self.health_updates)
    }

    fn read(reader: &mut PayloadReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            server_tick: reader.read_u32()?,
            spawns: reader.read_seq()?,
            despawns: reader.read_seq()?,
            state_updates: reader.read_seq()?,
            health_updates: reader.read_seq()?,
        })
    }
}

impl WireRecord for TextMessage {
    fn write(&self, writer: &mut PayloadWriter) -> ProtocolResult<()> {
        writer.write_str(&self.text)
    }

    fn read(reader: &mut PayloadReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            text: reader.read_string()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Envelope, Tag};
    use crate::ProtocolError;

    #[test]
    fn test_sim_state_is_28_bytes() {
        assert_eq!(std::mem::size_of::<SimState>(), 28);
    }

    #[test]
    fn test_tick_delta_through_envelope() {
        let delta = TickDelta {
            server_tick: 51,
            spawns: vec![SpawnRecord::new(3, "Cara")],
            despawns: vec![DespawnRecord { id: 2 }],
            state_updates: vec![StateRecord {
                id: 1,
                sim_state: SimState::at(4.0, 0.5, -2.0),
            }],
            health_updates: vec![HealthRecord { id: 1, health: 80 }],
        };

        let envelope = Envelope::from_record(Tag::TICK_UPDATE, &delta).unwrap();
        let decoded: TickDelta = envelope.read().unwrap();

        assert_eq!(decoded, delta);
    }

    #[test]
    fn test_join_snapshot_layout() {
        let snapshot = JoinSnapshot {
            server_tick_at_join: 50,
            initial_entities: vec![SpawnRecord::new(1, "Al")],
        };
        let envelope = Envelope::from_record(Tag::JOIN_ACCEPT, &snapshot).unwrap();

        // tick(4) + count(2) + id(2) + name len(2) + "Al"(2)
        assert_eq!(envelope.payload.len(), 12);
        assert_eq!(&envelope.payload[..4], &50u32.to_le_bytes());
    }

    #[test]
    fn test_truncated_delta_rejected() {
        let delta = TickDelta {
            server_tick: 9,
            health_updates: vec![HealthRecord { id: 4, health: 10 }],
            ..TickDelta::empty(9)
        };
        let mut envelope = Envelope::from_record(Tag::TICK_UPDATE, &delta).unwrap();
        envelope.payload.truncate(envelope.payload.len() - 1);

        assert!(matches!(
            envelope.read::<TickDelta>(),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_empty_delta() {
        assert!(TickDelta::empty(3).is_empty());
    }
}
