//! # Entity Observers
//!
//! The seam between reconciliation and whatever presents entities (avatars,
//! name tags, health bars). The reconciler calls these after every registry
//! change; observers never touch the registry themselves.
//!
//! ```text
//! Reconciler ──► EntityObserver ──► (render thread, UI, tests)
//! ```

use crossbeam_channel::{Receiver, Sender, TrySendError};
use ember_shared::{ParticipantId, SimState};

/// Receives registry change notifications on the simulation thread.
///
/// Every method has an empty default so implementors only pick what they
/// present.
pub trait EntityObserver {
    /// A new remote entity was created.
    fn on_entity_spawned(&mut self, _id: ParticipantId, _display_name: &str) {}

    /// A spawn named an entity that already exists; its display name was
    /// overwritten.
    fn on_entity_resynced(&mut self, _id: ParticipantId, _display_name: &str) {}

    /// A remote entity was destroyed.
    fn on_entity_despawned(&mut self, _id: ParticipantId) {}

    /// A remote entity's simulation state was replaced.
    fn on_entity_state_changed(&mut self, _id: ParticipantId, _sim_state: &SimState) {}

    /// A remote entity's health changed.
    fn on_entity_health_changed(&mut self, _id: ParticipantId, _health: u8) {}
}

/// Observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl EntityObserver for NullObserver {}

/// An owned notification, for observers that queue or forward.
#[derive(Clone, Debug, PartialEq)]
pub enum EntityEvent {
    /// See [`EntityObserver::on_entity_spawned`].
    Spawned {
        /// Participant id.
        id: ParticipantId,
        /// Display name.
        display_name: String,
    },
    /// See [`EntityObserver::on_entity_resynced`].
    Resynced {
        /// Participant id.
        id: ParticipantId,
        /// Display name.
        display_name: String,
    },
    /// See [`EntityObserver::on_entity_despawned`].
    Despawned {
        /// Participant id.
        id: ParticipantId,
    },
    /// See [`EntityObserver::on_entity_state_changed`].
    StateChanged {
        /// Participant id.
        id: ParticipantId,
        /// New state.
        sim_state: SimState,
    },
    /// See [`EntityObserver::on_entity_health_changed`].
    HealthChanged {
        /// Participant id.
        id: ParticipantId,
        /// New health.
        health: u8,
    },
}

impl EntityEvent {
    /// Returns the participant this event concerns.
    #[must_use]
    pub const fn id(&self) -> ParticipantId {
        match self {
            Self::Spawned { id, .. }
            | Self::Resynced { id, .. }
            | Self::Despawned { id }
            | Self::StateChanged { id, .. }
            | Self::HealthChanged { id, .. } => *id,
        }
    }
}

/// Observer that records every notification in order.
#[derive(Clone, Debug, Default)]
pub struct RecordingObserver {
    events: Vec<EntityEvent>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Returns the recorded events.
    #[must_use]
    pub fn events(&self) -> &[EntityEvent] {
        &self.events
    }

    /// Removes and returns the recorded events.
    pub fn take_events(&mut self) -> Vec<EntityEvent> {
        std::mem::take(&mut self.events)
    }
}

impl EntityObserver for RecordingObserver {
    fn on_entity_spawned(&mut self, id: ParticipantId, display_name: &str) {
        self.events.push(EntityEvent::Spawned {
            id,
            display_name: display_name.to_owned(),
        });
    }

    fn on_entity_resynced(&mut self, id: ParticipantId, display_name: &str) {
        self.events.push(EntityEvent::Resynced {
            id,
            display_name: display_name.to_owned(),
        });
    }

    fn on_entity_despawned(&mut self, id: ParticipantId) {
        self.events.push(EntityEvent::Despawned { id });
    }

    fn on_entity_state_changed(&mut self, id: ParticipantId, sim_state: &SimState) {
        self.events.push(EntityEvent::StateChanged {
            id,
            sim_state: *sim_state,
        });
    }

    fn on_entity_health_changed(&mut self, id: ParticipantId, health: u8) {
        self.events.push(EntityEvent::HealthChanged { id, health });
    }
}

/// Observer that forwards events to another thread over a bounded channel.
///
/// Never blocks the simulation: when the channel is full the event is
/// dropped and counted.
pub struct ChannelObserver {
    sender: Sender<EntityEvent>,
    dropped: u64,
}

impl ChannelObserver {
    /// Creates an observer and the receiving end for the presenting thread.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<EntityEvent>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        (Self { sender, dropped: 0 }, receiver)
    }

    /// Returns how many events were dropped because the channel was full.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    fn forward(&mut self, event: EntityEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped += 1;
                tracing::warn!(id = event.id(), "entity event channel full, event dropped");
            }
            // Receiver gone: nobody is presenting anymore
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl EntityObserver for ChannelObserver {
    fn on_entity_spawned(&mut self, id: ParticipantId, display_name: &str) {
        self.forward(EntityEvent::Spawned {
            id,
            display_name: display_name.to_owned(),
        });
    }

    fn on_entity_resynced(&mut self, id: ParticipantId, display_name: &str) {
        self.forward(EntityEvent::Resynced {
            id,
            display_name: display_name.to_owned(),
        });
    }

    fn on_entity_despawned(&mut self, id: ParticipantId) {
        self.forward(EntityEvent::Despawned { id });
    }

    fn on_entity_state_changed(&mut self, id: ParticipantId, sim_state: &SimState) {
        self.forward(EntityEvent::StateChanged {
            id,
            sim_state: *sim_state,
        });
    }

    fn on_entity_health_changed(&mut self, id: ParticipantId, health: u8) {
        self.forward(EntityEvent::HealthChanged { id, health });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_keeps_order() {
        let mut observer = RecordingObserver::new();
        observer.on_entity_spawned(1, "Alice");
        observer.on_entity_health_changed(1, 80);
        observer.on_entity_despawned(1);

        assert_eq!(
            observer.take_events(),
            vec![
                EntityEvent::Spawned {
                    id: 1,
                    display_name: "Alice".to_owned()
                },
                EntityEvent::HealthChanged { id: 1, health: 80 },
                EntityEvent::Despawned { id: 1 },
            ]
        );
        assert!(observer.events().is_empty());
    }

    #[test]
    fn test_channel_observer_forwards() {
        let (mut observer, receiver) = ChannelObserver::new(8);
        observer.on_entity_spawned(3, "Cara");
        observer.on_entity_state_changed(3, &SimState::at(1.0, 2.0, 3.0));

        assert_eq!(receiver.try_recv().unwrap().id(), 3);
        assert!(matches!(
            receiver.try_recv().unwrap(),
            EntityEvent::StateChanged { sim_state, .. } if sim_state.position == [1.0, 2.0, 3.0]
        ));
    }

    #[test]
    fn test_channel_observer_drops_when_full() {
        let (mut observer, receiver) = ChannelObserver::new(1);
        observer.on_entity_despawned(1);
        observer.on_entity_despawned(2);

        assert_eq!(observer.dropped(), 1);
        assert_eq!(receiver.len(), 1);
    }
}
