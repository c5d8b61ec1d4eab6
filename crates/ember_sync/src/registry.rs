//! # Entity Registry
//!
//! The sole owner of remote entity lifetime. Entities are created and
//! destroyed here and nowhere else; the rendering side only reacts to the
//! notifications the reconciler emits.

use std::collections::BTreeMap;

use ember_shared::{ParticipantId, SimState};

/// Health a freshly spawned entity starts with.
pub const FULL_HEALTH: u8 = 100;

/// A remote participant as known to this client.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    /// Participant id.
    pub id: ParticipantId,
    /// Name shown above the avatar.
    pub display_name: String,
    /// Last host-reported simulation state.
    pub sim_state: SimState,
    /// Last host-reported health.
    pub health: u8,
}

impl Entity {
    /// Creates an entity at the origin with full health.
    pub fn new(id: ParticipantId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            sim_state: SimState::default(),
            health: FULL_HEALTH,
        }
    }
}

/// Result of [`EntityRegistry::spawn`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// A new entity was created.
    Created,
    /// The id was already present; its display name was overwritten.
    Resynced,
}

/// Entities keyed by participant id.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<ParticipantId, Entity>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
        }
    }

    /// Creates an entity, or overwrites the display name of an existing one.
    pub fn spawn(&mut self, id: ParticipantId, display_name: &str) -> SpawnOutcome {
        if let Some(entity) = self.entities.get_mut(&id) {
            display_name.clone_into(&mut entity.display_name);
            return SpawnOutcome::Resynced;
        }
        self.entities.insert(id, Entity::new(id, display_name));
        SpawnOutcome::Created
    }

    /// Removes an entity. Unknown ids are ignored.
    pub fn despawn(&mut self, id: ParticipantId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Returns an entity by id.
    #[must_use]
    pub fn get(&self, id: ParticipantId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Returns a mutable entity by id.
    pub fn get_mut(&mut self, id: ParticipantId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Returns true if the id is registered.
    #[must_use]
    pub fn contains(&self, id: ParticipantId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Returns the registered ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<ParticipantId> {
        self.entities.keys().copied().collect()
    }

    /// Iterates entities in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Returns the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if no entities are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Removes every entity.
    pub fn clear(&mut self) {
        self.entities.clear();
    }

    /// Removes and returns every entity in ascending id order.
    pub fn drain(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.entities).into_values().collect()
    }
}
