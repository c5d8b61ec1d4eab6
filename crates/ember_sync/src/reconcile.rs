//! # Reconciler
//!
//! Turns an ordered stream of host deltas into registry changes.
//!
//! ## Order of Operations
//!
//! Deltas are applied in arrival order. Within one delta:
//!
//! ```text
//! spawns → despawns → state updates → health updates
//! ```
//!
//! Spawning first means an update can reference an entity introduced by the
//! same delta. Despawning before updates means nothing writes to an entity
//! removed by the same delta.
//!
//! References to unknown ids are ignored: the entity was either removed
//! earlier in the same delta or raced with a local departure.

use ember_shared::{JoinSnapshot, ParticipantId, SpawnRecord, TickDelta};

use crate::config::StaleDeltaPolicy;
use crate::observer::EntityObserver;
use crate::registry::{EntityRegistry, SpawnOutcome};

/// What a reconciliation pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Deltas applied.
    pub deltas_applied: u32,
    /// Deltas rejected by the stale-delta policy.
    pub stale_dropped: u32,
    /// Entities created.
    pub spawned: u32,
    /// Spawns for ids already present.
    pub resynced: u32,
    /// Spawns naming the local participant, skipped.
    pub local_filtered: u32,
    /// Entities removed.
    pub despawned: u32,
    /// State updates applied.
    pub state_updates: u32,
    /// Health updates applied.
    pub health_updates: u32,
    /// Despawns or updates naming an unknown id.
    pub unknown_ids: u32,
}

impl ReconcileReport {
    /// Returns true if the registry was not touched.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.spawned == 0
            && self.resynced == 0
            && self.despawned == 0
            && self.state_updates == 0
            && self.health_updates == 0
    }

    /// Adds another report's counters to this one.
    pub fn merge(&mut self, other: &Self) {
        self.deltas_applied += other.deltas_applied;
        self.stale_dropped += other.stale_dropped;
        self.spawned += other.spawned;
        self.resynced += other.resynced;
        self.local_filtered += other.local_filtered;
        self.despawned += other.despawned;
        self.state_updates += other.state_updates;
        self.health_updates += other.health_updates;
        self.unknown_ids += other.unknown_ids;
    }
}

/// Applies join snapshots and tick deltas to the entity registry.
#[derive(Debug, Default)]
pub struct Reconciler {
    registry: EntityRegistry,
    policy: StaleDeltaPolicy,
    /// `None` until a join snapshot or a first delta has been applied.
    last_server_tick: Option<u32>,
}

impl Reconciler {
    /// Creates a reconciler with an empty registry.
    #[must_use]
    pub const fn new(policy: StaleDeltaPolicy) -> Self {
        Self {
            registry: EntityRegistry::new(),
            policy,
            last_server_tick: None,
        }
    }

    /// Returns the entity registry.
    #[must_use]
    pub const fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Returns the stale-delta policy.
    #[must_use]
    pub const fn policy(&self) -> StaleDeltaPolicy {
        self.policy
    }

    /// Host tick of the last applied snapshot or delta, 0 before any.
    #[must_use]
    pub fn last_received_server_tick(&self) -> u32 {
        self.last_server_tick.unwrap_or(0)
    }

    /// Materializes a join snapshot.
    ///
    /// The snapshot is full state: entities it does not list are despawned,
    /// listed ones are spawned or resynced.
    pub fn apply_join<O: EntityObserver>(
        &mut self,
        snapshot: &JoinSnapshot,
        local_id: Option<ParticipantId>,
        observer: &mut O,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let listed = |id: ParticipantId| snapshot.initial_entities.iter().any(|s| s.id == id);
        for id in self.registry.ids() {
            if !listed(id) || Some(id) == local_id {
                self.registry.despawn(id);
                observer.on_entity_despawned(id);
                report.despawned += 1;
            }
        }

        for spawn in &snapshot.initial_entities {
            self.spawn(spawn, local_id, observer, &mut report);
        }

        self.last_server_tick = Some(snapshot.server_tick_at_join);
        report
    }

    /// Applies drained deltas in arrival order.
    pub fn apply_all<O: EntityObserver>(
        &mut self,
        deltas: impl IntoIterator<Item = TickDelta>,
        local_id: Option<ParticipantId>,
        observer: &mut O,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for delta in deltas {
            self.apply_delta(&delta, local_id, observer, &mut report);
        }
        report
    }

    /// Applies one delta, subject to the stale-delta policy.
    ///
    /// Returns false if the delta was rejected.
    pub fn apply_delta<O: EntityObserver>(
        &mut self,
        delta: &TickDelta,
        local_id: Option<ParticipantId>,
        observer: &mut O,
        report: &mut ReconcileReport,
    ) -> bool {
        if self.is_stale(delta.server_tick) {
            report.stale_dropped += 1;
            tracing::debug!(
                server_tick = delta.server_tick,
                last = self.last_received_server_tick(),
                "stale delta dropped"
            );
            return false;
        }

        for spawn in &delta.spawns {
            self.spawn(spawn, local_id, observer, report);
        }

        for despawn in &delta.despawns {
            if self.registry.despawn(despawn.id).is_some() {
                observer.on_entity_despawned(despawn.id);
                report.despawned += 1;
            } else {
                report.unknown_ids += 1;
            }
        }

        for update in &delta.state_updates {
            if let Some(entity) = self.registry.get_mut(update.id) {
                entity.sim_state = update.sim_state;
                observer.on_entity_state_changed(update.id, &update.sim_state);
                report.state_updates += 1;
            } else {
                report.unknown_ids += 1;
            }
        }

        for update in &delta.health_updates {
            if let Some(entity) = self.registry.get_mut(update.id) {
                entity.health = update.health;
                observer.on_entity_health_changed(update.id, update.health);
                report.health_updates += 1;
            } else {
                report.unknown_ids += 1;
            }
        }

        self.last_server_tick = Some(delta.server_tick);
        report.deltas_applied += 1;
        true
    }

    /// Despawns every entity, notifying the observer for each.
    pub fn despawn_all<O: EntityObserver>(&mut self, observer: &mut O) -> usize {
        let removed = self.registry.drain();
        for entity in &removed {
            observer.on_entity_despawned(entity.id);
        }
        removed.len()
    }

    fn is_stale(&self, server_tick: u32) -> bool {
        match (self.policy, self.last_server_tick) {
            (StaleDeltaPolicy::Drop, Some(last)) => server_tick <= last,
            _ => false,
        }
    }

    fn spawn<O: EntityObserver>(
        &mut self,
        spawn: &SpawnRecord,
        local_id: Option<ParticipantId>,
        observer: &mut O,
        report: &mut ReconcileReport,
    ) {
        if Some(spawn.id) == local_id {
            report.local_filtered += 1;
            return;
        }
        match self.registry.spawn(spawn.id, &spawn.display_name) {
            SpawnOutcome::Created => {
                observer.on_entity_spawned(spawn.id, &spawn.display_name);
                report.spawned += 1;
            }
            SpawnOutcome::Resynced => {
                tracing::debug!(id = spawn.id, "spawn for present entity, resynced");
                observer.on_entity_resynced(spawn.id, &spawn.display_name);
                report.resynced += 1;
            }
        }
    }
}
