//! # Session Context
//!
//! Two halves of one client session, one per execution context:
//!
//! ```text
//! Network task                         Simulation loop
//! ────────────                         ───────────────
//! MessageRouter ──► SessionInbox ◄──── GameSession::fixed_update
//!                   │ pending join      │ registry
//!                   │ update buffer     │ observer
//!                   │ disconnect flag   │ client tick
//! ```
//!
//! [`SessionInbox`] is the only state both contexts touch. The registry
//! lives in [`GameSession`] and is only ever reached from the simulation
//! loop.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use ember_shared::{JoinSnapshot, ParticipantId, TickDelta};
use parking_lot::Mutex;

use crate::buffer::{PushOutcome, UpdateBuffer};
use crate::config::{BufferConfig, DisconnectPolicy, SyncConfig};
use crate::observer::{EntityObserver, NullObserver};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::registry::EntityRegistry;

const NO_PARTICIPANT: u32 = u32::MAX;

/// Cross-context hand-off for one session.
pub struct SessionInbox {
    updates: UpdateBuffer<TickDelta>,
    /// Lock order: `pending_join` before the buffer's own lock.
    pending_join: Mutex<Option<JoinSnapshot>>,
    disconnected: AtomicBool,
    local_participant: AtomicU32,
    bounded_drain: bool,
}

impl SessionInbox {
    /// Creates an open inbox.
    #[must_use]
    pub fn new(config: &BufferConfig) -> Self {
        Self {
            updates: UpdateBuffer::from_config(config),
            pending_join: Mutex::new(None),
            disconnected: AtomicBool::new(false),
            local_participant: AtomicU32::new(NO_PARTICIPANT),
            bounded_drain: config.max_batch.is_some(),
        }
    }

    /// Buffers a tick delta for the next fixed step.
    pub fn push_update(&self, delta: TickDelta) -> PushOutcome<TickDelta> {
        self.updates.push(delta)
    }

    /// Stores a join snapshot for the next fixed step.
    ///
    /// A newer snapshot replaces one not yet applied. Returns false if the
    /// inbox is closed.
    pub fn offer_join(&self, snapshot: JoinSnapshot) -> bool {
        let mut slot = self.pending_join.lock();
        if self.updates.is_closed() {
            return false;
        }
        *slot = Some(snapshot);
        true
    }

    /// Takes the pending join snapshot, if any.
    pub fn take_join(&self) -> Option<JoinSnapshot> {
        self.pending_join.lock().take()
    }

    /// Takes every buffered delta, oldest first.
    pub fn drain_updates(&self) -> Vec<TickDelta> {
        self.updates.drain()
    }

    /// Takes the deltas for one fixed step: all of them, or at most
    /// `max_batch` when the buffer config sets one.
    pub fn drain_step(&self) -> Vec<TickDelta> {
        if self.bounded_drain {
            self.updates.drain_batch()
        } else {
            self.updates.drain()
        }
    }

    /// Stops accepting messages, discards everything pending and flags the
    /// simulation side. Returns the number of deltas discarded.
    pub fn close(&self) -> usize {
        let mut slot = self.pending_join.lock();
        let discarded = self.updates.close();
        *slot = None;
        self.disconnected.store(true, Ordering::Release);
        discarded
    }

    /// Accepts messages again for a new connection.
    pub fn reopen(&self) {
        let _slot = self.pending_join.lock();
        self.updates.reopen();
    }

    /// Returns true if messages are being refused.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.updates.is_closed()
    }

    /// Consumes the disconnect notification. True at most once per close.
    pub fn take_disconnect(&self) -> bool {
        self.disconnected.swap(false, Ordering::AcqRel)
    }

    /// Records the host-assigned id of the local participant.
    pub fn set_local_participant(&self, id: ParticipantId) {
        self.local_participant.store(u32::from(id), Ordering::Release);
    }

    /// Returns the local participant id, once assigned.
    #[must_use]
    pub fn local_participant(&self) -> Option<ParticipantId> {
        ParticipantId::try_from(self.local_participant.load(Ordering::Acquire)).ok()
    }

    /// Returns the underlying update buffer.
    #[must_use]
    pub const fn updates(&self) -> &UpdateBuffer<TickDelta> {
        &self.updates
    }
}

impl Default for SessionInbox {
    fn default() -> Self {
        Self::new(&BufferConfig::default())
    }
}

/// Simulation-side state of a session.
///
/// Call [`fixed_update`](Self::fixed_update) exactly once per fixed step.
pub struct GameSession<O: EntityObserver = NullObserver> {
    inbox: Arc<SessionInbox>,
    reconciler: Reconciler,
    observer: O,
    client_tick: u32,
    disconnect_policy: DisconnectPolicy,
}

impl<O: EntityObserver> GameSession<O> {
    /// Creates a session reading from `inbox`.
    pub fn new(inbox: Arc<SessionInbox>, config: &SyncConfig, observer: O) -> Self {
        Self {
            inbox,
            reconciler: Reconciler::new(config.stale_delta_policy),
            observer,
            client_tick: 0,
            disconnect_policy: config.disconnect_policy,
        }
    }

    /// Initializes session state from a join snapshot.
    ///
    /// Both tick counters jump to the snapshot's host tick and the registry
    /// is replaced by the snapshot's entities.
    pub fn apply_join(&mut self, snapshot: &JoinSnapshot) -> ReconcileReport {
        let local_id = self.inbox.local_participant();
        let report = self
            .reconciler
            .apply_join(snapshot, local_id, &mut self.observer);
        self.client_tick = snapshot.server_tick_at_join;

        tracing::info!(
            server_tick = snapshot.server_tick_at_join,
            entities = self.reconciler.registry().len(),
            "Joined game"
        );
        report
    }

    /// Advances one fixed step.
    ///
    /// Applies a pending disconnect, then a pending join, increments the
    /// client tick and reconciles the buffered deltas (see
    /// [`SessionInbox::drain_step`]).
    pub fn fixed_update(&mut self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        if self.inbox.take_disconnect() {
            self.apply_disconnect(&mut report);
        }

        if let Some(snapshot) = self.inbox.take_join() {
            report.merge(&self.apply_join(&snapshot));
        }

        self.client_tick = self.client_tick.wrapping_add(1);

        let deltas = self.inbox.drain_step();
        if !deltas.is_empty() {
            let count = deltas.len();
            let local_id = self.inbox.local_participant();
            report.merge(&self.reconciler.apply_all(deltas, local_id, &mut self.observer));
            tracing::debug!(
                client_tick = self.client_tick,
                server_tick = self.reconciler.last_received_server_tick(),
                deltas = count,
                stale = report.stale_dropped,
                "reconciled"
            );
        }

        report
    }

    fn apply_disconnect(&mut self, report: &mut ReconcileReport) {
        match self.disconnect_policy {
            DisconnectPolicy::Freeze => {
                tracing::info!(
                    entities = self.reconciler.registry().len(),
                    "Session ended, entities frozen"
                );
            }
            DisconnectPolicy::DespawnAll => {
                let removed = self.reconciler.despawn_all(&mut self.observer);
                report.despawned += u32::try_from(removed).unwrap_or(u32::MAX);
                tracing::info!(removed, "Session ended, entities despawned");
            }
        }
    }

    /// Local fixed-step counter.
    #[must_use]
    pub const fn client_tick(&self) -> u32 {
        self.client_tick
    }

    /// Host tick of the last applied snapshot or delta.
    #[must_use]
    pub fn last_received_server_tick(&self) -> u32 {
        self.reconciler.last_received_server_tick()
    }

    /// Host-assigned id of the local participant.
    #[must_use]
    pub fn local_participant_id(&self) -> Option<ParticipantId> {
        self.inbox.local_participant()
    }

    /// Remote entities.
    #[must_use]
    pub const fn registry(&self) -> &EntityRegistry {
        self.reconciler.registry()
    }

    /// The shared inbox.
    #[must_use]
    pub const fn inbox(&self) -> &Arc<SessionInbox> {
        &self.inbox
    }

    /// The observer.
    #[must_use]
    pub const fn observer(&self) -> &O {
        &self.observer
    }

    /// The observer, mutably.
    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }
}
