//! # Connection Lifecycle
//!
//! Owns the transport and the session's connection state.
//!
//! ```text
//!  Disconnected ──connect()──► Connecting ──ok──► Connected
//!       ▲                          │                  │
//!       └────────── error ─────────┘                  │
//!       └──────────── disconnect (local or remote) ───┘
//! ```
//!
//! There is no automatic retry. A failed connect leaves the manager in
//! `Disconnected` and the caller decides what to do.
//!
//! Every connect attempt starts a new session number. A receive loop only
//! acts for the session it was spawned for, so a disconnect queued by an old
//! session never tears down the one that replaced it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use ember_shared::{DeliveryMode, Envelope, ParticipantId, Tag, TextMessage};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::parse_host;
use crate::error::{SyncError, SyncResult};
use crate::router::{MessageRouter, RouteSink, RouterStats};
use crate::session::SessionInbox;
use crate::transport::{Transport, TransportEvent, TransportEvents};

/// Connection state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Session established.
    Connected,
}

/// Caller-owned lobby metadata. The manager stores it and never reads it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LobbyInfo {
    entries: BTreeMap<String, String>,
}

impl LobbyInfo {
    /// Sets a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Returns a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Connection lifecycle manager.
///
/// Usually held in an `Arc` so the receive loop can report disconnects back.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    inbox: Arc<SessionInbox>,
    state: watch::Sender<ConnectionState>,
    session: AtomicU64,
    events: Mutex<Option<(u64, TransportEvents)>>,
    lobby: RwLock<LobbyInfo>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Creates a disconnected manager that feeds `inbox`.
    pub fn new(transport: T, inbox: Arc<SessionInbox>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            inbox,
            state,
            session: AtomicU64::new(0),
            events: Mutex::new(None),
            lobby: RwLock::new(LobbyInfo::default()),
        }
    }

    /// Connects to the host.
    ///
    /// Completes once. On success the state becomes `Connected` and the
    /// connected notification fires. On failure the state returns to
    /// `Disconnected` and the notification never reports `Connected`.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidAddress`] if `address` is not an IP
    /// - [`SyncError::AlreadyConnected`] while connecting or connected
    /// - [`SyncError::Transport`] if the host cannot be reached
    pub async fn connect(&self, address: &str, port: u16) -> SyncResult<()> {
        let addr = parse_host(address, port)?;

        let mut session = None;
        self.state.send_if_modified(|state| {
            if *state != ConnectionState::Disconnected {
                return false;
            }
            *state = ConnectionState::Connecting;
            session = Some(self.session.fetch_add(1, Ordering::AcqRel) + 1);
            true
        });
        let Some(session) = session else {
            return Err(SyncError::AlreadyConnected);
        };

        tracing::info!(%addr, session, "Connecting to server");
        match self.transport.connect(addr).await {
            Ok(events) => {
                *self.events.lock() = Some((session, events));
                self.inbox.reopen();
                self.state.send_replace(ConnectionState::Connected);
                tracing::info!(%addr, "Connected to server");
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(ConnectionState::Disconnected);
                tracing::error!(%addr, error = %e, "Unable to connect to server");
                Err(e.into())
            }
        }
    }

    /// Subscribes to state changes.
    ///
    /// `Connected` is observed once per successful connect.
    #[must_use]
    pub fn connected_notification(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns true while connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Asks the host to join the running game.
    ///
    /// # Errors
    ///
    /// Fails if not connected or the transport refuses the message.
    pub fn request_join(&self) -> SyncResult<()> {
        self.send(Tag::JOIN_REQUEST, &[], DeliveryMode::Reliable)?;
        tracing::info!("Join requested");
        Ok(())
    }

    /// Sends free-form text on [`Tag::TEXT`], reliably.
    ///
    /// # Errors
    ///
    /// Fails if not connected, the text is too long, or the transport refuses
    /// the message.
    pub fn send_text(&self, text: &str) -> SyncResult<()> {
        let envelope = Envelope::from_record(
            Tag::TEXT,
            &TextMessage {
                text: text.to_owned(),
            },
        )?;
        self.send(envelope.tag, &envelope.payload, DeliveryMode::Reliable)
    }

    /// Sends a raw payload.
    ///
    /// # Errors
    ///
    /// Fails if not connected or the transport refuses the message.
    pub fn send(&self, tag: Tag, payload: &[u8], mode: DeliveryMode) -> SyncResult<()> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.transport.send(tag, payload, mode)?;
        Ok(())
    }

    /// Records the id the host assigned to this client.
    ///
    /// Spawns for this id are never materialized as remote entities.
    pub fn assign_participant(&self, id: ParticipantId) {
        self.inbox.set_local_participant(id);
        tracing::info!(participant = id, "Participant id assigned");
    }

    /// Host-assigned id of this client, once known.
    #[must_use]
    pub fn participant_id(&self) -> Option<ParticipantId> {
        self.inbox.local_participant()
    }

    /// Returns a copy of the lobby metadata.
    #[must_use]
    pub fn lobby_info(&self) -> LobbyInfo {
        self.lobby.read().clone()
    }

    /// Replaces the lobby metadata.
    pub fn set_lobby_info(&self, lobby: LobbyInfo) {
        *self.lobby.write() = lobby;
    }

    /// The shared inbox.
    #[must_use]
    pub const fn inbox(&self) -> &Arc<SessionInbox> {
        &self.inbox
    }

    /// The owned transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Takes the event stream of the current session.
    ///
    /// Only needed when driving events by hand instead of through
    /// [`spawn_receive_loop`](Self::spawn_receive_loop).
    pub fn take_events(&self) -> Option<TransportEvents> {
        self.events.lock().take().map(|(_, events)| events)
    }

    /// Number of the latest connect attempt. Zero before the first one.
    #[must_use]
    pub fn session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    /// Applies one transport event of the current session. Returns false
    /// once the session is over.
    pub fn handle_event<S: RouteSink>(&self, event: TransportEvent, router: &mut MessageRouter<S>) -> bool {
        self.handle_session_event(self.session(), event, router)
    }

    /// Applies one event of `session`. Events of a replaced session end the
    /// caller's loop without touching the current one.
    fn handle_session_event<S: RouteSink>(
        &self,
        session: u64,
        event: TransportEvent,
        router: &mut MessageRouter<S>,
    ) -> bool {
        if session != self.session() {
            tracing::debug!(session, current = self.session(), "Stale session event ignored");
            return false;
        }
        match event {
            TransportEvent::Message(envelope) => {
                router.on_message_received(envelope);
                true
            }
            TransportEvent::Disconnected { local } => {
                self.end_session(session, local);
                false
            }
        }
    }

    /// Ends the current session after a local or remote disconnect.
    ///
    /// Closes the inbox, which discards buffered deltas and flags the
    /// simulation side. Returns false if already disconnected.
    pub fn on_disconnected(&self, local: bool) -> bool {
        self.end_session(self.session(), local)
    }

    fn end_session(&self, session: u64, local: bool) -> bool {
        // Checked under the state lock so a concurrent connect cannot slip in
        let mut ended = false;
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected
                || self.session.load(Ordering::Acquire) != session
            {
                return false;
            }
            *state = ConnectionState::Disconnected;
            ended = true;
            true
        });
        if !ended {
            return false;
        }
        let discarded = self.inbox.close();
        if local {
            tracing::info!(discarded, "Disconnected from server");
        } else {
            self.transport.close();
            tracing::warn!(discarded, "Server closed the connection");
        }
        true
    }

    /// Closes the session from this side.
    pub fn disconnect(&self) {
        self.transport.close();
        self.on_disconnected(true);
    }
}

impl<T: Transport> ConnectionManager<T> {
    /// Runs the network-receive context as a tokio task.
    ///
    /// The task routes every message until the session ends and returns the
    /// router's counters. It holds only a weak reference to the manager and
    /// stops without side effects once a newer session has replaced its own.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotConnected`] before a successful connect
    /// - [`SyncError::ReceiveLoopRunning`] if already started for this session
    pub fn spawn_receive_loop<S>(
        self: &Arc<Self>,
        mut router: MessageRouter<S>,
    ) -> SyncResult<JoinHandle<RouterStats>>
    where
        S: RouteSink + Send + 'static,
    {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let (session, mut events) = self
            .events
            .lock()
            .take()
            .ok_or(SyncError::ReceiveLoopRunning)?;
        let manager: Weak<Self> = Arc::downgrade(self);

        Ok(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                if !manager.handle_session_event(session, event, &mut router) {
                    break;
                }
            }
            let stats = router.stats();
            tracing::debug!(
                session,
                dispatched = stats.dispatched,
                forwarded = stats.forwarded,
                dropped = stats.dropped,
                "receive loop finished"
            );
            stats
        }))
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}
