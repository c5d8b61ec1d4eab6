//! # Ember Sync - Client State Synchronization
//!
//! Receives authoritative snapshots from the host, buffers them against
//! jitter and applies them to a local registry of remote entities once per
//! fixed step.
//!
//! ## Architecture
//!
//! ```text
//!  NETWORK TASK (tokio)                    SIMULATION LOOP (fixed step)
//!  ────────────────────                    ────────────────────────────
//!  Transport ──► MessageRouter             TickLoop
//!                  │ JoinAccept ─┐            │
//!                  │ TickUpdate ─┼─► SessionInbox ◄── GameSession::fixed_update
//!                  │ other ──► external       │           │
//!                  ▼             │            │      Reconciler ──► EntityRegistry
//!            ConnectionManager ──┘ (close)    │           │
//!                                                   EntityObserver
//! ```
//!
//! - **Connection**: one transport per session, no automatic retry
//! - **Router**: tag dispatch table; malformed messages are dropped, never fatal
//! - **Buffer**: bounded FIFO, drop-oldest, drained whole each step
//! - **Reconciler**: spawns → despawns → state → health, per delta, in order
//! - **Registry**: the only place remote entities are created or destroyed
//!
//! The host is authoritative. There is no prediction, interpolation or
//! rollback here.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ember_sync::{
//!     ClientConfig, ConnectionManager, GameSession, InboxSink, MessageRouter,
//!     NullObserver, SessionInbox, TcpTransport,
//! };
//!
//! let config = ClientConfig::load("ember.toml")?;
//! let inbox = Arc::new(SessionInbox::new(&config.buffer));
//! let manager = Arc::new(ConnectionManager::new(TcpTransport::new(), Arc::clone(&inbox)));
//!
//! manager.connect(&config.server_address, config.port).await?;
//! manager.spawn_receive_loop(MessageRouter::new(InboxSink::new(Arc::clone(&inbox))))?;
//! manager.request_join()?;
//!
//! let mut session = GameSession::new(inbox, &config.sync, NullObserver);
//! loop {
//!     session.fixed_update();
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod observer;
pub mod reconcile;
pub mod registry;
pub mod router;
pub mod session;
pub mod tick;
pub mod transport;

// Re-exports for convenience
pub use buffer::{BufferStats, PushOutcome, UpdateBuffer};
pub use config::{BufferConfig, ClientConfig, DisconnectPolicy, StaleDeltaPolicy, SyncConfig};
pub use connection::{ConnectionManager, ConnectionState, LobbyInfo};
pub use error::{SyncError, SyncResult, TransportError};
pub use observer::{ChannelObserver, EntityEvent, EntityObserver, NullObserver, RecordingObserver};
pub use reconcile::{ReconcileReport, Reconciler};
pub use registry::{Entity, EntityRegistry, SpawnOutcome, FULL_HEALTH};
pub use router::{InboxSink, MessageRouter, Route, RouteOutcome, RouteSink, RouterStats};
pub use session::{GameSession, SessionInbox};
pub use tick::{TickLoop, TickStats};
pub use transport::{
    MemoryHost, MemoryTransport, TcpTransport, Transport, TransportEvent, TransportEvents,
    TransportStats,
};
