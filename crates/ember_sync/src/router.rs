//! # Message Router
//!
//! Decodes incoming envelopes and dispatches them by tag.
//!
//! ```text
//! Envelope ──► routes[tag] ──► decode payload ──► RouteSink
//!     │
//!     └── no route ──────────────────────────────► RouteSink::unhandled
//! ```
//!
//! A malformed message is dropped and counted. The router never stops on a
//! bad message.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use ember_shared::{Envelope, JoinSnapshot, ProtocolError, ProtocolResult, Tag, TickDelta};

use crate::buffer::PushOutcome;
use crate::session::SessionInbox;

/// Receives decoded messages from the router.
pub trait RouteSink {
    /// A join accept arrived.
    fn join_accepted(&mut self, snapshot: JoinSnapshot);

    /// A tick update arrived. Must not block.
    fn tick_update(&mut self, delta: TickDelta);

    /// A message with no registered route.
    fn unhandled(&mut self, envelope: Envelope) {
        tracing::trace!(tag = %envelope.tag, "no handler for message");
    }
}

/// Sink feeding a [`SessionInbox`], with optional forwarding of everything
/// else to an external handler.
pub struct InboxSink {
    inbox: Arc<SessionInbox>,
    external: Option<Sender<Envelope>>,
}

impl InboxSink {
    /// Creates a sink that drops unhandled messages.
    #[must_use]
    pub const fn new(inbox: Arc<SessionInbox>) -> Self {
        Self {
            inbox,
            external: None,
        }
    }

    /// Forwards unhandled messages to `sender`.
    #[must_use]
    pub fn with_external(mut self, sender: Sender<Envelope>) -> Self {
        self.external = Some(sender);
        self
    }

    /// Returns the inbox.
    #[must_use]
    pub const fn inbox(&self) -> &Arc<SessionInbox> {
        &self.inbox
    }
}

impl RouteSink for InboxSink {
    fn join_accepted(&mut self, snapshot: JoinSnapshot) {
        let tick = snapshot.server_tick_at_join;
        if !self.inbox.offer_join(snapshot) {
            tracing::debug!(server_tick = tick, "join accept after disconnect ignored");
        }
    }

    fn tick_update(&mut self, delta: TickDelta) {
        match self.inbox.push_update(delta) {
            PushOutcome::Stored => {}
            PushOutcome::Evicted(old) => {
                tracing::warn!(server_tick = old.server_tick, "update buffer full, oldest delta dropped");
            }
            PushOutcome::Rejected(delta) => {
                tracing::debug!(server_tick = delta.server_tick, "delta after disconnect ignored");
            }
        }
    }

    fn unhandled(&mut self, envelope: Envelope) {
        let Some(sender) = &self.external else {
            return;
        };
        if let Err(TrySendError::Full(envelope)) = sender.try_send(envelope) {
            tracing::warn!(tag = %envelope.tag, "external handler queue full, message dropped");
        }
    }
}

/// Handler for one tag: decodes the payload and feeds the sink.
pub type Route<S> = fn(&Envelope, &mut S) -> ProtocolResult<()>;

/// What happened to one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Decoded and handed to a route.
    Dispatched(Tag),
    /// No route; passed to [`RouteSink::unhandled`].
    Forwarded(Tag),
    /// Malformed; discarded.
    Dropped(ProtocolError),
}

/// Router counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Messages handled by a route.
    pub dispatched: u64,
    /// Messages passed on unhandled.
    pub forwarded: u64,
    /// Malformed messages discarded.
    pub dropped: u64,
}

/// Tag-based dispatcher.
pub struct MessageRouter<S: RouteSink> {
    routes: HashMap<Tag, Route<S>>,
    sink: S,
    stats: RouterStats,
}

impl<S: RouteSink> MessageRouter<S> {
    /// Creates a router with the join-accept and tick-update routes.
    pub fn new(sink: S) -> Self {
        let mut router = Self {
            routes: HashMap::new(),
            sink,
            stats: RouterStats::default(),
        };
        router.register(Tag::JOIN_ACCEPT, route_join_accept::<S>);
        router.register(Tag::TICK_UPDATE, route_tick_update::<S>);
        router
    }

    /// Installs a route, returning the one it replaces.
    pub fn register(&mut self, tag: Tag, route: Route<S>) -> Option<Route<S>> {
        self.routes.insert(tag, route)
    }

    /// Dispatches one decoded envelope.
    pub fn on_message_received(&mut self, envelope: Envelope) -> RouteOutcome {
        let Some(route) = self.routes.get(&envelope.tag).copied() else {
            self.stats.forwarded += 1;
            let tag = envelope.tag;
            self.sink.unhandled(envelope);
            return RouteOutcome::Forwarded(tag);
        };

        match route(&envelope, &mut self.sink) {
            Ok(()) => {
                self.stats.dispatched += 1;
                RouteOutcome::Dispatched(envelope.tag)
            }
            Err(e) => self.drop_message(Some(envelope.tag), e),
        }
    }

    /// Decodes a complete wire envelope and dispatches it.
    pub fn on_bytes_received(&mut self, bytes: &[u8]) -> RouteOutcome {
        match Envelope::decode(bytes) {
            Ok(envelope) => self.on_message_received(envelope),
            Err(e) => self.drop_message(None, e),
        }
    }

    fn drop_message(&mut self, tag: Option<Tag>, error: ProtocolError) -> RouteOutcome {
        self.stats.dropped += 1;
        match tag {
            Some(tag) => tracing::warn!(%tag, %error, "malformed message dropped"),
            None => tracing::warn!(%error, "malformed envelope dropped"),
        }
        RouteOutcome::Dropped(error)
    }

    /// Returns the counters.
    #[must_use]
    pub const fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Returns the sink.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Returns the sink, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

fn route_join_accept<S: RouteSink>(envelope: &Envelope, sink: &mut S) -> ProtocolResult<()> {
    sink.join_accepted(envelope.read()?);
    Ok(())
}

fn route_tick_update<S: RouteSink>(envelope: &Envelope, sink: &mut S) -> ProtocolResult<()> {
    sink.tick_update(envelope.read()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_shared::{SpawnRecord, TextMessage};

    #[derive(Default)]
    struct Collect {
        joins: Vec<JoinSnapshot>,
        deltas: Vec<TickDelta>,
        other: Vec<Envelope>,
    }

    impl RouteSink for Collect {
        fn join_accepted(&mut self, snapshot: JoinSnapshot) {
            self.joins.push(snapshot);
        }

        fn tick_update(&mut self, delta: TickDelta) {
            self.deltas.push(delta);
        }

        fn unhandled(&mut self, envelope: Envelope) {
            self.other.push(envelope);
        }
    }

    #[test]
    fn test_routes_by_tag() {
        let mut router = MessageRouter::new(Collect::default());
        let join = JoinSnapshot {
            server_tick_at_join: 50,
            initial_entities: vec![SpawnRecord::new(1, "Alice")],
        };

        let outcome = router.on_message_received(Envelope::from_record(Tag::JOIN_ACCEPT, &join).unwrap());
        assert_eq!(outcome, RouteOutcome::Dispatched(Tag::JOIN_ACCEPT));

        let delta = TickDelta::empty(51);
        router.on_message_received(Envelope::from_record(Tag::TICK_UPDATE, &delta).unwrap());

        assert_eq!(router.sink().joins, vec![join]);
        assert_eq!(router.sink().deltas, vec![delta]);
        assert_eq!(router.stats().dispatched, 2);
    }

    #[test]
    fn test_unknown_tag_forwarded_unmodified() {
        let mut router = MessageRouter::new(Collect::default());
        let text = Envelope::from_record(Tag::TEXT, &TextMessage { text: "hi".to_owned() }).unwrap();
        let custom = Envelope::new(Tag(77), vec![1, 2, 3]);

        assert_eq!(router.on_message_received(text.clone()), RouteOutcome::Forwarded(Tag::TEXT));
        router.on_message_received(custom.clone());

        assert_eq!(router.sink().other, vec![text, custom]);
        assert_eq!(router.stats().forwarded, 2);
    }

    #[test]
    fn test_malformed_payload_dropped_and_router_continues() {
        let mut router = MessageRouter::new(Collect::default());

        let outcome = router.on_message_received(Envelope::new(Tag::TICK_UPDATE, vec![0xFF]));
        assert!(matches!(outcome, RouteOutcome::Dropped(_)));

        let garbage = router.on_bytes_received(&[3, 0, 9]);
        assert!(matches!(garbage, RouteOutcome::Dropped(_)));

        let delta = TickDelta::empty(7);
        let bytes = Envelope::from_record(Tag::TICK_UPDATE, &delta).unwrap().encode().unwrap();
        assert_eq!(router.on_bytes_received(&bytes), RouteOutcome::Dispatched(Tag::TICK_UPDATE));

        assert_eq!(router.stats().dropped, 2);
        assert_eq!(router.sink().deltas, vec![delta]);
    }

    #[test]
    fn test_register_replaces_route() {
        fn ignore(_: &Envelope, _: &mut Collect) -> ProtocolResult<()> {
            Ok(())
        }

        let mut router = MessageRouter::new(Collect::default());
        assert!(router.register(Tag::TICK_UPDATE, ignore).is_some());

        router.on_message_received(Envelope::from_record(Tag::TICK_UPDATE, &TickDelta::empty(1)).unwrap());
        assert!(router.sink().deltas.is_empty());
    }

    #[test]
    fn test_inbox_sink_feeds_inbox() {
        let inbox = Arc::new(SessionInbox::default());
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut router = MessageRouter::new(InboxSink::new(Arc::clone(&inbox)).with_external(tx));

        router.on_message_received(Envelope::from_record(Tag::TICK_UPDATE, &TickDelta::empty(3)).unwrap());
        router.on_message_received(Envelope::new(Tag(9), Vec::new()));

        assert_eq!(inbox.drain_updates(), vec![TickDelta::empty(3)]);
        assert_eq!(rx.try_recv().unwrap().tag, Tag(9));
    }
}
