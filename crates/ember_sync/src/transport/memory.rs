//! In-process transport.
//!
//! [`MemoryTransport::pair`] returns the client side and a [`MemoryHost`]
//! handle that plays the host: it delivers messages, records what the client
//! sent and can drop the session from the far end.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use ember_shared::{DeliveryMode, Envelope, ProtocolResult, Tag, WireRecord};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Transport, TransportCounters, TransportEvent, TransportEvents, TransportStats};
use crate::error::TransportError;

#[derive(Default)]
struct Shared {
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    peer: Option<SocketAddr>,
    sent: Vec<(Envelope, DeliveryMode)>,
    refuse: bool,
}

/// Client side of an in-process session.
pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
    counters: Arc<TransportCounters>,
}

/// Host side of an in-process session.
#[derive(Clone)]
pub struct MemoryHost {
    shared: Arc<Mutex<Shared>>,
    counters: Arc<TransportCounters>,
}

impl MemoryTransport {
    /// Creates a connected pair of handles.
    #[must_use]
    pub fn pair() -> (Self, MemoryHost) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let counters = Arc::new(TransportCounters::default());
        (
            Self {
                shared: Arc::clone(&shared),
                counters: Arc::clone(&counters),
            },
            MemoryHost { shared, counters },
        )
    }
}

impl Transport for MemoryTransport {
    async fn connect(&self, addr: SocketAddr) -> Result<TransportEvents, TransportError> {
        let mut shared = self.shared.lock();
        if shared.refuse {
            return Err(TransportError::Connect(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{addr} refused the connection"),
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        shared.events = Some(tx);
        shared.peer = Some(addr);
        Ok(rx)
    }

    fn send(&self, tag: Tag, payload: &[u8], mode: DeliveryMode) -> Result<(), TransportError> {
        let mut shared = self.shared.lock();
        if shared.events.is_none() {
            return Err(TransportError::Closed);
        }
        shared.sent.push((Envelope::new(tag, payload.to_vec()), mode));
        self.counters.record_sent(payload.len());
        Ok(())
    }

    fn close(&self) {
        let events = self.shared.lock().events.take();
        if let Some(events) = events {
            let _ = events.send(TransportEvent::Disconnected { local: true });
        }
    }

    fn stats(&self) -> TransportStats {
        self.counters.snapshot()
    }
}

impl MemoryHost {
    /// Delivers a message to the client. Returns false if no session is open.
    pub fn deliver(&self, envelope: Envelope) -> bool {
        let len = envelope.payload.len();
        let shared = self.shared.lock();
        let delivered = shared
            .events
            .as_ref()
            .is_some_and(|events| events.send(TransportEvent::Message(envelope)).is_ok());
        if delivered {
            self.counters.record_received(len);
        }
        delivered
    }

    /// Encodes and delivers a record.
    ///
    /// # Errors
    ///
    /// Fails if the record does not fit the wire format.
    pub fn deliver_record<R: WireRecord>(&self, tag: Tag, record: &R) -> ProtocolResult<bool> {
        Ok(self.deliver(Envelope::from_record(tag, record)?))
    }

    /// Ends the session from the host side.
    pub fn disconnect(&self) {
        let events = self.shared.lock().events.take();
        if let Some(events) = events {
            let _ = events.send(TransportEvent::Disconnected { local: false });
        }
    }

    /// Makes subsequent connection attempts fail (or succeed again).
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.lock().refuse = refuse;
    }

    /// Returns true while a session is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.lock().events.is_some()
    }

    /// Address the client last connected to.
    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.shared.lock().peer
    }

    /// Returns a copy of everything the client sent.
    #[must_use]
    pub fn sent(&self) -> Vec<(Envelope, DeliveryMode)> {
        self.shared.lock().sent.clone()
    }

    /// Removes and returns everything the client sent.
    pub fn take_sent(&self) -> Vec<(Envelope, DeliveryMode)> {
        std::mem::take(&mut self.shared.lock().sent)
    }
}
