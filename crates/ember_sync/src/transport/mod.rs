//! # Transport Layer
//!
//! The message session the client talks to the host over.
//!
//! ## Contract
//!
//! - Messages arrive whole and in order
//! - `connect` completes exactly once, with the event stream or an error
//! - The event stream ends with one `Disconnected` event
//!
//! Reliability and retry live below this trait. The client only chooses a
//! [`DeliveryMode`] per outgoing message.

mod memory;
mod tcp;

pub use memory::{MemoryHost, MemoryTransport};
pub use tcp::TcpTransport;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use ember_shared::{DeliveryMode, Envelope, Tag};
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Something the transport reports to the receive loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete message from the host.
    Message(Envelope),
    /// The session ended.
    Disconnected {
        /// True if this side closed it.
        local: bool,
    },
}

/// Receiving end of a session's events.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// An ordered, message-oriented session with the host.
pub trait Transport: Send + Sync + 'static {
    /// Opens the session.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if the host cannot be reached.
    fn connect(
        &self,
        addr: SocketAddr,
    ) -> impl Future<Output = Result<TransportEvents, TransportError>> + Send;

    /// Queues one message for the host.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if there is no open session.
    fn send(&self, tag: Tag, payload: &[u8], mode: DeliveryMode) -> Result<(), TransportError>;

    /// Closes the session. The event stream reports a local disconnect.
    ///
    /// Closing a closed transport does nothing.
    fn close(&self);

    /// Returns traffic counters.
    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Messages sent.
    pub messages_sent: u64,
    /// Messages received.
    pub messages_received: u64,
    /// Bytes sent, headers included.
    pub bytes_sent: u64,
    /// Bytes received, headers included.
    pub bytes_received: u64,
}

/// Counters shared between a transport and its I/O tasks.
#[derive(Debug, Default)]
pub(crate) struct TransportCounters {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl TransportCounters {
    pub(crate) fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TransportStats {
        TransportStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}
