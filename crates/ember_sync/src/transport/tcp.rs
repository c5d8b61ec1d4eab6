//! TCP transport.
//!
//! Envelopes are written back to back on the stream; the 6-byte envelope
//! header doubles as the frame header. TCP is ordered and reliable, so both
//! delivery modes take the same path.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use ember_shared::{DeliveryMode, Envelope, Tag, ENVELOPE_HEADER_LEN};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Transport, TransportCounters, TransportEvent, TransportEvents, TransportStats};
use crate::error::TransportError;

struct TcpSession {
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    reader: JoinHandle<()>,
}

/// Transport over a single TCP stream.
///
/// Must be connected from within a tokio runtime; reading and writing run
/// as two spawned tasks.
#[derive(Default)]
pub struct TcpTransport {
    session: Mutex<Option<TcpSession>>,
    counters: Arc<TransportCounters>,
}

impl TcpTransport {
    /// Creates an unconnected transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for TcpTransport {
    async fn connect(&self, addr: SocketAddr) -> Result<TransportEvents, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::Connect)?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(
            read_half,
            events_tx.clone(),
            Arc::clone(&self.counters),
        ));
        tokio::spawn(write_loop(write_half, outgoing_rx));

        let previous = self.session.lock().replace(TcpSession {
            outgoing: outgoing_tx,
            events: events_tx,
            reader,
        });
        if let Some(previous) = previous {
            previous.reader.abort();
        }

        tracing::debug!(%addr, "tcp session open");
        Ok(events_rx)
    }

    fn send(&self, tag: Tag, payload: &[u8], _mode: DeliveryMode) -> Result<(), TransportError> {
        let bytes = Envelope::new(tag, payload.to_vec()).encode()?;
        let len = bytes.len();

        let session = self.session.lock();
        let session = session.as_ref().ok_or(TransportError::Closed)?;
        session
            .outgoing
            .send(bytes)
            .map_err(|_| TransportError::Closed)?;

        self.counters.record_sent(len);
        Ok(())
    }

    fn close(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };
        session.reader.abort();
        // Dropping `outgoing` lets the writer flush what is queued and exit
        let _ = session.events.send(TransportEvent::Disconnected { local: true });
        tracing::debug!("tcp session closed");
    }

    fn stats(&self) -> TransportStats {
        self.counters.snapshot()
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<TransportEvent>,
    counters: Arc<TransportCounters>,
) {
    let mut header = [0u8; ENVELOPE_HEADER_LEN];
    loop {
        match read_envelope(&mut reader, &mut header).await {
            Ok(envelope) => {
                counters.record_received(ENVELOPE_HEADER_LEN + envelope.payload.len());
                if events.send(TransportEvent::Message(envelope)).is_err() {
                    // Nobody is listening anymore
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                tracing::warn!(error = %e, "tcp session lost");
                break;
            }
        }
    }
    let _ = events.send(TransportEvent::Disconnected { local: false });
}

async fn read_envelope(
    reader: &mut OwnedReadHalf,
    header: &mut [u8; ENVELOPE_HEADER_LEN],
) -> io::Result<Envelope> {
    reader.read_exact(header).await?;
    // A bad header leaves the stream unframed; nothing after it can be trusted
    let (tag, len) = Envelope::parse_header(header)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Envelope::new(tag, payload))
}

async fn write_loop(mut writer: OwnedWriteHalf, mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(bytes) = outgoing.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            tracing::warn!(error = %e, "tcp write failed");
            return;
        }
    }
    let _ = writer.shutdown().await;
}
