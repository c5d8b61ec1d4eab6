//! # Sync Error Types
//!
//! Only connection-level failures surface to callers. Per-message problems
//! are absorbed by the router and the reconciler and show up in their stats.

use std::io;

use ember_shared::ProtocolError;
use thiserror::Error;

/// Errors raised by a transport implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The connection attempt did not complete.
    #[error("connection failed: {0}")]
    Connect(#[source] io::Error),

    /// The session is closed; nothing can be sent.
    #[error("transport closed")]
    Closed,

    /// I/O failure on an open session.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    /// An outgoing message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[from] ProtocolError),
}

/// Errors surfaced by the connection manager and configuration loading.
#[derive(Error, Debug)]
pub enum SyncError {
    /// `connect` was called while a connection is pending or established.
    #[error("already connecting or connected")]
    AlreadyConnected,

    /// An operation needs an established connection.
    #[error("not connected")]
    NotConnected,

    /// The host address could not be parsed.
    #[error("invalid host address: {0}")]
    InvalidAddress(String),

    /// The receive loop was already started for this connection.
    #[error("receive loop already running")]
    ReceiveLoopRunning,

    /// Underlying transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Outgoing message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for client operations.
pub type SyncResult<T> = Result<T, SyncError>;
