//! Transport seam for the session protocol engine.
//!
//! A transport is a byte-oriented, message-framed duplex channel. Framing is
//! one JSON object per `read` call; the engine never reassembles partial
//! frames across ticks, so a message that straddles the read boundary is
//! dropped by contract. The engine is the transport's sole owner.

use async_trait::async_trait;
use thiserror::Error;

/// Upper bound on a single inbound frame.
pub const MAX_FRAME_LEN: usize = 1024;

/// Errors from transport operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("connection timed out")]
    Timeout,

    #[error("not connected")]
    NotConnected,

    #[error("i/o failure: {0}")]
    Io(String),
}

/// Message-framed duplex channel to the backend.
///
/// `read` must never block: it returns 0 when no complete frame is pending.
/// `available` may buffer a frame internally on behalf of the next `read`.
#[async_trait]
pub trait Transport: Send {
    /// Open the stream and perform the protocol handshake.
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError>;

    /// Whether the stream currently reports connected.
    fn connected(&self) -> bool;

    /// Whether a frame is ready for `read`.
    async fn available(&mut self) -> bool;

    /// Read one frame into `buf`, returning its length, or 0 if none.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Queue one frame for sending.
    async fn write(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    /// Push queued frames onto the wire.
    async fn flush(&mut self) -> Result<(), TransportError>;
}
