//! Connection state machine for an accepted client.
//!
//! A connection starts `Active`, moves to `Closing` once its handler decides
//! to stop, and ends `Closed` after the stream has been shut down. The
//! shutdown happens at most once.

use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::protocol::{FrameCodec, FrameError};

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Reading frames and sending acknowledgments.
    Active,
    /// No further reads; waiting to be shut down.
    Closing,
    /// Stream released. No more I/O.
    Closed,
}

/// A single client connection, exclusively owned by its handler.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    peer: SocketAddr,
    state: ConnState,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a freshly accepted stream.
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            state: ConnState::Active,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Read the next frame. See [`FrameCodec::read_frame`].
    pub async fn read_frame(&mut self, codec: &FrameCodec) -> Result<Option<String>, FrameError> {
        codec.read_frame(&mut self.stream).await
    }

    /// Write the raw acknowledgment bytes.
    pub async fn send_ack(&mut self, ack: &str) -> std::io::Result<()> {
        self.stream.write_all(ack.as_bytes()).await
    }

    /// Stop reading. Idempotent.
    pub fn start_closing(&mut self) {
        if self.state == ConnState::Active {
            self.state = ConnState::Closing;
        }
    }

    /// Shut the stream down and mark the connection closed.
    ///
    /// Only the first call touches the stream.
    pub async fn close(&mut self) {
        if self.state == ConnState::Closed {
            return;
        }
        self.state = ConnState::Closed;
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer = %self.peer, error = %e, "Shutdown failed");
        }
    }
}
