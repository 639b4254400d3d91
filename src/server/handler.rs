//! Per-connection receive/acknowledge loop.
//!
//! Each accepted client gets its own handler task. The handler reads one
//! frame at a time, logs it, and answers with the configured
//! acknowledgment. Every failure is contained here: the handler logs it,
//! closes its own connection and returns.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info, warn};

use super::connection::Connection;
use crate::config::SessionConfig;
use crate::protocol::{FrameCodec, FrameError};

/// Why a handler stopped.
#[derive(Debug, Error)]
pub enum CloseReason {
    /// Peer closed the stream between frames.
    #[error("peer closed the connection")]
    PeerClosed,
    /// Peer sent the disconnect sentinel.
    #[error("peer disconnected")]
    Disconnect,
    /// Peer reset the connection.
    #[error("connection reset by peer")]
    PeerReset,
    /// Peer sent a header we cannot use.
    #[error("protocol error: {0}")]
    Protocol(#[source] FrameError),
    /// Anything else that went wrong while reading.
    #[error("unexpected error: {0}")]
    Unexpected(#[source] FrameError),
    /// The acknowledgment could not be written.
    #[error("failed to send acknowledgment: {0}")]
    AckFailed(#[source] io::Error),
}

impl From<FrameError> for CloseReason {
    fn from(e: FrameError) -> Self {
        if e.is_reset() {
            CloseReason::PeerReset
        } else if e.is_protocol() {
            CloseReason::Protocol(e)
        } else {
            CloseReason::Unexpected(e)
        }
    }
}

impl CloseReason {
    fn log(&self, peer: SocketAddr) {
        match self {
            CloseReason::PeerClosed | CloseReason::Disconnect => {}
            CloseReason::PeerReset => {
                warn!(peer = %peer, "[ERROR] Connection reset by {peer}. Client likely crashed.");
            }
            CloseReason::Protocol(e) => {
                warn!(peer = %peer, error = %e, "[ERROR] Invalid header from {peer}. Forcing disconnect.");
            }
            CloseReason::Unexpected(e) => {
                error!(peer = %peer, "[UNEXPECTED ERROR] from {peer}: {e}");
            }
            CloseReason::AckFailed(e) => {
                error!(peer = %peer, "[UNEXPECTED ERROR] from {peer}: {e}");
            }
        }
    }
}

/// Connection handler
pub struct ConnectionHandler<S> {
    conn: Connection<S>,
    codec: FrameCodec,
    session: Arc<SessionConfig>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, session: Arc<SessionConfig>) -> Self {
        ConnectionHandler {
            conn: Connection::new(stream, peer),
            codec: session.codec(),
            session,
        }
    }

    /// Serve the connection until it ends, then close it.
    pub async fn run(mut self) -> CloseReason {
        let peer = self.conn.peer();
        info!(peer = %peer, "[NEW CONNECTION] {peer} connected.");

        let reason = loop {
            if let Some(reason) = self.step().await {
                break reason;
            }
        };

        self.conn.start_closing();
        reason.log(peer);
        info!(peer = %peer, "[CLOSING] Closing connection for {peer}.");
        self.conn.close().await;
        reason
    }

    /// Handle one frame. Returns a reason when the connection must close.
    async fn step(&mut self) -> Option<CloseReason> {
        let payload = match self.conn.read_frame(&self.codec).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return Some(CloseReason::PeerClosed),
            Err(e) => return Some(e.into()),
        };

        let peer = self.conn.peer();
        info!(peer = %peer, "[{peer}] {payload}");

        // The sentinel is acknowledged like any other frame before closing
        let acked = self.conn.send_ack(&self.session.ack).await;
        if payload == self.session.disconnect {
            return Some(CloseReason::Disconnect);
        }
        acked.err().map(CloseReason::AckFailed)
    }
}
