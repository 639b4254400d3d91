//! Interactive chat client.
//!
//! Connects once, then sends each line the operator types as a frame and
//! prints the server's acknowledgment. Everything runs in sequence on one
//! task: read a line, send it, wait for the reply.

use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::SessionConfig;
use crate::protocol::{FrameCodec, FrameError};

/// Client session errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Nothing is listening at the server address.
    #[error("connection to {0} refused")]
    ConnectionRefused(String),

    /// Any other failure to connect.
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The server went away mid-session.
    #[error("connection to the server was lost")]
    ConnectionLost,

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Map a socket error, folding reset/broken-pipe into `ConnectionLost`.
    fn from_socket(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted => SessionError::ConnectionLost,
            _ => SessionError::Io(e),
        }
    }
}

/// How an interactive session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Operator sent the disconnect sentinel.
    Disconnected,
    /// Operator input ran out.
    EndOfInput,
    /// The server dropped the connection.
    ConnectionLost,
}

/// A connected client session.
pub struct Session<S> {
    stream: S,
    codec: FrameCodec,
    session: Arc<SessionConfig>,
    open: bool,
}

impl Session<TcpStream> {
    /// Connect to the server. A single attempt, no retry.
    pub async fn connect(addr: &str, session: SessionConfig) -> Result<Self, SessionError> {
        let stream = TcpStream::connect(addr).await.map_err(|source| {
            if source.kind() == io::ErrorKind::ConnectionRefused {
                SessionError::ConnectionRefused(addr.to_string())
            } else {
                SessionError::Connect {
                    addr: addr.to_string(),
                    source,
                }
            }
        })?;
        debug!(server = %addr, "Connected");
        Ok(Session::new(stream, Arc::new(session)))
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, session: Arc<SessionConfig>) -> Self {
        Session {
            codec: session.codec(),
            stream,
            session,
            open: true,
        }
    }

    /// Send one message and wait for the acknowledgment.
    pub async fn send(&mut self, message: &str) -> Result<String, SessionError> {
        let frame = self.codec.encode(message)?;
        self.stream
            .write_all(&frame)
            .await
            .map_err(SessionError::from_socket)?;

        let mut buf = vec![0u8; self.session.recv_buffer];
        let n = self
            .stream
            .read(&mut buf)
            .await
            .map_err(SessionError::from_socket)?;
        if n == 0 {
            return Err(SessionError::ConnectionLost);
        }
        Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
    }

    /// Run the interactive loop over `input`, writing console text to
    /// `output`. The connection is closed on every exit path.
    pub async fn run<I, O>(mut self, mut input: I, mut output: O) -> Result<SessionEnd, SessionError>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let result = self.interact(&mut input, &mut output).await;
        self.close().await;
        output.write_all(b"[CLOSING] Connection closed.\n").await?;
        output.flush().await?;
        result
    }

    async fn interact<I, O>(&mut self, input: &mut I, output: &mut O) -> Result<SessionEnd, SessionError>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let banner = format!(
            "You can now type messages. Type '{}' to quit.\n",
            self.session.disconnect
        );
        output.write_all(banner.as_bytes()).await?;

        let mut line = String::new();
        loop {
            output.write_all(b"> ").await?;
            output.flush().await?;

            line.clear();
            if input.read_line(&mut line).await? == 0 {
                debug!("Input closed");
                return Ok(SessionEnd::EndOfInput);
            }

            let message = line.trim_end_matches(['\r', '\n']);
            if message.is_empty() {
                continue;
            }

            let sent = self.send(message).await;
            match &sent {
                Ok(ack) => {
                    output.write_all(format!("[SERVER] {ack}\n").as_bytes()).await?;
                }
                Err(SessionError::ConnectionLost) => {
                    output
                        .write_all(b"[ERROR] Connection to the server was lost.\n")
                        .await?;
                }
                Err(_) => {}
            }

            if message == self.session.disconnect {
                return Ok(SessionEnd::Disconnected);
            }
            match sent {
                Ok(_) => {}
                Err(SessionError::ConnectionLost) => return Ok(SessionEnd::ConnectionLost),
                Err(e) => return Err(e),
            }
        }
    }

    /// Shut the connection down. Only the first call has an effect.
    pub async fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "Shutdown failed");
        }
    }
}

/// Run the client against stdin/stdout.
pub async fn run(addr: &str, session: SessionConfig) -> Result<(), SessionError> {
    let mut stdout = tokio::io::stdout();

    let client = match Session::connect(addr, session).await {
        Ok(client) => client,
        Err(e @ SessionError::ConnectionRefused(_)) => {
            stdout
                .write_all(b"[ERROR] Connection refused. Is the server running?\n")
                .await?;
            stdout.flush().await?;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    stdout
        .write_all(format!("[CONNECTED] Connected to server at {addr}\n").as_bytes())
        .await?;

    let end = client
        .run(BufReader::new(tokio::io::stdin()), stdout)
        .await?;
    debug!(?end, "Session ended");
    Ok(())
}
