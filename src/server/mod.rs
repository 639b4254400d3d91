//! TCP server for chat clients.
//!
//! Binds the listening socket, accepts connections, and spawns one
//! [`ConnectionHandler`] task per client. Handlers run independently and
//! share nothing but the immutable session settings.

mod connection;
mod handler;

pub use handler::ConnectionHandler;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::SessionConfig;

/// Server startup errors
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Server instance
pub struct Server {
    listener: TcpListener,
    session: Arc<SessionConfig>,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Bind the listening socket.
    pub async fn bind(listen: &str, session: SessionConfig) -> Result<Self, StartupError> {
        let listener = TcpListener::bind(listen)
            .await
            .map_err(|source| StartupError::Bind {
                addr: listen.to_string(),
                source,
            })?;

        Ok(Server {
            listener,
            session: Arc::new(session),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until Ctrl-C.
    pub async fn run(self) {
        self.run_until(shutdown_signal()).await
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// The listening socket is dropped when this returns. Handlers already
    /// running are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        match self.local_addr() {
            Ok(addr) => info!(address = %addr, "[LISTENING] Server is listening on {addr}"),
            Err(e) => warn!(error = %e, "[LISTENING] Server is listening"),
        }

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_handler(stream, peer),
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        drop(self.listener);
        info!("[SHUTDOWN] Server has been shut down.");
    }

    fn spawn_handler(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let guard = ActiveGuard::new(Arc::clone(&self.active));
        let count = guard.count;
        let session = Arc::clone(&self.session);

        tokio::spawn(async move {
            let _guard = guard;
            ConnectionHandler::new(stream, peer, session).run().await;
        });

        info!(active = count, "[ACTIVE CONNECTIONS] {count}");
    }
}

/// Counts a running handler for as long as it lives.
struct ActiveGuard {
    active: Arc<AtomicUsize>,
    count: usize,
}

impl ActiveGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        let count = active.fetch_add(1, Ordering::SeqCst) + 1;
        ActiveGuard { active, count }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler the server runs until killed
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn frame(payload: &str) -> Vec<u8> {
        SessionConfig::default().codec().encode(payload).unwrap().to_vec()
    }

    async fn start() -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
        let server = Server::bind("127.0.0.1:0", SessionConfig::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));
        (addr, tx, task)
    }

    async fn exchange(stream: &mut TcpStream, payload: &str) -> String {
        stream.write_all(&frame(payload)).await.unwrap();
        let mut buf = [0u8; 2048];
        let n = stream.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let first = Server::bind("127.0.0.1:0", SessionConfig::default())
            .await
            .unwrap();
        let addr = first.local_addr().unwrap().to_string();

        match Server::bind(&addr, SessionConfig::default()).await {
            Err(StartupError::Bind { addr: reported, source }) => {
                assert_eq!(reported, addr);
                assert_eq!(source.kind(), io::ErrorKind::AddrInUse);
            }
            Ok(_) => panic!("second bind should fail"),
        }
    }

    #[tokio::test]
    async fn test_acknowledges_each_message() {
        let (addr, tx, task) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        assert_eq!(exchange(&mut stream, "hello").await, "Message received");
        assert_eq!(exchange(&mut stream, "world").await, "Message received");

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_closes_connection() {
        let (addr, tx, task) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        assert_eq!(exchange(&mut stream, "!Disconnect").await, "Message received");

        // Server side is gone: next read hits end of stream
        let mut buf = [0u8; 16];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_header_isolated_from_other_clients() {
        let (addr, tx, task) = start().await;
        let mut good = TcpStream::connect(addr).await.unwrap();
        let mut bad = TcpStream::connect(addr).await.unwrap();

        assert_eq!(exchange(&mut good, "first").await, "Message received");

        let mut header = b"garbage".to_vec();
        header.resize(64, b' ');
        bad.write_all(&header).await.unwrap();
        let mut buf = [0u8; 16];
        let n = bad.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);

        assert_eq!(exchange(&mut good, "second").await, "Message received");

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_interleaved_clients() {
        let (addr, tx, task) = start().await;
        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();

        for i in 0..5 {
            assert_eq!(exchange(&mut a, &format!("a{i}")).await, "Message received");
            assert_eq!(exchange(&mut b, &format!("b{i}")).await, "Message received");
        }

        // Dropping one client leaves the other working
        drop(a);
        assert_eq!(exchange(&mut b, "still here").await, "Message received");

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_active_count_drops_after_disconnect() {
        let server = Server::bind("127.0.0.1:0", SessionConfig::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let active = Arc::clone(&server.active);
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        assert_eq!(exchange(&mut stream, "hi").await, "Message received");
        assert_eq!(active.load(Ordering::SeqCst), 1);

        drop(stream);
        for _ in 0..100 {
            if active.load(Ordering::SeqCst) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(active.load(Ordering::SeqCst), 0);

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_releases_listener() {
        let (addr, tx, task) = start().await;
        tx.send(()).unwrap();
        task.await.unwrap();

        // Port is free again
        let rebound = Server::bind(&addr.to_string(), SessionConfig::default()).await;
        assert!(rebound.is_ok());
    }
}
