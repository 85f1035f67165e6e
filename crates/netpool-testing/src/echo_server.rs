//! TCP echo server for exercising real sockets.
//!
//! ## Example
//!
//! ```rust,ignore
//! use netpool_testing::EchoServer;
//!
//! #[tokio::test]
//! async fn test_against_tcp() {
//!     let server = EchoServer::start().await.unwrap();
//!     let pool = netpool::Pool::builder()
//!         .address(server.address())
//!         .build()
//!         .await
//!         .unwrap();
//!     // ...
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Error type for echo server operations.
#[derive(Debug, Error)]
pub enum EchoServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for echo server operations.
pub type Result<T> = std::result::Result<T, EchoServerError>;

/// A TCP server on an ephemeral localhost port that echoes every byte back.
///
/// Stops accepting when stopped or dropped.
pub struct EchoServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    accepted: Arc<AtomicUsize>,
    connection_count: Arc<AtomicUsize>,
}

impl EchoServer {
    /// Start the server on an available port.
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let accepted = Arc::new(AtomicUsize::new(0));
        let connection_count = Arc::new(AtomicUsize::new(0));

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            accepted: Arc::clone(&accepted),
            connection_count: Arc::clone(&connection_count),
        };

        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _peer_addr)) => {
                                accepted.fetch_add(1, Ordering::SeqCst);
                                let count = Arc::clone(&connection_count);
                                let mut conn_shutdown = shutdown_tx.subscribe();
                                tokio::spawn(async move {
                                    count.fetch_add(1, Ordering::SeqCst);
                                    tokio::select! {
                                        result = handle_connection(stream) => {
                                            if let Err(e) = result {
                                                tracing::debug!("Connection error: {}", e);
                                            }
                                        }
                                        _ = conn_shutdown.recv() => {}
                                    }
                                    count.fetch_sub(1, Ordering::SeqCst);
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Ok(server)
    }

    /// Get the server's listening address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the address as a `host:port` string.
    #[must_use]
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Total connections accepted since start.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections currently open.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::SeqCst)
    }

    /// Stop the server and drop its open connections.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_connection(mut stream: TcpStream) -> Result<()> {
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            // Client disconnected
            return Ok(());
        }
        stream.write_all(&buf[..n]).await?;
    }
}
