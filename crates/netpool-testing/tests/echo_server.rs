//! Echo server behavior tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use netpool_testing::{EchoServer, unreachable_addr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// =============================================================================
// Echo Server Tests
// =============================================================================

#[tokio::test]
async fn test_echo_server_starts_and_listens() {
    let server = EchoServer::start().await.expect("Server should start");

    assert!(server.addr().port() > 0, "Should have valid port");
    assert_eq!(server.addr().ip().to_string(), "127.0.0.1");
    assert_eq!(server.connection_count(), 0, "Should start with no connections");

    server.stop();
}

#[tokio::test]
async fn test_echo_server_echoes() {
    let server = EchoServer::start().await.unwrap();
    let mut stream = TcpStream::connect(server.addr()).await.unwrap();

    stream.write_all(b"hello").await.unwrap();
    let mut buf = [0u8; 5];
    stream.read_exact(&mut buf).await.unwrap();

    assert_eq!(&buf, b"hello");
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn test_echo_server_stop_closes_connections() {
    let server = EchoServer::start().await.unwrap();
    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    stream.write_all(b"x").await.unwrap();
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte).await.unwrap();

    server.stop();

    let mut buf = [0u8; 8];
    let n = tokio::time::timeout(Duration::from_secs(1), stream.read(&mut buf))
        .await
        .expect("read should finish once the server stops")
        .unwrap_or(0);
    assert_eq!(n, 0);
}

// =============================================================================
// Fixture Tests
// =============================================================================

#[tokio::test]
async fn test_unreachable_addr_refuses() {
    let addr = unreachable_addr().unwrap();
    assert!(TcpStream::connect(&addr).await.is_err());
}
