//! Transport dialing.
//!
//! The pool never interprets payload bytes. It only needs a way to open a
//! byte stream to its target, which a [`Dialer`] provides. [`TcpDialer`]
//! covers plain sockets; tests and alternate transports plug in their own.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, lookup_host};

/// Opens transport connections to a target.
///
/// Uses `#[async_trait]` so dialers can be shared as trait objects.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// The established transport.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open one connection. Called once per connect attempt.
    async fn dial(&self, protocol: &str, address: &str) -> io::Result<Self::Stream>;
}

/// Address family accepted by [`TcpDialer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Any,
    V4,
    V6,
}

impl Family {
    fn from_protocol(protocol: &str) -> io::Result<Self> {
        match protocol.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Any),
            "tcp4" => Ok(Self::V4),
            "tcp6" => Ok(Self::V6),
            other => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported protocol: {other}"),
            )),
        }
    }

    fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Self::Any => true,
            Self::V4 => addr.is_ipv4(),
            Self::V6 => addr.is_ipv6(),
        }
    }
}

/// Dials plain TCP sockets (`tcp`, `tcp4`, `tcp6`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer {
    nodelay: bool,
}

impl TcpDialer {
    /// Create a dialer with `TCP_NODELAY` enabled.
    #[must_use]
    pub fn new() -> Self {
        Self { nodelay: true }
    }

    /// Enable or disable `TCP_NODELAY` on dialed sockets.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, protocol: &str, address: &str) -> io::Result<TcpStream> {
        let family = Family::from_protocol(protocol)?;

        let mut last_err = None;
        for addr in lookup_host(address).await? {
            if !family.accepts(&addr) {
                continue;
            }
            tracing::trace!(%addr, "dialing");
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(self.nodelay)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no {protocol} address found for {address}"),
            )
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_protocol_families() {
        assert_eq!(Family::from_protocol("TCP").unwrap(), Family::Any);
        assert_eq!(Family::from_protocol("tcp4").unwrap(), Family::V4);
        assert_eq!(Family::from_protocol("tcp6").unwrap(), Family::V6);

        let err = Family::from_protocol("udp").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_tcp_dialer_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let stream = TcpDialer::new().dial("tcp", &addr).await.unwrap();
        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_tcp_dialer_family_mismatch() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let err = TcpDialer::new().dial("tcp6", &addr).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrNotAvailable);
    }
}
