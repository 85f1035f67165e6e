//! In-memory dialer for pool tests.
//!
//! Every successful dial creates a [`tokio::io::duplex`] pair. The client half
//! goes to the pool; the server half is served by a spawned echo task that
//! lives until the client half is closed or dropped, so [`MockDialer::live`]
//! tracks how many transports are really open.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use netpool::Dialer;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const BUFFER_SIZE: usize = 4096;

/// A scriptable in-memory dialer.
///
/// Cloning yields another handle to the same dialer, so a test can keep one
/// handle while the pool owns another.
#[derive(Clone, Default)]
pub struct MockDialer {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    dials: AtomicU32,
    fail_next: AtomicU32,
    down: AtomicBool,
    hang: AtomicBool,
    delay: Mutex<Duration>,
    live: AtomicUsize,
    successes_left: Mutex<Option<u32>>,
    last_address: Mutex<Option<String>>,
}

impl MockDialer {
    /// Create a dialer that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `count` dials.
    pub fn fail_next(&self, count: u32) {
        self.inner.fail_next.store(count, Ordering::SeqCst);
    }

    /// Let only the next `count` dials succeed and refuse every dial after.
    pub fn limit_successes(&self, count: u32) {
        *self.inner.successes_left.lock() = Some(count);
    }

    /// Refuse every dial while `down` is set.
    pub fn set_down(&self, down: bool) {
        self.inner.down.store(down, Ordering::SeqCst);
    }

    /// Make dials never complete while `hang` is set.
    pub fn set_hang(&self, hang: bool) {
        self.inner.hang.store(hang, Ordering::SeqCst);
    }

    /// Delay every dial by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock() = delay;
    }

    /// Number of dial attempts made, successful or not.
    #[must_use]
    pub fn dials(&self) -> u32 {
        self.inner.dials.load(Ordering::SeqCst)
    }

    /// Number of transports whose client half is still open.
    #[must_use]
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// The address passed to the most recent dial.
    #[must_use]
    pub fn last_address(&self) -> Option<String> {
        self.inner.last_address.lock().clone()
    }

    /// Wait until [`live`](Self::live) equals `expected`, giving up after
    /// `within`. Returns whether the count was reached.
    ///
    /// Echo tasks notice a closed client half asynchronously, so tests poll.
    pub async fn wait_live(&self, expected: usize, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if self.live() == expected {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn should_fail(&self) -> bool {
        if self.inner.down.load(Ordering::SeqCst) {
            return true;
        }
        if self
            .inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return true;
        }
        match self.inner.successes_left.lock().as_mut() {
            Some(0) => true,
            Some(left) => {
                *left -= 1;
                false
            }
            None => false,
        }
    }
}

#[async_trait]
impl Dialer for MockDialer {
    type Stream = DuplexStream;

    async fn dial(&self, protocol: &str, address: &str) -> io::Result<DuplexStream> {
        self.inner.dials.fetch_add(1, Ordering::SeqCst);
        *self.inner.last_address.lock() = Some(address.to_string());

        let delay = *self.inner.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.inner.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.should_fail() {
            tracing::trace!(protocol, address, "mock dial refused");
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("mock refused {protocol} connection to {address}"),
            ));
        }

        let (client, server) = tokio::io::duplex(BUFFER_SIZE);
        self.inner.live.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = echo(server).await {
                tracing::debug!("mock echo error: {}", e);
            }
            inner.live.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(client)
    }
}

async fn echo(mut stream: DuplexStream) -> io::Result<()> {
    let mut buf = [0u8; BUFFER_SIZE];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        stream.write_all(&buf[..n]).await?;
    }
}

impl std::fmt::Debug for MockDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDialer")
            .field("dials", &self.dials())
            .field("live", &self.live())
            .finish_non_exhaustive()
    }
}
