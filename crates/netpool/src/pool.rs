//! Connection pool implementation.
//!
//! The pool owns a bounded LIFO free-list of idle connections and a permit
//! count of creation slots not yet consumed. One mutex covers both, together
//! with the borrowed count and the closed flag, and it is never held across
//! an `.await`. At every point
//!
//! ```text
//! permits + idle + borrowed == max_capacity
//! ```
//!
//! A slot being created counts as borrowed from the moment its permit is
//! taken; a [`Reservation`] guard gives it back if creation fails or the
//! borrowing future is dropped. Blocked borrowers wait on a [`Notify`] that
//! every return, destruction and close signals.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::config::{FactoryConfig, PoolConfig};
use crate::connection::PooledConnection;
use crate::error::PoolError;
use crate::factory::{Factory, Slot};
use crate::lifecycle::ConnectionState;
use crate::metrics::{MetricsSnapshot, PoolMetrics};
use crate::transport::{Dialer, TcpDialer};

/// A bounded pool of reusable connections to one target.
///
/// Cloning is cheap and yields another handle to the same pool.
pub struct Pool<D: Dialer = TcpDialer> {
    shared: Arc<Shared<D>>,
}

/// State shared between the pool handles and the connections it issued.
///
/// Connections hold it weakly so a dropped pool never outlives its handles.
pub(crate) struct Shared<D: Dialer> {
    config: PoolConfig,
    max: usize,
    factory: Arc<Factory<D>>,
    state: Mutex<PoolState<D::Stream>>,
    available: Notify,
    metrics: PoolMetrics,
}

struct PoolState<S> {
    /// Idle connections; the most recently returned is borrowed first.
    idle: Vec<Slot<S>>,
    /// Creation slots not yet consumed.
    permits: usize,
    /// Connections held by callers, including ones still being created.
    borrowed: usize,
    closed: bool,
}

/// A consumed creation permit that is given back unless committed.
struct Reservation<'a, D: Dialer> {
    shared: &'a Shared<D>,
    armed: bool,
}

impl<D: Dialer> Reservation<'_, D> {
    fn commit(mut self) {
        self.armed = false;
    }
}

impl<D: Dialer> Drop for Reservation<'_, D> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.release_slot();
        }
    }
}

enum Acquired<'a, D: Dialer> {
    Idle(PooledConnection<D>),
    Permit(Reservation<'a, D>),
}

impl<D: Dialer> Shared<D> {
    fn reserve(&self) -> Option<Reservation<'_, D>> {
        let mut state = self.state.lock();
        if state.permits == 0 {
            return None;
        }
        state.permits -= 1;
        state.borrowed += 1;
        Some(Reservation {
            shared: self,
            armed: true,
        })
    }

    /// Give back the capacity of a borrowed slot that will not return.
    pub(crate) fn release_slot(&self) {
        {
            let mut state = self.state.lock();
            state.borrowed -= 1;
            state.permits += 1;
        }
        self.available.notify_waiters();
    }

    /// Take back a borrowed slot.
    ///
    /// Returns the slot when the caller must really close it: it was marked
    /// unusable, the pool is closed, or the free-list is unexpectedly full.
    /// Its permit is already restored in that case.
    pub(crate) fn check_in(
        &self,
        mut slot: Slot<D::Stream>,
        usable: bool,
    ) -> Option<Slot<D::Stream>> {
        // An activation dropped mid-dial leaves no stream behind.
        if slot.stream.is_none() && slot.meta.state == ConnectionState::Connecting {
            slot.meta.state = ConnectionState::Unconnected;
        }

        let rejected = {
            let mut state = self.state.lock();
            state.borrowed -= 1;
            if usable && !state.closed && state.idle.len() < self.max {
                slot.meta.mark_checkin();
                state.idle.push(slot);
                None
            } else {
                if usable && !state.closed {
                    tracing::warn!(
                        id = %slot.meta.id,
                        max = self.max,
                        "free-list full, closing returned connection"
                    );
                }
                state.permits += 1;
                Some(slot)
            }
        };

        self.available.notify_waiters();
        match rejected {
            Some(slot) => {
                self.metrics.record_closed();
                Some(slot)
            }
            None => {
                tracing::trace!("connection returned to pool");
                None
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Really close slots already removed from accounting.
    async fn discard(&self, slots: Vec<Slot<D::Stream>>) {
        for slot in slots {
            self.metrics.record_closed();
            if let Err(e) = self.factory.destroy(slot).await {
                tracing::debug!(error = %e, "error closing evicted connection");
            }
        }
    }
}

impl<D: Dialer> Pool<D> {
    /// Create a pool and eagerly fill it with `initial_capacity` connections.
    ///
    /// If any warm-up connection cannot be created, every connection created
    /// so far is closed, all permits are restored and the call fails with
    /// [`PoolError::FillFailed`].
    pub async fn new(config: PoolConfig, factory: Factory<D>) -> Result<Self, PoolError> {
        config.validate()?;

        let max = config.max_capacity as usize;
        let initial = config.initial_capacity as usize;
        let pool = Self {
            shared: Arc::new(Shared {
                max,
                factory: Arc::new(factory),
                state: Mutex::new(PoolState {
                    idle: Vec::with_capacity(max),
                    permits: max,
                    borrowed: 0,
                    closed: false,
                }),
                available: Notify::new(),
                metrics: PoolMetrics::default(),
                config,
            }),
        };

        if let Err(e) = pool.fill(initial).await {
            tracing::warn!(error = %e, "pool warm-up failed");
            return Err(PoolError::FillFailed(Box::new(e)));
        }

        tracing::info!(
            address = %pool.shared.factory.config().address,
            initial = initial,
            max = max,
            lazy = pool.shared.factory.is_lazy(),
            "connection pool created"
        );
        Ok(pool)
    }

    /// Create a builder for a TCP pool.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    async fn fill(&self, count: usize) -> Result<(), PoolError> {
        for _ in 0..count {
            let reservation = self
                .shared
                .reserve()
                .ok_or(PoolError::CapacityExceeded {
                    max: self.shared.config.max_capacity,
                })?;

            match self.shared.factory.create().await {
                Ok(slot) => {
                    self.shared.metrics.record_created();
                    reservation.commit();
                    if let Some(slot) = self.shared.check_in(slot, true) {
                        self.shared.factory.destroy(slot).await?;
                    }
                }
                Err(e) => {
                    self.shared.metrics.record_connect_failure();
                    drop(reservation);
                    self.close().await;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Borrow a connection without waiting.
    ///
    /// Hands out the most recently returned idle connection if there is one,
    /// otherwise creates a new connection if a permit is left. Fails with
    /// [`PoolError::CapacityExceeded`] when neither is available, or with
    /// [`PoolError::ConnectFailed`] if creation fails (the permit is
    /// restored).
    pub async fn borrow(&self) -> Result<PooledConnection<D>, PoolError> {
        tracing::trace!("borrowing connection from pool");

        match self.acquire().await? {
            Some(Acquired::Idle(conn)) => self.hand_out(conn).await,
            Some(Acquired::Permit(reservation)) => self.create(reservation).await,
            None => Err(PoolError::CapacityExceeded {
                max: self.shared.config.max_capacity,
            }),
        }
    }

    /// Borrow a connection, waiting until one is free, a permit is available,
    /// or `timeout` expires.
    ///
    /// `None` uses the configured `borrow_wait_timeout`; a zero configured
    /// timeout waits indefinitely. Fails with [`PoolError::DeadlineExceeded`]
    /// on expiry. Waiters are not served in FIFO order.
    pub async fn blocking_borrow(
        &self,
        timeout: Option<Duration>,
    ) -> Result<PooledConnection<D>, PoolError> {
        self.wait_for(None, timeout).await
    }

    /// Like [`blocking_borrow`](Self::blocking_borrow), but also gives up with
    /// [`PoolError::Cancelled`] as soon as `cancel` fires.
    ///
    /// Cancellation is checked before availability. A cancelled borrow never
    /// holds on to a permit or a connection.
    pub async fn blocking_borrow_with_cancel(
        &self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<PooledConnection<D>, PoolError> {
        self.wait_for(Some(cancel), timeout).await
    }

    async fn wait_for(
        &self,
        cancel: Option<&CancellationToken>,
        timeout: Option<Duration>,
    ) -> Result<PooledConnection<D>, PoolError> {
        let wait = timeout
            .filter(|t| !t.is_zero())
            .or_else(|| self.shared.config.default_wait());
        let deadline = wait.map(|w| Instant::now() + w);

        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        // Dropping the losing branch unwinds any reservation or connection
        // it holds through their guards.
        tokio::select! {
            biased;

            () = cancelled => {
                tracing::debug!("blocking borrow cancelled");
                Err(PoolError::Cancelled)
            }
            () = expired => {
                self.shared.metrics.record_timeout();
                let waited = wait.unwrap_or_default();
                tracing::debug!(waited = ?waited, "blocking borrow timed out");
                Err(PoolError::DeadlineExceeded(waited))
            }
            result = self.acquire_blocking() => result,
        }
    }

    async fn acquire_blocking(&self) -> Result<PooledConnection<D>, PoolError> {
        loop {
            // Register before inspecting state so a release in between is seen
            let notified = self.shared.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.acquire().await? {
                Some(Acquired::Idle(conn)) => return self.hand_out(conn).await,
                // A failed creation is reported, not retried by waiting again
                Some(Acquired::Permit(reservation)) => return self.create(reservation).await,
                None => notified.await,
            }
        }
    }

    /// Pop an idle connection or reserve a permit, evicting stale idles.
    async fn acquire(&self) -> Result<Option<Acquired<'_, D>>, PoolError> {
        let mut stale = Vec::new();
        let acquired = self.try_acquire(&mut stale);
        if !stale.is_empty() {
            self.shared.available.notify_waiters();
            self.shared.discard(stale).await;
        }
        acquired
    }

    fn try_acquire(
        &self,
        stale: &mut Vec<Slot<D::Stream>>,
    ) -> Result<Option<Acquired<'_, D>>, PoolError> {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        if state.closed {
            return Err(PoolError::Closed);
        }

        let idle_timeout = self.shared.config.idle_timeout;
        if state
            .idle
            .iter()
            .any(|slot| slot.meta.is_idle_expired(idle_timeout))
        {
            let (expired, fresh): (Vec<_>, Vec<_>) = std::mem::take(&mut state.idle)
                .into_iter()
                .partition(|slot| slot.meta.is_idle_expired(idle_timeout));
            tracing::debug!(count = expired.len(), "evicting idle connections");
            state.permits += expired.len();
            state.idle = fresh;
            stale.extend(expired);
        }

        if let Some(mut slot) = state.idle.pop() {
            state.borrowed += 1;
            slot.meta.mark_checkout();
            return Ok(Some(Acquired::Idle(self.wrap(slot))));
        }

        if state.permits > 0 {
            state.permits -= 1;
            state.borrowed += 1;
            return Ok(Some(Acquired::Permit(Reservation {
                shared: &self.shared,
                armed: true,
            })));
        }

        Ok(None)
    }

    async fn create(
        &self,
        reservation: Reservation<'_, D>,
    ) -> Result<PooledConnection<D>, PoolError> {
        let slot = match self.shared.factory.create().await {
            Ok(slot) => slot,
            Err(e) => {
                self.shared.metrics.record_connect_failure();
                return Err(e);
            }
        };
        self.shared.metrics.record_created();

        if self.shared.is_closed() {
            self.shared.metrics.record_closed();
            if let Err(e) = self.shared.factory.destroy(slot).await {
                tracing::debug!(error = %e, "error closing connection created after close");
            }
            return Err(PoolError::Closed);
        }

        let mut slot = slot;
        slot.meta.mark_checkout();
        reservation.commit();
        let conn = self.wrap(slot);
        self.hand_out(conn).await
    }

    fn wrap(&self, slot: Slot<D::Stream>) -> PooledConnection<D> {
        PooledConnection::new(
            slot,
            Arc::clone(&self.shared.factory),
            Arc::downgrade(&self.shared),
        )
    }

    async fn hand_out(
        &self,
        mut conn: PooledConnection<D>,
    ) -> Result<PooledConnection<D>, PoolError> {
        if self.shared.config.activate_on_borrow && !self.shared.factory.validate(conn.slot()) {
            if let Err(e) = conn.connect().await {
                self.shared.metrics.record_connect_failure();
                conn.mark_unusable();
                if let Err(close_err) = conn.close().await {
                    tracing::debug!(error = %close_err, "error closing failed connection");
                }
                return Err(e);
            }
        }

        self.shared.metrics.record_borrow();
        tracing::trace!(id = %conn.id(), "connection borrowed");
        Ok(conn)
    }

    /// Return a borrowed connection.
    ///
    /// Equivalent to [`PooledConnection::close`]. `None` is rejected with
    /// [`PoolError::NilConnection`], which lets callers hand back an
    /// `Option` slot they [`take`](Option::take) from.
    pub async fn put(&self, conn: Option<PooledConnection<D>>) -> Result<(), PoolError> {
        match conn {
            Some(conn) => conn.close().await,
            None => Err(PoolError::NilConnection),
        }
    }

    /// Close the pool.
    ///
    /// Idempotent. Marks the pool closed, wakes every blocked borrower (they
    /// fail with [`PoolError::Closed`]) and really closes every idle
    /// connection. Connections currently borrowed are closed when their
    /// holders return them.
    pub async fn close(&self) {
        let drained = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained = std::mem::take(&mut state.idle);
            state.permits += drained.len();
            drained
        };

        self.shared.available.notify_waiters();
        let count = drained.len();
        self.shared.discard(drained).await;
        tracing::info!(closed = count, "connection pool closed");
    }

    /// Number of idle connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    /// Check if there are no idle connections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of idle connections, reported alongside [`borrowed`](Self::borrowed).
    #[must_use]
    pub fn idle(&self) -> usize {
        self.len()
    }

    /// Number of connections held by callers (including ones being created).
    #[must_use]
    pub fn borrowed(&self) -> usize {
        self.shared.state.lock().borrowed
    }

    /// Number of creation permits left.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.shared.state.lock().permits
    }

    /// Get the current pool status from a single consistent view.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.shared.state.lock();
        PoolStatus {
            idle: state.idle.len(),
            in_use: state.borrowed,
            permits: state.permits,
            max: self.shared.max,
        }
    }

    /// Get the lifecycle counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Get the factory configuration.
    #[must_use]
    pub fn factory_config(&self) -> &FactoryConfig {
        self.shared.factory.config()
    }
}

impl Pool<TcpDialer> {
    /// Create a TCP pool from a connection string.
    ///
    /// ```rust,ignore
    /// let pool = Pool::connect(
    ///     "Address=127.0.0.1:8080;Initial Capacity=5;Max Capacity=30;Retry Delay=100ms",
    /// )
    /// .await?;
    /// ```
    pub async fn connect(conn_str: &str) -> Result<Self, PoolError> {
        let config = PoolConfig::from_connection_string(conn_str)?;
        let factory = Factory::tcp(FactoryConfig::from_connection_string(conn_str)?)?;
        Self::new(config, factory).await
    }
}

impl<D: Dialer> Clone for Pool<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: Dialer> std::fmt::Debug for Pool<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub idle: usize,
    /// Number of connections currently borrowed.
    pub in_use: usize,
    /// Creation permits left.
    pub permits: usize,
    /// Maximum allowed connections.
    pub max: usize,
}

impl PoolStatus {
    /// Number of live connections, idle and borrowed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.idle + self.in_use
    }
}

/// Builder for a [`Pool`].
#[derive(Debug, Clone, Default)]
pub struct PoolBuilder {
    pool: PoolConfig,
    factory: FactoryConfig,
}

impl PoolBuilder {
    /// Create a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target address.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.factory.address = address.into();
        self
    }

    /// Set the dial protocol.
    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.factory = self.factory.protocol(protocol);
        self
    }

    /// Set the number of connections created at construction.
    #[must_use]
    pub fn initial_capacity(mut self, count: u32) -> Self {
        self.pool = self.pool.initial_capacity(count);
        self
    }

    /// Set the maximum number of live connections.
    #[must_use]
    pub fn max_capacity(mut self, count: u32) -> Self {
        self.pool = self.pool.max_capacity(count);
        self
    }

    /// Set the default wait for blocking borrows.
    #[must_use]
    pub fn borrow_wait_timeout(mut self, timeout: Duration) -> Self {
        self.pool = self.pool.borrow_wait_timeout(timeout);
        self
    }

    /// Set the idle eviction timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool = self.pool.idle_timeout(timeout);
        self
    }

    /// Enable or disable connecting lazy connections on borrow.
    #[must_use]
    pub fn activate_on_borrow(mut self, enabled: bool) -> Self {
        self.pool = self.pool.activate_on_borrow(enabled);
        self
    }

    /// Enable or disable lazy connect.
    #[must_use]
    pub fn lazy_connect(mut self, enabled: bool) -> Self {
        self.factory = self.factory.lazy_connect(enabled);
        self
    }

    /// Set the maximum number of dial attempts.
    #[must_use]
    pub fn max_connect_retries(mut self, attempts: u32) -> Self {
        self.factory = self.factory.max_connect_retries(attempts);
        self
    }

    /// Set the delay between dial attempts.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.factory = self.factory.retry_delay(delay);
        self
    }

    /// Set the per-attempt connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.factory = self.factory.connect_timeout(timeout);
        self
    }

    /// Build a TCP pool.
    pub async fn build(self) -> Result<Pool<TcpDialer>, PoolError> {
        self.build_with(TcpDialer::new()).await
    }

    /// Build a pool dialing through `dialer`.
    pub async fn build_with<D: Dialer>(self, dialer: D) -> Result<Pool<D>, PoolError> {
        let factory = Factory::new(dialer, self.factory)?;
        Pool::new(self.pool, factory).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use async_trait::async_trait;
    use tokio::io::DuplexStream;

    #[derive(Default)]
    struct TestDialer {
        down: AtomicBool,
        hang: AtomicBool,
        dials: AtomicU32,
    }

    #[async_trait]
    impl Dialer for Arc<TestDialer> {
        type Stream = DuplexStream;

        async fn dial(&self, _protocol: &str, _address: &str) -> io::Result<DuplexStream> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.down.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "down"));
            }
            let (client, _server) = tokio::io::duplex(64);
            Ok(client)
        }
    }

    async fn pool(
        initial: u32,
        max: u32,
        lazy: bool,
    ) -> (Arc<TestDialer>, Result<Pool<Arc<TestDialer>>, PoolError>) {
        let dialer = Arc::new(TestDialer::default());
        let pool = Pool::<Arc<TestDialer>>::builder()
            .address("mock:1")
            .initial_capacity(initial)
            .max_capacity(max)
            .lazy_connect(lazy)
            .max_connect_retries(1)
            .retry_delay(Duration::ZERO)
            .build_with(Arc::clone(&dialer))
            .await;
        (dialer, pool)
    }

    fn assert_conserved<D: Dialer>(pool: &Pool<D>) {
        let status = pool.status();
        assert_eq!(status.permits + status.idle + status.in_use, status.max);
    }

    #[tokio::test]
    async fn test_invalid_capacity() {
        let (_, result) = pool(4, 2, false).await;
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_warm_up() {
        let (dialer, pool) = pool(5, 30, false).await;
        let pool = pool.unwrap();

        assert_eq!(pool.idle(), 5);
        assert_eq!(pool.len(), 5);
        assert_eq!(pool.borrowed(), 0);
        assert_eq!(pool.available_permits(), 25);
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 5);
        assert_conserved(&pool);
    }

    #[tokio::test]
    async fn test_reservation_restores_on_drop() {
        let (_, pool) = pool(0, 2, false).await;
        let pool = pool.unwrap();

        let reservation = pool.shared.reserve().unwrap();
        assert_eq!(pool.available_permits(), 1);
        assert_eq!(pool.borrowed(), 1);
        assert_conserved(&pool);

        drop(reservation);
        assert_eq!(pool.available_permits(), 2);
        assert_eq!(pool.borrowed(), 0);
    }

    #[tokio::test]
    async fn test_borrow_is_lifo() {
        let (_, pool) = pool(0, 3, false).await;
        let pool = pool.unwrap();

        let a = pool.borrow().await.unwrap();
        let b = pool.borrow().await.unwrap();
        let (a_id, b_id) = (a.id(), b.id());

        a.close().await.unwrap();
        b.close().await.unwrap();

        let next = pool.borrow().await.unwrap();
        assert_eq!(next.id(), b_id);
        let after = pool.borrow().await.unwrap();
        assert_eq!(after.id(), a_id);
        assert_conserved(&pool);
    }

    #[tokio::test]
    async fn test_failed_create_restores_permit() {
        let (dialer, pool) = pool(0, 1, false).await;
        let pool = pool.unwrap();
        dialer.down.store(true, Ordering::SeqCst);

        let err = pool.borrow().await.unwrap_err();
        assert!(matches!(err, PoolError::ConnectFailed { .. }));
        assert_eq!(pool.available_permits(), 1);
        assert_eq!(pool.borrowed(), 0);
        assert_eq!(pool.metrics().connect_failures, 1);
    }

    #[tokio::test]
    async fn test_lazy_activation_on_borrow() {
        let (dialer, pool) = pool(2, 2, true).await;
        let pool = pool.unwrap();
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 0);

        let conn = pool.borrow().await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 1);

        dialer.down.store(true, Ordering::SeqCst);
        let err = pool.borrow().await.unwrap_err();
        assert!(matches!(err, PoolError::ConnectFailed { .. }));
        // The unconnectable idle connection was destroyed, not recycled
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.available_permits(), 1);
        assert_conserved(&pool);
    }

    #[tokio::test]
    async fn test_interrupted_activation_returns_unconnected() {
        let (dialer, pool) = pool(1, 1, true).await;
        let pool = pool.unwrap();

        dialer.hang.store(true, Ordering::SeqCst);
        let err = pool
            .blocking_borrow(Some(Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::DeadlineExceeded(_)));

        {
            let state = pool.shared.state.lock();
            assert_eq!(state.idle.len(), 1);
            assert!(state.idle[0].stream.is_none());
            assert_eq!(state.idle[0].meta.state, ConnectionState::Unconnected);
        }
        assert_conserved(&pool);

        dialer.hang.store(false, Ordering::SeqCst);
        let conn = pool.borrow().await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.metadata().state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_fill_failure_tears_down() {
        let dialer = Arc::new(TestDialer::default());
        let config = FactoryConfig::new("mock:1")
            .max_connect_retries(1)
            .retry_delay(Duration::ZERO);
        let factory = Factory::new(Arc::clone(&dialer), config).unwrap();

        dialer.down.store(true, Ordering::SeqCst);
        let err = Pool::new(PoolConfig::new().initial_capacity(3).max_capacity(3), factory)
            .await
            .unwrap_err();

        match err {
            PoolError::FillFailed(inner) => {
                assert!(matches!(*inner, PoolError::ConnectFailed { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_idle_timeout_evicts() {
        let dialer = Arc::new(TestDialer::default());
        let pool = Pool::<Arc<TestDialer>>::builder()
            .address("mock:1")
            .initial_capacity(2)
            .max_capacity(2)
            .idle_timeout(Duration::from_millis(20))
            .max_connect_retries(1)
            .build_with(Arc::clone(&dialer))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        let conn = pool.borrow().await.unwrap();
        // Both warm connections expired; a fresh one was dialed
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 3);
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.borrowed(), 1);
        assert_eq!(pool.metrics().connections_closed, 2);
        assert_conserved(&pool);
        drop(conn);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_, pool) = pool(2, 4, false).await;
        let pool = pool.unwrap();

        pool.close().await;
        pool.close().await;

        assert!(pool.is_closed());
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.available_permits(), 4);
        assert!(matches!(pool.borrow().await, Err(PoolError::Closed)));
    }
}
