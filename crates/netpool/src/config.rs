//! Pool and factory configuration.
//!
//! Both configurations can be built with consuming builder methods or parsed
//! from a `;`-separated `Key=Value` connection string. The same string can be
//! handed to [`PoolConfig::from_connection_string`] and
//! [`FactoryConfig::from_connection_string`]; each ignores the keys that
//! belong to the other.

use std::time::Duration;

use crate::error::PoolError;

/// Default protocol handed to the dialer.
pub const DEFAULT_PROTOCOL: &str = "tcp";

/// Configuration for the connection pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Number of connections created eagerly when the pool is built.
    pub initial_capacity: u32,

    /// Upper bound on simultaneously live connections, idle and borrowed.
    pub max_capacity: u32,

    /// Wait used by a blocking borrow when the caller passes no timeout.
    ///
    /// `Duration::ZERO` waits indefinitely.
    pub borrow_wait_timeout: Duration,

    /// Time a connection may sit idle before it is evicted.
    ///
    /// `Duration::ZERO` disables eviction.
    pub idle_timeout: Duration,

    /// Connect handle-less (lazy) connections as part of borrowing them.
    ///
    /// When disabled, a lazy connection connects on its first read or write.
    pub activate_on_borrow: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            max_capacity: 10,
            borrow_wait_timeout: Duration::ZERO,
            idle_timeout: Duration::ZERO,
            activate_on_borrow: true,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a pool configuration from a connection string.
    ///
    /// ```rust
    /// use netpool::PoolConfig;
    ///
    /// let config = PoolConfig::from_connection_string(
    ///     "Address=127.0.0.1:8080;Initial Capacity=5;Max Capacity=30;Borrow Wait Timeout=5s",
    /// )
    /// .unwrap();
    /// assert_eq!(config.initial_capacity, 5);
    /// assert_eq!(config.max_capacity, 30);
    /// ```
    pub fn from_connection_string(conn_str: &str) -> Result<Self, PoolError> {
        let mut config = Self::default();

        for (key, value) in parse_pairs(conn_str)? {
            match key.as_str() {
                "initial capacity" | "initcap" | "min connections" => {
                    config.initial_capacity = parse_count(&key, value)?;
                }
                "max capacity" | "maxcap" | "max connections" => {
                    config.max_capacity = parse_count(&key, value)?;
                }
                "borrow wait timeout" | "wait timeout" => {
                    config.borrow_wait_timeout = parse_duration(&key, value)?;
                }
                "idle timeout" => {
                    config.idle_timeout = parse_duration(&key, value)?;
                }
                "activate on borrow" => {
                    config.activate_on_borrow = parse_bool(&key, value)?;
                }
                _ => {
                    // Factory keys share the same string
                    tracing::debug!(key = %key, value = value, "ignoring non-pool option");
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the number of connections created at construction.
    #[must_use]
    pub fn initial_capacity(mut self, count: u32) -> Self {
        self.initial_capacity = count;
        self
    }

    /// Set the maximum number of live connections.
    #[must_use]
    pub fn max_capacity(mut self, count: u32) -> Self {
        self.max_capacity = count;
        self
    }

    /// Set the default wait for blocking borrows.
    #[must_use]
    pub fn borrow_wait_timeout(mut self, timeout: Duration) -> Self {
        self.borrow_wait_timeout = timeout;
        self
    }

    /// Set the idle eviction timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Enable or disable connecting lazy connections on borrow.
    #[must_use]
    pub fn activate_on_borrow(mut self, enabled: bool) -> Self {
        self.activate_on_borrow = enabled;
        self
    }

    /// The configured default blocking wait, `None` meaning forever.
    #[must_use]
    pub fn default_wait(&self) -> Option<Duration> {
        non_zero(self.borrow_wait_timeout)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.initial_capacity > self.max_capacity {
            return Err(PoolError::InvalidConfig(format!(
                "initial_capacity ({}) cannot be greater than max_capacity ({})",
                self.initial_capacity, self.max_capacity
            )));
        }
        Ok(())
    }
}

/// Configuration for the connection factory and its connector.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct FactoryConfig {
    /// Target address, e.g. `127.0.0.1:8080`.
    pub address: String,

    /// Protocol handed to the dialer (default: `tcp`).
    pub protocol: String,

    /// Defer dialing until the connection is first used.
    pub lazy_connect: bool,

    /// Maximum dial attempts per connect (default: 3).
    pub max_connect_retries: u32,

    /// Fixed delay between dial attempts (default: 1s).
    pub retry_delay: Duration,

    /// Timeout for a single dial attempt (default: 30s).
    ///
    /// `Duration::ZERO` disables the timeout.
    pub connect_timeout: Duration,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            lazy_connect: false,
            max_connect_retries: 3,
            retry_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl FactoryConfig {
    /// Create a factory configuration for the given target address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Parse a factory configuration from a connection string.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use netpool::FactoryConfig;
    ///
    /// let config = FactoryConfig::from_connection_string(
    ///     "Server=127.0.0.1:8080;Protocol=tcp;Max Connect Retries=5;Retry Delay=250ms",
    /// )
    /// .unwrap();
    /// assert_eq!(config.address, "127.0.0.1:8080");
    /// assert_eq!(config.retry_delay, Duration::from_millis(250));
    /// ```
    pub fn from_connection_string(conn_str: &str) -> Result<Self, PoolError> {
        let mut config = Self::default();

        for (key, value) in parse_pairs(conn_str)? {
            match key.as_str() {
                "address" | "server" | "host" => {
                    config.address = value.to_string();
                }
                "protocol" => {
                    config.protocol = value.to_ascii_lowercase();
                }
                "lazy connect" | "lazy" => {
                    config.lazy_connect = parse_bool(&key, value)?;
                }
                "max connect retries" | "connect retries" => {
                    config.max_connect_retries = parse_count(&key, value)?;
                }
                "retry delay" => {
                    config.retry_delay = parse_duration(&key, value)?;
                }
                "connect timeout" | "connection timeout" => {
                    config.connect_timeout = parse_duration(&key, value)?;
                }
                _ => {
                    tracing::debug!(key = %key, value = value, "ignoring non-factory option");
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the protocol.
    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Enable or disable lazy connect.
    #[must_use]
    pub fn lazy_connect(mut self, enabled: bool) -> Self {
        self.lazy_connect = enabled;
        self
    }

    /// Set the maximum number of dial attempts.
    #[must_use]
    pub fn max_connect_retries(mut self, attempts: u32) -> Self {
        self.max_connect_retries = attempts;
        self
    }

    /// Set the delay between dial attempts.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the per-attempt connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The per-attempt timeout, `None` meaning no timeout.
    #[must_use]
    pub fn attempt_timeout(&self) -> Option<Duration> {
        non_zero(self.connect_timeout)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.address.trim().is_empty() {
            return Err(PoolError::InvalidConfig(
                "target address must not be empty".into(),
            ));
        }
        if self.protocol.trim().is_empty() {
            return Err(PoolError::InvalidConfig("protocol must not be empty".into()));
        }
        Ok(())
    }
}

fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

fn parse_pairs(conn_str: &str) -> Result<Vec<(String, &str)>, PoolError> {
    let mut pairs = Vec::new();

    for part in conn_str.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| PoolError::InvalidConfig(format!("invalid key-value: {part}")))?;

        pairs.push((key.trim().to_lowercase(), value.trim()));
    }

    Ok(pairs)
}

fn parse_count(key: &str, value: &str) -> Result<u32, PoolError> {
    value
        .parse()
        .map_err(|_| PoolError::InvalidConfig(format!("invalid {key}: {value}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, PoolError> {
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") || value == "1" {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") || value.eq_ignore_ascii_case("no") || value == "0"
    {
        Ok(false)
    } else {
        Err(PoolError::InvalidConfig(format!("invalid {key}: {value}")))
    }
}

/// Parse `250ms`, `5s`, `2m` or a bare number of seconds.
fn parse_duration(key: &str, value: &str) -> Result<Duration, PoolError> {
    let invalid = || PoolError::InvalidConfig(format!("invalid {key}: {value}"));
    let value = value.trim();

    let (digits, unit): (&str, fn(u64) -> Duration) = if let Some(ms) = value.strip_suffix("ms")
    {
        (ms, Duration::from_millis)
    } else if let Some(secs) = value.strip_suffix('s') {
        (secs, Duration::from_secs)
    } else if let Some(mins) = value.strip_suffix('m') {
        (mins, |m| Duration::from_secs(m.saturating_mul(60)))
    } else {
        (value, Duration::from_secs)
    };

    digits.trim().parse::<u64>().map(unit).map_err(|_| invalid())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.initial_capacity, 0);
        assert_eq!(config.max_capacity, 10);
        assert_eq!(config.default_wait(), None);
        assert!(config.activate_on_borrow);

        let factory = FactoryConfig::default();
        assert_eq!(factory.protocol, DEFAULT_PROTOCOL);
        assert_eq!(factory.max_connect_retries, 3);
        assert!(!factory.lazy_connect);
    }

    #[test]
    fn test_config_builder_methods() {
        let config = PoolConfig::new()
            .initial_capacity(5)
            .max_capacity(30)
            .borrow_wait_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(60))
            .activate_on_borrow(false);

        assert_eq!(config.initial_capacity, 5);
        assert_eq!(config.max_capacity, 30);
        assert_eq!(config.default_wait(), Some(Duration::from_secs(5)));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert!(!config.activate_on_borrow);

        let factory = FactoryConfig::new("10.0.0.1:6379")
            .protocol("tcp4")
            .lazy_connect(true)
            .max_connect_retries(7)
            .retry_delay(Duration::from_millis(10))
            .connect_timeout(Duration::ZERO);

        assert_eq!(factory.address, "10.0.0.1:6379");
        assert_eq!(factory.protocol, "tcp4");
        assert!(factory.lazy_connect);
        assert_eq!(factory.max_connect_retries, 7);
        assert_eq!(factory.attempt_timeout(), None);
    }

    #[test]
    fn test_config_validation_initial_greater_than_max() {
        let result = PoolConfig::new()
            .initial_capacity(20)
            .max_capacity(10)
            .validate();

        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("cannot be greater than max_capacity")
        );
    }

    #[test]
    fn test_config_equal_and_zero_capacities() {
        assert!(PoolConfig::new().initial_capacity(5).max_capacity(5).validate().is_ok());
        assert!(PoolConfig::new().initial_capacity(0).max_capacity(0).validate().is_ok());
    }

    #[test]
    fn test_factory_validation_empty_address() {
        let result = FactoryConfig::new("  ").validate();
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn test_shared_connection_string() {
        let conn_str = "Address=127.0.0.1:8080; Protocol=TCP; Initial Capacity=2; \
                        Max Capacity=4; Lazy Connect=yes; Max Connect Retries=5; \
                        Retry Delay=10ms; Connect Timeout=2; Borrow Wait Timeout=1m; \
                        Idle Timeout=0; Activate On Borrow=false; Unknown=whatever";

        let pool = PoolConfig::from_connection_string(conn_str).unwrap();
        assert_eq!(pool.initial_capacity, 2);
        assert_eq!(pool.max_capacity, 4);
        assert_eq!(pool.borrow_wait_timeout, Duration::from_secs(60));
        assert_eq!(pool.idle_timeout, Duration::ZERO);
        assert!(!pool.activate_on_borrow);

        let factory = FactoryConfig::from_connection_string(conn_str).unwrap();
        assert_eq!(factory.address, "127.0.0.1:8080");
        assert_eq!(factory.protocol, "tcp");
        assert!(factory.lazy_connect);
        assert_eq!(factory.max_connect_retries, 5);
        assert_eq!(factory.retry_delay, Duration::from_millis(10));
        assert_eq!(factory.connect_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_connection_string_errors() {
        assert!(PoolConfig::from_connection_string("Max Capacity").is_err());
        assert!(PoolConfig::from_connection_string("Max Capacity=-1").is_err());
        assert!(PoolConfig::from_connection_string("Idle Timeout=soon").is_err());
        assert!(FactoryConfig::from_connection_string("Lazy Connect=maybe").is_err());
        // Address is mandatory for the factory half
        assert!(FactoryConfig::from_connection_string("Max Capacity=3").is_err());
    }
}
