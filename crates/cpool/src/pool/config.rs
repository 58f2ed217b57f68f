//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_CONN_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_CALL_TIMEOUT_MS: u64 = 5_000;

fn default_conn_timeout_ms() -> u64 {
    DEFAULT_CONN_TIMEOUT_MS
}

fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

/// Configuration for a connection pool
///
/// Controls pool identity, sizing and timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool identity, used in generated connection names and diagnostics
    name: String,
    /// Endpoint descriptor handed to the factory, never parsed by the pool
    address: String,
    /// Maximum number of allocated slots (checked out + idle)
    max_conns: usize,
    /// Maximum number of idle connections kept for reuse
    max_idle: usize,
    /// Deadline in milliseconds around each factory invocation
    #[serde(default = "default_conn_timeout_ms")]
    conn_timeout_ms: u64,
    /// Deadline in milliseconds for a single call
    #[serde(default = "default_call_timeout_ms")]
    call_timeout_ms: u64,
}

impl PoolConfig {
    /// Create a new pool configuration
    ///
    /// # Panics
    ///
    /// Panics if `max_conns` is 0 or if `max_idle > max_conns`.
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        max_conns: usize,
        max_idle: usize,
    ) -> Self {
        assert!(
            max_conns > 0,
            "max_conns must be greater than 0, got {}",
            max_conns
        );
        assert!(
            max_idle <= max_conns,
            "max_idle ({}) cannot exceed max_conns ({})",
            max_idle,
            max_conns
        );

        Self {
            name: name.into(),
            address: address.into(),
            max_conns,
            max_idle,
            conn_timeout_ms: DEFAULT_CONN_TIMEOUT_MS,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }

    /// Set the connect timeout in milliseconds
    pub fn with_conn_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.conn_timeout_ms = timeout_ms;
        self
    }

    /// Set the call timeout in milliseconds
    pub fn with_call_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.call_timeout_ms = timeout_ms;
        self
    }

    /// Get the pool name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the endpoint address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Get the maximum number of allocated slots
    pub fn max_conns(&self) -> usize {
        self.max_conns
    }

    /// Get the maximum number of idle connections
    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    /// Get the connect timeout as a Duration
    pub fn conn_timeout(&self) -> Duration {
        Duration::from_millis(self.conn_timeout_ms)
    }

    /// Get the call timeout as a Duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Get the connect timeout in milliseconds
    pub fn conn_timeout_ms(&self) -> u64 {
        self.conn_timeout_ms
    }

    /// Get the call timeout in milliseconds
    pub fn call_timeout_ms(&self) -> u64 {
        self.call_timeout_ms
    }
}
