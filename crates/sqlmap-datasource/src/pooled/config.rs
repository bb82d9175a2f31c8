//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlmap_core::{Result, SqlmapError};

/// Ping query used when none has been configured
pub const NO_PING_QUERY_SET: &str = "NO PING QUERY SET";

/// Configuration for a connection pool
///
/// Controls pool sizing, checkout/wait timeouts and connection validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of connections checked out at once
    max_active_connections: usize,
    /// Maximum number of connections kept for reuse
    max_idle_connections: usize,
    /// Time in milliseconds after which a checked-out connection may be reclaimed
    max_checkout_time_ms: u64,
    /// Time in milliseconds a blocked checkout waits before re-evaluating the pool,
    /// 0 waits until a connection is returned
    time_to_wait_ms: u64,
    /// Extra bad connections tolerated within a single checkout, on top of `max_idle_connections`
    max_local_bad_connection_tolerance: usize,
    /// Query sent to the database to validate a connection
    ping_query: String,
    /// Whether the ping query is used at all
    ping_enabled: bool,
    /// Only connections unused for longer than this many milliseconds are pinged
    ping_connections_not_used_for_ms: u64,
}

impl PoolConfig {
    /// Create a pool configuration with the given active and idle limits
    ///
    /// # Panics
    ///
    /// Panics if `max_active` is 0.
    pub fn new(max_active: usize, max_idle: usize) -> Self {
        assert!(
            max_active > 0,
            "max_active must be greater than 0, got {}",
            max_active
        );

        Self {
            max_active_connections: max_active,
            max_idle_connections: max_idle,
            max_checkout_time_ms: 20_000,
            time_to_wait_ms: 20_000,
            max_local_bad_connection_tolerance: 3,
            ping_query: NO_PING_QUERY_SET.to_string(),
            ping_enabled: false,
            ping_connections_not_used_for_ms: 0,
        }
    }

    /// Set the maximum number of active connections
    ///
    /// # Panics
    ///
    /// Panics if `max_active` is 0.
    pub fn with_max_active(mut self, max_active: usize) -> Self {
        assert!(
            max_active > 0,
            "max_active must be greater than 0, got {}",
            max_active
        );
        self.max_active_connections = max_active;
        self
    }

    /// Set the maximum number of idle connections
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle_connections = max_idle;
        self
    }

    /// Set the maximum checkout time in milliseconds
    pub fn with_max_checkout_time_ms(mut self, checkout_ms: u64) -> Self {
        self.max_checkout_time_ms = checkout_ms;
        self
    }

    /// Set the time to wait in milliseconds
    ///
    /// With 0 a blocked checkout sleeps until a connection is returned to
    /// idle or the waiters are interrupted.
    pub fn with_time_to_wait_ms(mut self, wait_ms: u64) -> Self {
        self.time_to_wait_ms = wait_ms;
        self
    }

    /// Set the local bad connection tolerance
    pub fn with_local_bad_connection_tolerance(mut self, tolerance: usize) -> Self {
        self.max_local_bad_connection_tolerance = tolerance;
        self
    }

    /// Set the ping query
    pub fn with_ping_query(mut self, query: impl Into<String>) -> Self {
        self.ping_query = query.into();
        self
    }

    /// Enable or disable the ping query
    pub fn with_ping_enabled(mut self, enabled: bool) -> Self {
        self.ping_enabled = enabled;
        self
    }

    /// Set the idle time in milliseconds after which a connection gets pinged
    pub fn with_ping_connections_not_used_for_ms(mut self, idle_ms: u64) -> Self {
        self.ping_connections_not_used_for_ms = idle_ms;
        self
    }

    pub fn max_active(&self) -> usize {
        self.max_active_connections
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle_connections
    }

    /// Get the maximum checkout time as a Duration
    pub fn max_checkout_time(&self) -> Duration {
        Duration::from_millis(self.max_checkout_time_ms)
    }

    /// Get the time to wait as a Duration
    pub fn time_to_wait(&self) -> Duration {
        Duration::from_millis(self.time_to_wait_ms)
    }

    pub fn local_bad_connection_tolerance(&self) -> usize {
        self.max_local_bad_connection_tolerance
    }

    pub fn ping_query(&self) -> &str {
        &self.ping_query
    }

    pub fn ping_enabled(&self) -> bool {
        self.ping_enabled
    }

    /// Get the ping idle threshold as a Duration
    pub fn ping_connections_not_used_for(&self) -> Duration {
        Duration::from_millis(self.ping_connections_not_used_for_ms)
    }

    /// Number of bad connections one checkout may run into before giving up
    pub(crate) fn bad_connection_limit(&self) -> usize {
        self.max_idle_connections + self.max_local_bad_connection_tolerance
    }

    /// Check invariants that deserialization cannot enforce
    pub fn validate(&self) -> Result<()> {
        if self.max_active_connections == 0 {
            return Err(SqlmapError::Configuration(
                "max_active_connections must be greater than 0".into(),
            ));
        }
        if self.ping_enabled && self.ping_query.trim().is_empty() {
            return Err(SqlmapError::Configuration(
                "ping_enabled requires a non-empty ping_query".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - max_active: 10
    /// - max_idle: 5
    /// - max_checkout_time: 20 seconds
    /// - time_to_wait: 20 seconds
    /// - local bad connection tolerance: 3
    /// - ping: disabled
    fn default() -> Self {
        Self::new(10, 5)
    }
}
