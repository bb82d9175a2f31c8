//! Pool statistics types

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Snapshot of a connection pool's counters
///
/// Taken under the pool lock, so all fields are mutually consistent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Checkouts served
    pub request_count: u64,
    /// Total time spent inside successful checkouts, in milliseconds
    pub accumulated_request_time_ms: u64,
    /// Total time connections spent checked out, in milliseconds
    pub accumulated_checkout_time_ms: u64,
    /// Overdue connections taken back from their holders
    pub claimed_overdue_connection_count: u64,
    /// Checkout time of the reclaimed overdue connections, in milliseconds
    pub accumulated_checkout_time_of_overdue_connections_ms: u64,
    /// Total time checkouts spent blocked, in milliseconds
    pub accumulated_wait_time_ms: u64,
    /// Checkouts that had to block at least once
    pub had_to_wait_count: u64,
    /// Connections found broken on checkout or return
    pub bad_connection_count: u64,
    /// Connections currently available for reuse
    pub idle_connection_count: usize,
    /// Connections currently checked out
    pub active_connection_count: usize,
}

impl PoolStats {
    /// Average time a successful checkout took
    pub fn average_request_time(&self) -> Duration {
        average(self.accumulated_request_time_ms, self.request_count)
    }

    /// Average time a blocked checkout spent waiting
    pub fn average_wait_time(&self) -> Duration {
        average(self.accumulated_wait_time_ms, self.had_to_wait_count)
    }

    /// Average time a connection stayed checked out
    pub fn average_checkout_time(&self) -> Duration {
        average(self.accumulated_checkout_time_ms, self.request_count)
    }

    /// Average checkout time of the connections that were reclaimed as overdue
    pub fn average_overdue_checkout_time(&self) -> Duration {
        average(
            self.accumulated_checkout_time_of_overdue_connections_ms,
            self.claimed_overdue_connection_count,
        )
    }

    /// Total number of tracked connections
    pub fn total(&self) -> usize {
        self.idle_connection_count + self.active_connection_count
    }

    /// Pool utilization as a fraction of tracked connections (0.0 to 1.0)
    ///
    /// Returns 0.0 if no connection is tracked.
    pub fn utilization(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.active_connection_count as f64 / self.total() as f64
        }
    }
}

fn average(total_ms: u64, count: u64) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(total_ms / count)
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===STATUS=====================================================")?;
        writeln!(f, " activeConnections              {}", self.active_connection_count)?;
        writeln!(f, " idleConnections                {}", self.idle_connection_count)?;
        writeln!(f, " requestCount                   {}", self.request_count)?;
        writeln!(f, " averageRequestTime             {}", self.average_request_time().as_millis())?;
        writeln!(
            f,
            " averageCheckoutTime            {}",
            self.average_checkout_time().as_millis()
        )?;
        writeln!(f, " claimedOverdue                 {}", self.claimed_overdue_connection_count)?;
        writeln!(
            f,
            " averageOverdueCheckoutTime     {}",
            self.average_overdue_checkout_time().as_millis()
        )?;
        writeln!(f, " hadToWait                      {}", self.had_to_wait_count)?;
        writeln!(f, " averageWaitTime                {}", self.average_wait_time().as_millis())?;
        writeln!(f, " badConnectionCount             {}", self.bad_connection_count)?;
        write!(f, "===============================================================")
    }
}
