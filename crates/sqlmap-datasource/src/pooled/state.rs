//! Bookkeeping for the connections a pool tracks

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use super::connection::PooledConnection;
use super::stats::PoolStats;

/// Idle and active connections plus running statistics
///
/// Only ever touched while the owning pool's lock is held.
#[derive(Default)]
pub(crate) struct PoolState {
    /// Connections available for reuse, oldest-returned first
    pub idle: VecDeque<PooledConnection>,
    /// Checked-out connections, oldest checkout first
    pub active: VecDeque<PooledConnection>,
    pub request_count: u64,
    pub accumulated_request_time: Duration,
    pub accumulated_checkout_time: Duration,
    pub claimed_overdue_connection_count: u64,
    pub accumulated_checkout_time_of_overdue_connections: Duration,
    pub accumulated_wait_time: Duration,
    pub had_to_wait_count: u64,
    pub bad_connection_count: u64,
}

impl PoolState {
    /// Take the active entry that belongs to the wrapper with this validity flag
    pub fn take_active(&mut self, valid: &Arc<AtomicBool>) -> Option<PooledConnection> {
        let position = self.active.iter().position(|c| c.owns_flag(valid))?;
        self.active.remove(position)
    }

    /// Physical connections tracked as idle and active at the same time
    #[cfg(test)]
    pub fn tracked_twice(&self) -> usize {
        self.idle.iter().filter(|conn| self.active.contains(conn)).count()
    }

    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            request_count: self.request_count,
            accumulated_request_time_ms: millis(self.accumulated_request_time),
            accumulated_checkout_time_ms: millis(self.accumulated_checkout_time),
            claimed_overdue_connection_count: self.claimed_overdue_connection_count,
            accumulated_checkout_time_of_overdue_connections_ms: millis(
                self.accumulated_checkout_time_of_overdue_connections,
            ),
            accumulated_wait_time_ms: millis(self.accumulated_wait_time),
            had_to_wait_count: self.had_to_wait_count,
            bad_connection_count: self.bad_connection_count,
            idle_connection_count: self.idle.len(),
            active_connection_count: self.active.len(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
