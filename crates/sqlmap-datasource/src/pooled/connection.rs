//! Pooled connection wrapper and the proxy handed to callers

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use sqlmap_core::{
    Connection, IsolationLevel, QueryResult, Result, SqlmapError, StatementResult, Value,
};

use super::data_source::{PoolInner, PoolShared};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// The pool's bookkeeping record for one physical connection
///
/// A physical connection goes through a sequence of wrappers: every time it
/// changes hands (returned to idle, reclaimed as overdue) the pool mints a
/// fresh wrapper and invalidates the previous one, so a stale holder can no
/// longer reach it. Fields other than the validity flag are only touched
/// under the pool lock.
pub struct PooledConnection {
    raw: Arc<dyn Connection>,
    /// Stable identifier of the physical connection, for logs
    id: u64,
    /// Shared with the proxy of this wrapper
    valid: Arc<AtomicBool>,
    type_code: u64,
    created_at: Instant,
    last_used_at: Instant,
    checkout_at: Instant,
}

impl PooledConnection {
    /// Wrap a freshly opened physical connection
    pub(crate) fn new(raw: Arc<dyn Connection>) -> Self {
        let now = Instant::now();
        Self {
            raw,
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            valid: Arc::new(AtomicBool::new(true)),
            type_code: 0,
            created_at: now,
            last_used_at: now,
            checkout_at: now,
        }
    }

    /// Mint a new wrapper around the same physical connection
    ///
    /// Creation and last-use times carry over; the new wrapper starts valid
    /// with its own flag.
    pub(crate) fn rewrap(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            id: self.id,
            valid: Arc::new(AtomicBool::new(true)),
            type_code: 0,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
            checkout_at: Instant::now(),
        }
    }

    /// Mark this wrapper unusable; idempotent
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    /// Whether this wrapper has not been invalidated
    ///
    /// Does not talk to the database; see [`PooledConnection::is_valid`].
    pub fn is_marked_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// Whether the wrapper is valid and the pool's ping accepts the connection
    pub(crate) fn is_valid(&self, pool: &PoolInner) -> bool {
        self.is_marked_valid() && pool.ping_connection(self)
    }

    pub fn raw(&self) -> &Arc<dyn Connection> {
        &self.raw
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn type_code(&self) -> u64 {
        self.type_code
    }

    pub(crate) fn set_type_code(&mut self, type_code: u64) {
        self.type_code = type_code;
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    pub fn checkout_at(&self) -> Instant {
        self.checkout_at
    }

    /// Stamp checkout and last-use time
    pub(crate) fn mark_checked_out(&mut self) {
        let now = Instant::now();
        self.checkout_at = now;
        self.last_used_at = now;
    }

    /// How long the connection has been checked out
    pub fn checkout_duration(&self) -> Duration {
        self.checkout_at.elapsed()
    }

    /// How long since the connection was last used
    pub fn idle_duration(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    /// Time since the physical connection was opened
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn owns_flag(&self, valid: &Arc<AtomicBool>) -> bool {
        Arc::ptr_eq(&self.valid, valid)
    }

    /// Build the caller-facing connection for this wrapper
    pub(crate) fn proxy(&self, pool: Weak<PoolShared>) -> ConnectionProxy {
        ConnectionProxy {
            raw: self.raw.clone(),
            id: self.id,
            valid: self.valid.clone(),
            pool,
            released: AtomicBool::new(false),
        }
    }

    fn raw_address(&self) -> *const () {
        Arc::as_ptr(&self.raw) as *const ()
    }
}

/// Wrappers are equal when they wrap the same physical connection
impl PartialEq for PooledConnection {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.raw_address(), other.raw_address())
    }
}

impl Eq for PooledConnection {}

impl Hash for PooledConnection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw_address().hash(state);
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("driver", &self.raw.driver_name())
            .field("valid", &self.is_marked_valid())
            .field("type_code", &self.type_code)
            .field("age", &self.age())
            .finish()
    }
}

/// A connection checked out from a [`PooledDataSource`](super::PooledDataSource)
///
/// Every call is forwarded to the physical connection while the pool still
/// considers this checkout valid; afterwards calls fail with
/// [`SqlmapError::ConnectionInvalidated`]. Closing the proxy returns the
/// connection to the pool instead of closing it. Dropping a proxy that was
/// never closed returns it as well.
pub struct ConnectionProxy {
    raw: Arc<dyn Connection>,
    id: u64,
    valid: Arc<AtomicBool>,
    pool: Weak<PoolShared>,
    released: AtomicBool,
}

impl ConnectionProxy {
    /// Whether the pool still considers this checkout valid
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// Identifier of the underlying physical connection
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The physical connection behind this proxy
    ///
    /// Calls made directly on it bypass the pool's validity check.
    pub fn real_connection(&self) -> &Arc<dyn Connection> {
        &self.raw
    }

    fn checked(&self) -> Result<&dyn Connection> {
        if self.is_valid() {
            Ok(self.raw.as_ref())
        } else {
            Err(SqlmapError::ConnectionInvalidated)
        }
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.pool.upgrade() {
            Some(pool) => pool.push_connection(&self.valid),
            None => {
                // Pool is gone; nobody else can reuse the connection
                if self.valid.swap(false, Ordering::SeqCst)
                    && let Err(e) = self.raw.close()
                {
                    tracing::debug!(
                        connection = self.id,
                        error = %e,
                        "failed to close orphaned connection"
                    );
                }
            }
        }
    }
}

impl Connection for ConnectionProxy {
    fn driver_name(&self) -> &str {
        self.raw.driver_name()
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.checked()?.execute(sql, params)
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.checked()?.query(sql, params)
    }

    fn auto_commit(&self) -> Result<bool> {
        self.checked()?.auto_commit()
    }

    fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        self.checked()?.set_auto_commit(auto_commit)
    }

    fn commit(&self) -> Result<()> {
        self.checked()?.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.checked()?.rollback()
    }

    fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        self.checked()?.set_transaction_isolation(level)
    }

    fn set_network_timeout(&self, timeout: Duration) -> Result<()> {
        self.checked()?.set_network_timeout(timeout)
    }

    /// Return the connection to its pool
    fn close(&self) -> Result<()> {
        self.release();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.released.load(Ordering::SeqCst) || !self.is_valid() || self.raw.is_closed()
    }
}

impl Drop for ConnectionProxy {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ConnectionProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProxy")
            .field("id", &self.id)
            .field("driver", &self.raw.driver_name())
            .field("valid", &self.is_valid())
            .finish()
    }
}
