//! Pooled data source implementation

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use sqlmap_core::{Connection, Driver, DriverProperties, IsolationLevel, Result, SqlmapError};

use super::config::PoolConfig;
use super::connection::{ConnectionProxy, PooledConnection};
use super::state::PoolState;
use super::stats::PoolStats;
use crate::{DataSource, UnpooledDataSource};

/// What a single pass of the checkout loop produced
enum Candidate {
    Ready(PooledConnection),
    MustWait,
}

/// Everything guarded by the pool lock
pub(crate) struct PoolInner {
    source: UnpooledDataSource,
    config: PoolConfig,
    state: PoolState,
    /// Type code of connections minted under the current configuration
    expected_type_code: u64,
    /// Bumped to abort every checkout currently blocked on the condvar
    interrupt_generation: u64,
}

/// State shared between the pool handle and its outstanding proxies
pub(crate) struct PoolShared {
    inner: Mutex<PoolInner>,
    available: Condvar,
}

/// A simple, synchronous, thread-safe connection pool
///
/// Physical connections come from an [`UnpooledDataSource`]. A checkout
/// reuses the oldest idle connection, opens a new one while fewer than
/// `max_active` are checked out, reclaims the oldest checkout once it has
/// been held longer than `max_checkout_time`, and otherwise blocks for up
/// to `time_to_wait` before trying again. Every candidate is validated
/// before it is handed out.
///
/// Changing any setting drains the pool: every tracked connection is
/// invalidated and closed, and later checkouts open connections under the
/// new settings.
///
/// # Example
///
/// ```ignore
/// use sqlmap_datasource::{PoolConfig, PooledDataSource, UnpooledDataSource};
///
/// let source = UnpooledDataSource::new(driver, "sqlite:app.db");
/// let pool = PooledDataSource::with_config(source, PoolConfig::new(4, 2));
/// let conn = pool.checkout()?;
/// conn.execute("DELETE FROM sessions", &[])?;
/// conn.close()?; // back to the pool
/// ```
pub struct PooledDataSource {
    shared: Arc<PoolShared>,
}

impl PooledDataSource {
    /// Create a pool with the default configuration
    pub fn new(source: UnpooledDataSource) -> Self {
        Self::with_config(source, PoolConfig::default())
    }

    /// Create a pool with the given configuration
    pub fn with_config(source: UnpooledDataSource, config: PoolConfig) -> Self {
        let expected_type_code =
            assemble_type_code(source.url(), source.username(), source.password());
        Self {
            shared: Arc::new(PoolShared {
                inner: Mutex::new(PoolInner {
                    source,
                    config,
                    state: PoolState::default(),
                    expected_type_code,
                    interrupt_generation: 0,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Check out a connection using the configured credentials
    pub fn checkout(&self) -> Result<ConnectionProxy> {
        self.shared.pop_connection(None)
    }

    /// Check out a connection on behalf of the given credentials
    ///
    /// The physical connection is still opened with the configured
    /// credentials; these only determine the type code it is stamped with.
    pub fn checkout_as(&self, username: &str, password: &str) -> Result<ConnectionProxy> {
        self.shared.pop_connection(Some((username, password)))
    }

    /// Snapshot of the pool's counters
    pub fn pool_state(&self) -> PoolStats {
        self.shared.inner.lock().state.snapshot()
    }

    /// Invalidate and close every tracked connection
    pub fn force_close_all(&self) {
        self.shared.inner.lock().force_close_all();
    }

    /// Abort every checkout currently blocked waiting for a connection
    ///
    /// The aborted checkouts fail with [`SqlmapError::PoolUnknownError`].
    pub fn interrupt_waiters(&self) {
        let mut inner = self.shared.inner.lock();
        inner.interrupt_generation = inner.interrupt_generation.wrapping_add(1);
        self.shared.available.notify_all();
    }

    /// Abort blocked checkouts and drain the pool
    pub fn shutdown(&self) {
        let mut inner = self.shared.inner.lock();
        inner.interrupt_generation = inner.interrupt_generation.wrapping_add(1);
        inner.force_close_all();
        self.shared.available.notify_all();
    }

    /// Current pool configuration
    pub fn config(&self) -> PoolConfig {
        self.shared.inner.lock().config.clone()
    }

    #[cfg(test)]
    pub(crate) fn tracked_twice(&self) -> usize {
        self.shared.inner.lock().state.tracked_twice()
    }

    /// Copy of the underlying unpooled data source
    pub fn unpooled(&self) -> UnpooledDataSource {
        self.shared.inner.lock().source.clone()
    }

    /// Apply a change under the pool lock, then drain
    fn reconfigure(&self, change: impl FnOnce(&mut PoolInner)) {
        let mut inner = self.shared.inner.lock();
        change(&mut inner);
        inner.force_close_all();
    }

    /// Replace the whole pool configuration
    pub fn set_config(&self, config: PoolConfig) {
        self.reconfigure(|inner| inner.config = config);
    }

    pub fn set_driver(&self, driver: Arc<dyn Driver>) {
        self.reconfigure(|inner| inner.source.set_driver(driver));
    }

    pub fn set_url(&self, url: impl Into<String>) {
        let url = url.into();
        self.reconfigure(|inner| inner.source.set_url(url));
    }

    pub fn set_username(&self, username: Option<String>) {
        self.reconfigure(|inner| inner.source.set_username(username));
    }

    pub fn set_password(&self, password: Option<String>) {
        self.reconfigure(|inner| inner.source.set_password(password));
    }

    pub fn set_default_auto_commit(&self, auto_commit: Option<bool>) {
        self.reconfigure(|inner| inner.source.set_auto_commit(auto_commit));
    }

    pub fn set_default_isolation_level(&self, level: Option<IsolationLevel>) {
        self.reconfigure(|inner| inner.source.set_default_isolation_level(level));
    }

    pub fn set_driver_properties(&self, properties: DriverProperties) {
        self.reconfigure(|inner| inner.source.set_driver_properties(properties));
    }

    pub fn set_default_network_timeout(&self, timeout: Option<Duration>) {
        self.reconfigure(|inner| inner.source.set_default_network_timeout(timeout));
    }

    /// # Panics
    ///
    /// Panics if `max_active` is 0.
    pub fn set_max_active(&self, max_active: usize) {
        self.reconfigure(|inner| inner.config = inner.config.clone().with_max_active(max_active));
    }

    pub fn set_max_idle(&self, max_idle: usize) {
        self.reconfigure(|inner| inner.config = inner.config.clone().with_max_idle(max_idle));
    }

    pub fn set_max_checkout_time_ms(&self, checkout_ms: u64) {
        self.reconfigure(|inner| {
            inner.config = inner.config.clone().with_max_checkout_time_ms(checkout_ms)
        });
    }

    pub fn set_time_to_wait_ms(&self, wait_ms: u64) {
        self.reconfigure(|inner| inner.config = inner.config.clone().with_time_to_wait_ms(wait_ms));
    }

    pub fn set_local_bad_connection_tolerance(&self, tolerance: usize) {
        self.reconfigure(|inner| {
            inner.config = inner.config.clone().with_local_bad_connection_tolerance(tolerance)
        });
    }

    pub fn set_ping_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.reconfigure(|inner| inner.config = inner.config.clone().with_ping_query(query));
    }

    pub fn set_ping_enabled(&self, enabled: bool) {
        self.reconfigure(|inner| inner.config = inner.config.clone().with_ping_enabled(enabled));
    }

    pub fn set_ping_connections_not_used_for_ms(&self, idle_ms: u64) {
        self.reconfigure(|inner| {
            inner.config = inner.config.clone().with_ping_connections_not_used_for_ms(idle_ms)
        });
    }

    pub fn url(&self) -> String {
        self.shared.inner.lock().source.url().to_string()
    }

    pub fn username(&self) -> Option<String> {
        self.shared.inner.lock().source.username().map(str::to_string)
    }
}

impl DataSource for PooledDataSource {
    fn get_connection(&self) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(self.checkout()?))
    }

    fn get_connection_with(&self, username: &str, password: &str) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(self.checkout_as(username, password)?))
    }
}

impl Drop for PooledDataSource {
    fn drop(&mut self) {
        self.shared.inner.lock().force_close_all();
    }
}

impl std::fmt::Debug for PooledDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("PooledDataSource")
            .field("source", &inner.source)
            .field("config", &inner.config)
            .field("stats", &inner.state.snapshot())
            .finish()
    }
}

impl PoolShared {
    /// Produce a valid, active connection or fail
    ///
    /// Without explicit credentials the connection is stamped with the
    /// configured ones, read under the same lock as the checkout itself.
    pub(crate) fn pop_connection(
        self: &Arc<Self>,
        credentials: Option<(&str, &str)>,
    ) -> Result<ConnectionProxy> {
        let started = Instant::now();
        let mut counted_wait = false;
        let mut local_bad_connection_count = 0usize;
        let mut inner = self.inner.lock();

        loop {
            let mut conn = match inner.next_candidate()? {
                Candidate::Ready(conn) => conn,
                Candidate::MustWait => {
                    if !counted_wait {
                        inner.state.had_to_wait_count += 1;
                        counted_wait = true;
                    }
                    let time_to_wait = inner.config.time_to_wait();
                    tracing::debug!(
                        wait_ms = time_to_wait.as_millis() as u64,
                        "waiting for a connection"
                    );
                    let generation = inner.interrupt_generation;
                    let wait_started = Instant::now();
                    if time_to_wait.is_zero() {
                        self.available.wait(&mut inner);
                    } else {
                        self.available.wait_for(&mut inner, time_to_wait);
                    }
                    inner.state.accumulated_wait_time += wait_started.elapsed();
                    if inner.interrupt_generation != generation {
                        break;
                    }
                    continue;
                }
            };

            if conn.is_valid(&inner) {
                if let Err(e) = rollback_if_needed(conn.raw().as_ref()) {
                    tracing::debug!(
                        connection = conn.id(),
                        error = %e,
                        "could not roll back checked out connection"
                    );
                }
                let type_code = match credentials {
                    Some((username, password)) => {
                        assemble_type_code(inner.source.url(), Some(username), Some(password))
                    }
                    None => inner.expected_type_code,
                };
                conn.set_type_code(type_code);
                conn.mark_checked_out();
                let proxy = conn.proxy(Arc::downgrade(self));
                inner.state.active.push_back(conn);
                inner.state.request_count += 1;
                inner.state.accumulated_request_time += started.elapsed();
                return Ok(proxy);
            }

            tracing::debug!(
                connection = conn.id(),
                "a bad connection was returned from the pool, getting another connection"
            );
            inner.state.bad_connection_count += 1;
            local_bad_connection_count += 1;
            if local_bad_connection_count > inner.config.bad_connection_limit() {
                tracing::debug!("could not get a good connection to the database");
                return Err(SqlmapError::PoolExhausted);
            }
        }

        tracing::debug!("unknown severe error condition, the pool produced no connection");
        Err(SqlmapError::PoolUnknownError)
    }

    /// Take a checked-out connection back
    pub(crate) fn push_connection(&self, valid: &Arc<AtomicBool>) {
        let mut inner = self.inner.lock();
        if inner.push_connection(valid) {
            self.available.notify_all();
        }
    }
}

impl PoolInner {
    /// One pass over idle, create and reclaim; never blocks
    fn next_candidate(&mut self) -> Result<Candidate> {
        if let Some(conn) = self.state.idle.pop_front() {
            tracing::debug!(connection = conn.id(), "checked out connection from pool");
            return Ok(Candidate::Ready(conn));
        }

        if self.state.active.len() < self.config.max_active() {
            let conn = PooledConnection::new(self.source.open_default()?);
            tracing::debug!(connection = conn.id(), "created connection");
            return Ok(Candidate::Ready(conn));
        }

        let overdue = self
            .state
            .active
            .front()
            .is_some_and(|oldest| oldest.checkout_duration() > self.config.max_checkout_time());
        if !overdue {
            return Ok(Candidate::MustWait);
        }

        let Some(oldest) = self.state.active.pop_front() else {
            return Ok(Candidate::MustWait);
        };
        let checkout_time = oldest.checkout_duration();
        self.state.claimed_overdue_connection_count += 1;
        self.state.accumulated_checkout_time_of_overdue_connections += checkout_time;
        self.state.accumulated_checkout_time += checkout_time;
        if let Err(e) = rollback_if_needed(oldest.raw().as_ref()) {
            // The new holder still gets the connection and can fail over to
            // another one if it turns out to be broken.
            tracing::debug!(
                connection = oldest.id(),
                error = %e,
                "bad connection, could not roll back"
            );
        }
        let conn = oldest.rewrap();
        oldest.invalidate();
        tracing::debug!(
            connection = conn.id(),
            checkout_ms = checkout_time.as_millis() as u64,
            "claimed overdue connection"
        );
        Ok(Candidate::Ready(conn))
    }

    /// Returns true when the connection went back to the idle list
    fn push_connection(&mut self, valid: &Arc<AtomicBool>) -> bool {
        let Some(conn) = self.state.take_active(valid) else {
            // Reclaimed or drained while checked out, so already invalid
            tracing::debug!(
                "a bad connection attempted to return to the pool, discarding connection"
            );
            self.state.bad_connection_count += 1;
            return false;
        };

        if !conn.is_valid(self) {
            tracing::debug!(
                connection = conn.id(),
                "a bad connection attempted to return to the pool, discarding connection"
            );
            self.state.bad_connection_count += 1;
            return false;
        }

        self.state.accumulated_checkout_time += conn.checkout_duration();
        if let Err(e) = rollback_if_needed(conn.raw().as_ref()) {
            tracing::debug!(
                connection = conn.id(),
                error = %e,
                "could not roll back returned connection"
            );
        }

        if self.state.idle.len() < self.config.max_idle()
            && conn.type_code() == self.expected_type_code
        {
            let fresh = conn.rewrap();
            conn.invalidate();
            tracing::debug!(connection = fresh.id(), "returned connection to pool");
            self.state.idle.push_back(fresh);
            true
        } else {
            if let Err(e) = conn.raw().close() {
                tracing::debug!(connection = conn.id(), error = %e, "failed to close connection");
            }
            tracing::debug!(connection = conn.id(), "closed connection");
            conn.invalidate();
            false
        }
    }

    /// Check whether a connection is still usable; never fails
    pub(crate) fn ping_connection(&self, conn: &PooledConnection) -> bool {
        let raw = conn.raw();
        if raw.is_closed() {
            tracing::debug!(connection = conn.id(), "connection is BAD: closed");
            return false;
        }

        if !self.config.ping_enabled()
            || conn.idle_duration() <= self.config.ping_connections_not_used_for()
        {
            return true;
        }

        tracing::debug!(connection = conn.id(), "testing connection");
        let ping = raw
            .query(self.config.ping_query(), &[])
            .and_then(|_| rollback_if_needed(raw.as_ref()));
        match ping {
            Ok(()) => {
                tracing::debug!(connection = conn.id(), "connection is GOOD");
                true
            }
            Err(e) => {
                tracing::warn!(
                    query = self.config.ping_query(),
                    error = %e,
                    "execution of ping query failed"
                );
                if let Err(e) = raw.close() {
                    tracing::debug!(
                        connection = conn.id(),
                        error = %e,
                        "failed to close connection"
                    );
                }
                tracing::debug!(connection = conn.id(), "connection is BAD");
                false
            }
        }
    }

    /// Invalidate, roll back and close every tracked connection
    fn force_close_all(&mut self) {
        self.expected_type_code = assemble_type_code(
            self.source.url(),
            self.source.username(),
            self.source.password(),
        );
        while let Some(conn) = self.state.active.pop_back() {
            discard(conn);
        }
        while let Some(conn) = self.state.idle.pop_back() {
            discard(conn);
        }
        tracing::debug!("forcefully closed/removed all connections");
    }
}

fn discard(conn: PooledConnection) {
    conn.invalidate();
    let raw = conn.raw();
    if let Err(e) = rollback_if_needed(raw.as_ref()) {
        tracing::debug!(
            connection = conn.id(),
            error = %e,
            "could not roll back drained connection"
        );
    }
    if let Err(e) = raw.close() {
        tracing::debug!(connection = conn.id(), error = %e, "failed to close connection");
    }
}

fn rollback_if_needed(raw: &dyn Connection) -> Result<()> {
    if !raw.auto_commit()? {
        raw.rollback()?;
    }
    Ok(())
}

/// Fingerprint of the settings a physical connection was opened under
pub(crate) fn assemble_type_code(url: &str, username: Option<&str>, password: Option<&str>) -> u64 {
    let mut hasher = DefaultHasher::new();
    (url, username, password).hash(&mut hasher);
    hasher.finish()
}
