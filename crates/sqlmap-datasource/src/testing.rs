//! Mock driver and connections shared by the unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use sqlmap_core::{
    Connection, Driver, DriverProperties, IsolationLevel, QueryResult, Result, SqlmapError,
    StatementResult, Value,
};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Initialize logging for tests if not already initialized
pub(crate) fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("sqlmap_datasource=debug".parse().unwrap()),
            )
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Counts the pool's "waiting for a connection" events
///
/// Install it with `tracing::subscriber::with_default` on the thread whose
/// waits should be counted.
#[derive(Clone, Default)]
pub(crate) struct WaitEventCounter(Arc<AtomicUsize>);

impl WaitEventCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Run `f` with this counter as the thread's subscriber
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::with_default(subscriber, f)
    }
}

impl<S: tracing::Subscriber> Layer<S> for WaitEventCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().fields().field("wait_ms").is_some() {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Mock physical connection
pub(crate) struct MockConnection {
    #[allow(dead_code)]
    pub id: usize,
    pub url: String,
    pub properties: DriverProperties,
    closed: AtomicBool,
    broken: AtomicBool,
    auto_commit: AtomicBool,
    rollbacks: AtomicUsize,
    isolation: Mutex<Option<IsolationLevel>>,
    network_timeout: Mutex<Option<Duration>>,
}

impl MockConnection {
    fn new(id: usize, url: &str, properties: &DriverProperties) -> Self {
        Self {
            id,
            url: url.to_string(),
            properties: properties.clone(),
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            auto_commit: AtomicBool::new(true),
            rollbacks: AtomicUsize::new(0),
            isolation: Mutex::new(None),
            network_timeout: Mutex::new(None),
        }
    }

    /// Make every statement fail without reporting the connection closed
    pub fn break_silently(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn rollback_count(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn isolation(&self) -> Option<IsolationLevel> {
        *self.isolation.lock()
    }

    pub fn network_timeout(&self) -> Option<Duration> {
        *self.network_timeout.lock()
    }

    fn check(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SqlmapError::Connection("connection is closed".into()));
        }
        if self.broken.load(Ordering::SeqCst) {
            return Err(SqlmapError::Connection("connection reset by peer".into()));
        }
        Ok(())
    }
}

impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.check()?;
        Ok(StatementResult { affected_rows: 1 })
    }

    fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        self.check()?;
        Ok(QueryResult::empty())
    }

    fn auto_commit(&self) -> Result<bool> {
        Ok(self.auto_commit.load(Ordering::SeqCst))
    }

    fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        self.auto_commit.store(auto_commit, Ordering::SeqCst);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.check()
    }

    fn rollback(&self) -> Result<()> {
        self.check()?;
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        *self.isolation.lock() = Some(level);
        Ok(())
    }

    fn set_network_timeout(&self, timeout: Duration) -> Result<()> {
        *self.network_timeout.lock() = Some(timeout);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Mock driver that records every connection it opens
#[derive(Default)]
pub(crate) struct MockDriver {
    opened: Mutex<Vec<Arc<MockConnection>>>,
    open_closed: AtomicBool,
    refuse: AtomicBool,
}

impl MockDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of physical connections opened so far
    pub fn count(&self) -> usize {
        self.opened.lock().len()
    }

    /// The `index`-th physical connection opened
    pub fn connection(&self, index: usize) -> Arc<MockConnection> {
        self.opened.lock()[index].clone()
    }

    /// Hand out connections that already report themselves closed
    pub fn open_closed_connections(&self, enabled: bool) {
        self.open_closed.store(enabled, Ordering::SeqCst);
    }

    /// Fail every connect attempt
    pub fn refuse_connections(&self, enabled: bool) {
        self.refuse.store(enabled, Ordering::SeqCst);
    }
}

impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn accepts_url(&self, url: &str) -> bool {
        url.starts_with("mock:")
    }

    fn connect(&self, url: &str, properties: &DriverProperties) -> Result<Arc<dyn Connection>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SqlmapError::Connection(format!("connection refused: {}", url)));
        }
        let mut opened = self.opened.lock();
        let connection = Arc::new(MockConnection::new(opened.len(), url, properties));
        if self.open_closed.load(Ordering::SeqCst) {
            connection.closed.store(true, Ordering::SeqCst);
        }
        opened.push(connection.clone());
        Ok(connection)
    }
}

/// Whether a type-erased connection is the given mock
pub(crate) fn is_same(connection: &Arc<dyn Connection>, mock: &Arc<MockConnection>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(connection), Arc::as_ptr(mock))
}
