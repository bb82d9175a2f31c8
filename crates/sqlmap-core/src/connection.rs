//! Connection trait

use std::time::Duration;

use crate::{IsolationLevel, QueryResult, Result, SqlmapError, StatementResult, Value};

/// A database connection
///
/// Implemented both by driver-level physical connections and by the
/// pooled proxy handed out by the pooled data source. Methods take `&self`
/// so that a connection can be shared behind an `Arc`; drivers guard their
/// native handle internally.
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "postgresql", "mysql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE/DDL)
    fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Whether statements are committed as soon as they complete
    fn auto_commit(&self) -> Result<bool>;

    /// Switch auto-commit mode
    fn set_auto_commit(&self, auto_commit: bool) -> Result<()>;

    /// Commit the current transaction, if any
    fn commit(&self) -> Result<()>;

    /// Roll back the current transaction, if any
    fn rollback(&self) -> Result<()>;

    /// Apply a transaction isolation level
    fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        Err(SqlmapError::NotSupported(format!(
            "{} does not support isolation level {}",
            self.driver_name(),
            level
        )))
    }

    /// Bound how long a single database operation may block
    fn set_network_timeout(&self, timeout: Duration) -> Result<()> {
        let _ = timeout;
        Err(SqlmapError::NotSupported(format!(
            "{} does not support network timeouts",
            self.driver_name()
        )))
    }

    /// Close the connection
    fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
