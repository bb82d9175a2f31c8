//! SQLite driver implementation

use std::sync::Arc;
use std::time::Duration;

use sqlmap_core::{Connection, Driver, DriverProperties, Result, SqlmapError};

use crate::SqliteConnection;

/// URL prefix understood by [`SqliteDriver`]
///
/// Everything after the prefix is the database path, or `:memory:` for a
/// private in-memory database.
pub const SQLITE_URL_PREFIX: &str = "sqlite:";

/// SQLite database driver
///
/// Recognized driver properties:
/// - `busy_timeout`: milliseconds to wait on a locked database
/// - `foreign_keys`: `true`/`false`, defaults to `true`
/// - `journal_mode`: any SQLite journal mode, e.g. `WAL`
///
/// `user` and `password` are accepted and ignored.
pub struct SqliteDriver;

impl SqliteDriver {
    /// Create a new SQLite driver instance
    pub fn new() -> Self {
        tracing::debug!("SQLite driver initialized");
        Self
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn accepts_url(&self, url: &str) -> bool {
        url.starts_with(SQLITE_URL_PREFIX)
    }

    #[tracing::instrument(skip(self, properties))]
    fn connect(&self, url: &str, properties: &DriverProperties) -> Result<Arc<dyn Connection>> {
        let path = url.strip_prefix(SQLITE_URL_PREFIX).ok_or_else(|| {
            SqlmapError::Configuration(format!(
                "SQLite urls look like 'sqlite:/path/to/database.db', got '{}'",
                url
            ))
        })?;
        if path.is_empty() {
            return Err(SqlmapError::Configuration(
                "SQLite url is missing the database path. Use 'sqlite::memory:' for an in-memory database".into(),
            ));
        }

        let conn = SqliteConnection::open(path).inspect_err(|e| {
            tracing::error!(error = %e, "failed to connect to SQLite database");
        })?;

        if let Some(busy_timeout) = properties.get("busy_timeout") {
            let millis: u64 = busy_timeout.trim().parse().map_err(|_| {
                SqlmapError::Configuration(format!(
                    "busy_timeout must be a number of milliseconds, got '{}'",
                    busy_timeout
                ))
            })?;
            conn.set_busy_timeout(Duration::from_millis(millis))?;
        }

        let foreign_keys = match properties.get("foreign_keys").map(|v| v.trim()) {
            None => true,
            Some(value) => value.parse::<bool>().map_err(|_| {
                SqlmapError::Configuration(format!("foreign_keys must be true or false, got '{}'", value))
            })?,
        };
        conn.set_pragma("foreign_keys", if foreign_keys { "ON" } else { "OFF" })?;

        if let Some(journal_mode) = properties.get("journal_mode") {
            conn.set_pragma("journal_mode", journal_mode)?;
        }

        tracing::info!(path = %path, "SQLite connection created");
        Ok(Arc::new(conn))
    }
}
