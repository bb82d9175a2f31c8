//! SQLite connection implementation

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, OpenFlags, params_from_iter};
use sqlmap_core::{
    ColumnMeta, Connection, IsolationLevel, QueryResult, Result, Row, SqlmapError,
    StatementResult, Value,
};


/// SQLite connection wrapper
///
/// With auto-commit off, a deferred transaction is opened lazily before the
/// first statement and stays open until `commit` or `rollback`.
pub struct SqliteConnection {
    conn: Mutex<Option<RusqliteConnection>>,
    auto_commit: AtomicBool,
}

impl SqliteConnection {
    /// Open a SQLite database
    pub fn open(path: &str) -> Result<Self> {
        tracing::debug!(path = %path, "opening SQLite database");
        let conn = if path == ":memory:" {
            RusqliteConnection::open_in_memory().map_err(|e| {
                SqlmapError::Connection(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            if !path.starts_with("file:") {
                let file_path = std::path::Path::new(path);
                if let Some(parent) = file_path.parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                {
                    return Err(SqlmapError::Connection(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }

            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            RusqliteConnection::open_with_flags(path, flags).map_err(|e| {
                SqlmapError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    path, e
                ))
            })?
        };

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            auto_commit: AtomicBool::new(true),
        })
    }

    /// Set how long statements wait on a locked database
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.with_conn(|conn| {
            conn.busy_timeout(timeout)
                .map_err(|e| SqlmapError::Connection(format!("Failed to set busy timeout: {}", e)))
        })
    }

    /// Set a pragma on this connection
    pub fn set_pragma(&self, name: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.pragma_update(None, name, value).map_err(|e| {
                SqlmapError::Connection(format!("Failed to set {} to {}: {}", name, value, e))
            })
        })
    }

    /// Whether a transaction is currently open
    pub fn in_transaction(&self) -> bool {
        self.conn
            .lock()
            .as_ref()
            .is_some_and(|conn| !conn.is_autocommit())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&RusqliteConnection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| SqlmapError::Connection("SQLite connection is closed".into()))?;
        f(conn)
    }

    /// Open the implicit transaction when auto-commit is off
    fn begin_if_needed(&self, conn: &RusqliteConnection) -> Result<()> {
        if !self.auto_commit.load(Ordering::SeqCst) && conn.is_autocommit() {
            conn.execute_batch("BEGIN DEFERRED")
                .map_err(|e| SqlmapError::Query(format!("Failed to begin transaction: {}", e)))?;
            tracing::trace!("SQLite transaction started");
        }
        Ok(())
    }

    fn end_transaction(conn: &RusqliteConnection, statement: &str) -> Result<()> {
        if conn.is_autocommit() {
            return Ok(());
        }
        conn.execute_batch(statement)
            .map_err(|e| SqlmapError::Query(format!("Failed to {}: {}", statement, e)))
    }
}

impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.with_conn(|conn| {
            self.begin_if_needed(conn)?;
            let rusqlite_params = values_to_rusqlite(params);
            let rows_affected = conn
                .execute(sql, params_from_iter(rusqlite_params.iter()))
                .map_err(|e| SqlmapError::Query(format!("Failed to execute statement: {}", e)))?;

            tracing::debug!(affected_rows = rows_affected, "statement executed");
            Ok(StatementResult {
                affected_rows: rows_affected as u64,
            })
        })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = Instant::now();
        self.with_conn(|conn| {
            self.begin_if_needed(conn)?;
            let rusqlite_params = values_to_rusqlite(params);
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| SqlmapError::Query(format!("Failed to prepare query: {}", e)))?;

            let columns: Vec<ColumnMeta> = stmt
                .columns()
                .iter()
                .enumerate()
                .map(|(ordinal, col)| ColumnMeta {
                    name: col.name().to_string(),
                    data_type: col.decl_type().unwrap_or("DYNAMIC").to_string(),
                    ordinal,
                })
                .collect();
            let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

            let mut rows = Vec::new();
            let mut query_rows = stmt
                .query(params_from_iter(rusqlite_params.iter()))
                .map_err(|e| SqlmapError::Query(format!("Failed to execute query: {}", e)))?;
            while let Some(row) = query_rows
                .next()
                .map_err(|e| SqlmapError::Query(format!("Failed to fetch row: {}", e)))?
            {
                let values = (0..columns.len())
                    .map(|i| rusqlite_to_value(row, i))
                    .collect::<Result<Vec<_>>>()?;
                rows.push(Row::new(column_names.clone(), values));
            }

            let execution_time_ms = start_time.elapsed().as_millis() as u64;
            tracing::debug!(
                row_count = rows.len(),
                execution_time_ms = execution_time_ms,
                "query executed successfully"
            );
            Ok(QueryResult {
                columns,
                rows,
                execution_time_ms,
            })
        })
    }

    fn auto_commit(&self) -> Result<bool> {
        self.with_conn(|_| Ok(self.auto_commit.load(Ordering::SeqCst)))
    }

    /// Switching auto-commit back on commits the open transaction
    fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        self.with_conn(|conn| {
            if auto_commit {
                Self::end_transaction(conn, "COMMIT")?;
            }
            self.auto_commit.store(auto_commit, Ordering::SeqCst);
            Ok(())
        })
    }

    fn commit(&self) -> Result<()> {
        self.with_conn(|conn| Self::end_transaction(conn, "COMMIT"))
    }

    fn rollback(&self) -> Result<()> {
        self.with_conn(|conn| Self::end_transaction(conn, "ROLLBACK"))
    }

    /// SQLite only distinguishes serializable and read-uncommitted reads
    fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        let read_uncommitted = match level {
            IsolationLevel::Serializable => "0",
            IsolationLevel::ReadUncommitted => "1",
            other => {
                return Err(SqlmapError::NotSupported(format!(
                    "SQLite does not support isolation level {}",
                    other
                )));
            }
        };
        self.set_pragma("read_uncommitted", read_uncommitted)
    }

    fn set_network_timeout(&self, timeout: Duration) -> Result<()> {
        self.set_busy_timeout(timeout)
    }

    fn close(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        tracing::debug!("closing SQLite connection");
        conn.close()
            .map_err(|(_, e)| SqlmapError::Connection(format!("Failed to close connection: {}", e)))
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(if *b { 1 } else { 0 }),
        Value::Int32(i) => rusqlite::types::Value::Integer(*i as i64),
        Value::Int64(i) => rusqlite::types::Value::Integer(*i),
        Value::Float64(f) => rusqlite::types::Value::Real(*f),
        Value::Decimal(d) => rusqlite::types::Value::Text(d.clone()),
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bytes(b) => rusqlite::types::Value::Blob(b.clone()),
        Value::Json(j) => rusqlite::types::Value::Text(j.to_string()),
    }
}

/// Convert rusqlite row value to our Value type
fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| SqlmapError::Query(e.to_string()))?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    };

    Ok(value)
}
