//! Connection pooling for physical database connections
//!
//! This module provides a bounded, synchronous connection pool with
//! overdue-checkout reclamation, ping-based validation and statistics
//! tracking.
//!
//! # Example
//!
//! ```ignore
//! use sqlmap_datasource::pooled::{PoolConfig, PooledDataSource};
//!
//! let config = PoolConfig::new(5, 2)
//!     .with_max_checkout_time_ms(10_000)
//!     .with_ping_query("SELECT 1")
//!     .with_ping_enabled(true);
//!
//! let pool = PooledDataSource::with_config(unpooled_source, config);
//! let conn = pool.checkout()?;
//! // Use connection...
//! // Connection returned to pool on close or drop
//! ```

mod config;
mod connection;
mod data_source;
mod state;
mod stats;


use std::sync::Arc;

use sqlmap_core::Connection;

pub use config::{NO_PING_QUERY_SET, PoolConfig};
pub use connection::{ConnectionProxy, PooledConnection};
pub use data_source::PooledDataSource;
pub use stats::PoolStats;

/// The physical connection behind a pooled connection
pub fn unwrap_connection(proxy: &ConnectionProxy) -> Arc<dyn Connection> {
    proxy.real_connection().clone()
}
