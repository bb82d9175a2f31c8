//! The data source abstraction shared by pooled and unpooled sources

use std::sync::Arc;

use sqlmap_core::{Connection, Result};

/// Something that hands out database connections
pub trait DataSource: Send + Sync {
    /// Get a connection using the configured credentials
    fn get_connection(&self) -> Result<Arc<dyn Connection>>;

    /// Get a connection on behalf of the given credentials
    fn get_connection_with(&self, username: &str, password: &str) -> Result<Arc<dyn Connection>>;
}
