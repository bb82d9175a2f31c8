//! sqlmap Data Source - Unpooled and pooled connection sources
//!
//! This crate turns a [`Driver`](sqlmap_core::Driver) into connections:
//!
//! - [`UnpooledDataSource`] opens and configures a fresh physical connection
//!   for every request.
//! - [`PooledDataSource`] keeps a bounded set of physical connections,
//!   reclaims overdue ones, validates them before handing them out and
//!   drains itself whenever its configuration changes.
//! - [`DataSourceFactory`] builds either kind from a property map or a
//!   TOML document.

mod data_source;
mod factory;
pub mod pooled;
pub mod unpooled;

#[cfg(test)]
pub(crate) mod testing;

pub use data_source::DataSource;
pub use factory::{DRIVER_PROPERTY_PREFIX, DataSourceConfig, DataSourceFactory, DataSourceKind};
pub use pooled::{ConnectionProxy, PoolConfig, PoolStats, PooledDataSource};
pub use unpooled::UnpooledDataSource;
