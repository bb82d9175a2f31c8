//! sqlmap Core - Core abstractions shared by the data source layer
//!
//! This crate provides the traits and types that the pooled and unpooled
//! data sources, and every driver, depend on:
//!
//! - `Connection` - Trait for physical (or proxied) database connections
//! - `Driver` - Trait for opening physical connections from a URL
//! - Common types like `Value`, `Row`, `QueryResult`, `IsolationLevel`

mod connection;
mod driver;
mod error;
mod types;

pub use connection::*;
pub use driver::*;
pub use error::*;
pub use types::*;
