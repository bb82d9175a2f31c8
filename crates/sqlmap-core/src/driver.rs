//! Database driver trait definition

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{Connection, Result};

/// String properties handed to a driver when opening a connection
///
/// The unpooled data source merges `user` and `password` into a copy of the
/// configured driver properties before every connect.
pub type DriverProperties = BTreeMap<String, String>;

/// Property key carrying the user name
pub const USER_PROPERTY: &str = "user";

/// Property key carrying the password
pub const PASSWORD_PROPERTY: &str = "password";

/// Opens physical connections
///
/// Drivers are constructed explicitly and injected into a data source;
/// there is no process-wide registry.
pub trait Driver: Send + Sync {
    /// Unique identifier for this driver (e.g., "sqlite")
    fn name(&self) -> &'static str;

    /// Whether this driver understands the given URL
    fn accepts_url(&self, url: &str) -> bool;

    /// Open a new physical connection
    fn connect(&self, url: &str, properties: &DriverProperties) -> Result<Arc<dyn Connection>>;
}
