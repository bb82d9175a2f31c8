//! Unpooled data source
//!
//! Opens a brand-new physical connection for every request and applies the
//! configured defaults (network timeout, auto-commit, isolation level) to it.
//! The pooled data source uses one of these as its raw connector.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sqlmap_core::{
    Connection, Driver, DriverProperties, IsolationLevel, PASSWORD_PROPERTY, Result, SqlmapError,
    USER_PROPERTY,
};

use crate::DataSource;

#[cfg(test)]
mod tests;

/// A data source that opens a new connection on every request
#[derive(Clone)]
pub struct UnpooledDataSource {
    driver: Arc<dyn Driver>,
    url: String,
    username: Option<String>,
    password: Option<String>,
    driver_properties: DriverProperties,
    auto_commit: Option<bool>,
    default_isolation_level: Option<IsolationLevel>,
    default_network_timeout: Option<Duration>,
}

impl UnpooledDataSource {
    /// Create a data source for `url`, served by `driver`
    pub fn new(driver: Arc<dyn Driver>, url: impl Into<String>) -> Self {
        Self {
            driver,
            url: url.into(),
            username: None,
            password: None,
            driver_properties: DriverProperties::new(),
            auto_commit: None,
            default_isolation_level: None,
            default_network_timeout: None,
        }
    }

    /// Set the credentials used by [`DataSource::get_connection`]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the properties forwarded to the driver on every connect
    pub fn with_driver_properties(mut self, properties: DriverProperties) -> Self {
        self.driver_properties = properties;
        self
    }

    /// Set the auto-commit mode applied to new connections
    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = Some(auto_commit);
        self
    }

    /// Set the isolation level applied to new connections
    pub fn with_default_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.default_isolation_level = Some(level);
        self
    }

    /// Set the network timeout applied to new connections
    pub fn with_default_network_timeout(mut self, timeout: Duration) -> Self {
        self.default_network_timeout = Some(timeout);
        self
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn set_driver(&mut self, driver: Arc<dyn Driver>) {
        self.driver = driver;
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_username(&mut self, username: Option<String>) {
        self.username = username;
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn set_password(&mut self, password: Option<String>) {
        self.password = password;
    }

    pub fn driver_properties(&self) -> &DriverProperties {
        &self.driver_properties
    }

    pub fn set_driver_properties(&mut self, properties: DriverProperties) {
        self.driver_properties = properties;
    }

    /// The auto-commit mode forced onto new connections, if any
    pub fn auto_commit(&self) -> Option<bool> {
        self.auto_commit
    }

    pub fn set_auto_commit(&mut self, auto_commit: Option<bool>) {
        self.auto_commit = auto_commit;
    }

    pub fn default_isolation_level(&self) -> Option<IsolationLevel> {
        self.default_isolation_level
    }

    pub fn set_default_isolation_level(&mut self, level: Option<IsolationLevel>) {
        self.default_isolation_level = level;
    }

    pub fn default_network_timeout(&self) -> Option<Duration> {
        self.default_network_timeout
    }

    pub fn set_default_network_timeout(&mut self, timeout: Option<Duration>) {
        self.default_network_timeout = timeout;
    }

    /// Open a connection with explicit credentials
    ///
    /// `None` leaves the corresponding property out, so the driver falls back
    /// to whatever the URL or driver properties carry.
    pub fn open(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Arc<dyn Connection>> {
        let mut properties = self.driver_properties.clone();
        if let Some(username) = username {
            properties.insert(USER_PROPERTY.to_string(), username.to_string());
        }
        if let Some(password) = password {
            properties.insert(PASSWORD_PROPERTY.to_string(), password.to_string());
        }

        if !self.driver.accepts_url(&self.url) {
            return Err(SqlmapError::Configuration(format!(
                "Driver '{}' does not accept url '{}'",
                self.driver.name(),
                self.url
            )));
        }

        let connection = self.driver.connect(&self.url, &properties)?;
        self.configure_connection(connection.as_ref())?;
        tracing::trace!(driver = self.driver.name(), url = %self.url, "opened physical connection");
        Ok(connection)
    }

    /// Open a connection with the configured credentials
    pub fn open_default(&self) -> Result<Arc<dyn Connection>> {
        self.open(self.username.as_deref(), self.password.as_deref())
    }

    fn configure_connection(&self, connection: &dyn Connection) -> Result<()> {
        if let Some(timeout) = self.default_network_timeout {
            connection.set_network_timeout(timeout)?;
        }
        if let Some(auto_commit) = self.auto_commit
            && auto_commit != connection.auto_commit()?
        {
            connection.set_auto_commit(auto_commit)?;
        }
        if let Some(level) = self.default_isolation_level {
            connection.set_transaction_isolation(level)?;
        }
        Ok(())
    }
}

impl fmt::Debug for UnpooledDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnpooledDataSource")
            .field("driver", &self.driver.name())
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("driver_properties", &self.driver_properties.keys().collect::<Vec<_>>())
            .field("auto_commit", &self.auto_commit)
            .field("default_isolation_level", &self.default_isolation_level)
            .field("default_network_timeout", &self.default_network_timeout)
            .finish()
    }
}

impl DataSource for UnpooledDataSource {
    fn get_connection(&self) -> Result<Arc<dyn Connection>> {
        self.open_default()
    }

    fn get_connection_with(&self, username: &str, password: &str) -> Result<Arc<dyn Connection>> {
        self.open(Some(username), Some(password))
    }
}
