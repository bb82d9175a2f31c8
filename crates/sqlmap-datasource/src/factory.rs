//! Property-driven construction of data sources

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlmap_core::{Driver, DriverProperties, IsolationLevel, Result, SqlmapError};

use crate::pooled::{PoolConfig, PooledDataSource};
use crate::{DataSource, UnpooledDataSource};

#[cfg(test)]
mod tests;

/// Prefix of property keys that are forwarded to the driver
pub const DRIVER_PROPERTY_PREFIX: &str = "driver.";

/// Which kind of data source a factory produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceKind {
    Unpooled,
    Pooled,
}

impl fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceKind::Unpooled => write!(f, "UNPOOLED"),
            DataSourceKind::Pooled => write!(f, "POOLED"),
        }
    }
}

/// Settings of a data source as they appear in a configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auto_commit: Option<bool>,
    pub default_transaction_isolation_level: Option<IsolationLevel>,
    pub default_network_timeout_ms: Option<u64>,
    pub driver_properties: DriverProperties,
    /// Ignored by unpooled data sources
    pub pool: PoolConfig,
}

impl DataSourceConfig {
    /// Parse a TOML document
    pub fn from_toml_str(document: &str) -> Result<Self> {
        Ok(toml::from_str(document)?)
    }

    /// Read and parse a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }
}

/// Builds unpooled or pooled data sources from string properties
///
/// Keys are the snake_case names of the [`DataSourceConfig`] fields and, for
/// pooled factories, of the [`PoolConfig`] fields. Keys starting with
/// `driver.` are forwarded to the driver with the prefix stripped. Any other
/// key is rejected with [`SqlmapError::UnknownProperty`].
///
/// ```ignore
/// let mut factory = DataSourceFactory::pooled(Arc::new(SqliteDriver::new()));
/// factory.set_properties([
///     ("url", "sqlite:app.db"),
///     ("max_active_connections", "4"),
///     ("driver.busy_timeout", "2000"),
/// ])?;
/// let source = factory.data_source()?;
/// ```
pub struct DataSourceFactory {
    kind: DataSourceKind,
    driver: Arc<dyn Driver>,
    config: DataSourceConfig,
}

impl DataSourceFactory {
    pub fn unpooled(driver: Arc<dyn Driver>) -> Self {
        Self::new(DataSourceKind::Unpooled, driver)
    }

    pub fn pooled(driver: Arc<dyn Driver>) -> Self {
        Self::new(DataSourceKind::Pooled, driver)
    }

    pub fn new(kind: DataSourceKind, driver: Arc<dyn Driver>) -> Self {
        Self {
            kind,
            driver,
            config: DataSourceConfig::default(),
        }
    }

    /// Replace the accumulated settings
    pub fn with_config(mut self, config: DataSourceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn kind(&self) -> DataSourceKind {
        self.kind
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    /// Replace the accumulated settings with a TOML document
    pub fn load_toml(&mut self, document: &str) -> Result<()> {
        self.config = DataSourceConfig::from_toml_str(document)?;
        Ok(())
    }

    /// Apply a set of string properties
    ///
    /// Stops at the first key that is unknown or carries an unparsable
    /// value. When any `driver.` keys are present they replace the
    /// configured driver properties as a whole.
    pub fn set_properties<I, K, V>(&mut self, properties: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut driver_properties = DriverProperties::new();
        for (key, value) in properties {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key.strip_prefix(DRIVER_PROPERTY_PREFIX) {
                Some(driver_key) => {
                    driver_properties.insert(driver_key.to_string(), value.to_string());
                }
                None => self.set_property(key, value)?,
            }
        }
        if !driver_properties.is_empty() {
            self.config.driver_properties = driver_properties;
        }
        Ok(())
    }

    /// Apply a single, non-driver property
    pub fn set_property(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "driver" => {
                if value != self.driver.name() {
                    return Err(SqlmapError::Configuration(format!(
                        "Property 'driver' names '{}' but the factory uses '{}'",
                        value,
                        self.driver.name()
                    )));
                }
            }
            "url" => self.config.url = value.to_string(),
            "username" => self.config.username = Some(value.to_string()),
            "password" => self.config.password = Some(value.to_string()),
            "auto_commit" => self.config.auto_commit = Some(parse(key, value)?),
            "default_transaction_isolation_level" => {
                self.config.default_transaction_isolation_level = Some(value.parse()?)
            }
            "default_network_timeout_ms" => {
                self.config.default_network_timeout_ms = Some(parse(key, value)?)
            }
            _ if self.kind == DataSourceKind::Pooled => self.set_pool_property(key, value)?,
            _ => return Err(SqlmapError::UnknownProperty(key.to_string())),
        }
        Ok(())
    }

    fn set_pool_property(&mut self, key: &str, value: &str) -> Result<()> {
        let pool = self.config.pool.clone();
        self.config.pool = match key {
            "max_active_connections" => match parse(key, value)? {
                0 => {
                    return Err(SqlmapError::Configuration(
                        "max_active_connections must be greater than 0".into(),
                    ));
                }
                max_active => pool.with_max_active(max_active),
            },
            "max_idle_connections" => pool.with_max_idle(parse(key, value)?),
            "max_checkout_time_ms" => pool.with_max_checkout_time_ms(parse(key, value)?),
            "time_to_wait_ms" => pool.with_time_to_wait_ms(parse(key, value)?),
            "max_local_bad_connection_tolerance" => {
                pool.with_local_bad_connection_tolerance(parse(key, value)?)
            }
            "ping_query" => pool.with_ping_query(value),
            "ping_enabled" => pool.with_ping_enabled(parse(key, value)?),
            "ping_connections_not_used_for_ms" => {
                pool.with_ping_connections_not_used_for_ms(parse(key, value)?)
            }
            _ => return Err(SqlmapError::UnknownProperty(key.to_string())),
        };
        Ok(())
    }

    /// Build an unpooled data source from the accumulated settings
    pub fn build_unpooled(&self) -> Result<UnpooledDataSource> {
        let config = &self.config;
        if config.url.trim().is_empty() {
            return Err(SqlmapError::Configuration("Property 'url' is required".into()));
        }

        let mut source = UnpooledDataSource::new(self.driver.clone(), config.url.clone())
            .with_driver_properties(config.driver_properties.clone());
        source.set_username(config.username.clone());
        source.set_password(config.password.clone());
        source.set_auto_commit(config.auto_commit);
        source.set_default_isolation_level(config.default_transaction_isolation_level);
        source.set_default_network_timeout(
            config.default_network_timeout_ms.map(Duration::from_millis),
        );
        Ok(source)
    }

    /// Build a pooled data source from the accumulated settings
    pub fn build_pooled(&self) -> Result<PooledDataSource> {
        self.config.pool.validate()?;
        Ok(PooledDataSource::with_config(
            self.build_unpooled()?,
            self.config.pool.clone(),
        ))
    }

    /// Build a data source of this factory's kind
    ///
    /// Every call builds a new, independent data source.
    pub fn data_source(&self) -> Result<Arc<dyn DataSource>> {
        tracing::debug!(
            kind = %self.kind,
            driver = self.driver.name(),
            url = %self.config.url,
            "building data source"
        );
        let source: Arc<dyn DataSource> = match self.kind {
            DataSourceKind::Unpooled => Arc::new(self.build_unpooled()?),
            DataSourceKind::Pooled => Arc::new(self.build_pooled()?),
        };
        Ok(source)
    }
}

impl fmt::Debug for DataSourceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceFactory")
            .field("kind", &self.kind)
            .field("driver", &self.driver.name())
            .field("url", &self.config.url)
            .finish()
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e| {
        SqlmapError::Configuration(format!(
            "Invalid value '{}' for property '{}': {}",
            value, key, e
        ))
    })
}
