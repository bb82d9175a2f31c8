//! Tests for the unpooled data source

use std::time::Duration;

use pretty_assertions::assert_eq;
use sqlmap_core::{DriverProperties, IsolationLevel, SqlmapError};

use super::UnpooledDataSource;
use crate::DataSource;
use crate::testing::{MockDriver, is_same};

#[test]
fn test_every_request_opens_a_new_connection() {
    let driver = MockDriver::new();
    let source = UnpooledDataSource::new(driver.clone(), "mock:db");

    let first = source.get_connection().expect("first");
    let second = source.get_connection().expect("second");

    assert_eq!(driver.count(), 2);
    assert!(is_same(&first, &driver.connection(0)));
    assert!(is_same(&second, &driver.connection(1)));
}

#[test]
fn test_credentials_are_merged_into_driver_properties() {
    let driver = MockDriver::new();
    let mut properties = DriverProperties::new();
    properties.insert("encoding".into(), "UTF8".into());
    properties.insert("user".into(), "ignored".into());

    let source = UnpooledDataSource::new(driver.clone(), "mock:db")
        .with_credentials("sa", "secret")
        .with_driver_properties(properties);

    source.get_connection().expect("default credentials");
    source
        .get_connection_with("reporting", "hunter2")
        .expect("explicit credentials");

    let default = driver.connection(0);
    assert_eq!(default.properties.get("user").map(String::as_str), Some("sa"));
    assert_eq!(default.properties.get("password").map(String::as_str), Some("secret"));
    assert_eq!(default.properties.get("encoding").map(String::as_str), Some("UTF8"));

    let explicit = driver.connection(1);
    assert_eq!(explicit.properties.get("user").map(String::as_str), Some("reporting"));
    assert_eq!(explicit.properties.get("password").map(String::as_str), Some("hunter2"));

    // The configured properties are copied, not mutated
    assert_eq!(source.driver_properties().get("user").map(String::as_str), Some("ignored"));
}

#[test]
fn test_new_connections_are_configured() {
    let driver = MockDriver::new();
    let source = UnpooledDataSource::new(driver.clone(), "mock:db")
        .with_auto_commit(false)
        .with_default_isolation_level(IsolationLevel::Serializable)
        .with_default_network_timeout(Duration::from_millis(1500));

    let connection = source.get_connection().expect("connect");

    assert!(!connection.auto_commit().unwrap());
    let mock = driver.connection(0);
    assert_eq!(mock.isolation(), Some(IsolationLevel::Serializable));
    assert_eq!(mock.network_timeout(), Some(Duration::from_millis(1500)));
}

#[test]
fn test_unconfigured_defaults_leave_connection_untouched() {
    let driver = MockDriver::new();
    let source = UnpooledDataSource::new(driver.clone(), "mock:db");

    let connection = source.get_connection().expect("connect");

    assert!(connection.auto_commit().unwrap());
    assert_eq!(driver.connection(0).isolation(), None);
    assert_eq!(driver.connection(0).network_timeout(), None);
}

#[test]
fn test_foreign_url_is_rejected() {
    let driver = MockDriver::new();
    let source = UnpooledDataSource::new(driver.clone(), "postgres://localhost/app");

    let err = source.get_connection().err().expect("rejected");
    assert!(matches!(err, SqlmapError::Configuration(_)));
    assert_eq!(driver.count(), 0);
}

#[test]
fn test_driver_errors_propagate() {
    let driver = MockDriver::new();
    driver.refuse_connections(true);
    let source = UnpooledDataSource::new(driver, "mock:db");

    let err = source.get_connection().err().expect("refused");
    assert!(err.to_string().contains("connection refused"));
}

#[test]
fn test_debug_masks_password() {
    let source = UnpooledDataSource::new(MockDriver::new(), "mock:db").with_credentials("sa", "secret");
    let rendered = format!("{:?}", source);
    assert!(rendered.contains("sa"));
    assert!(!rendered.contains("secret"));
}
