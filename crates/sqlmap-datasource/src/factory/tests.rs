//! Tests for building data sources from properties

use std::time::Duration;

use indoc::indoc;
use pretty_assertions::assert_eq;
use sqlmap_core::{Connection, IsolationLevel, SqlmapError};

use super::{DataSourceConfig, DataSourceFactory, DataSourceKind};
use crate::testing::{MockDriver, init_tracing};

#[test]
fn test_unpooled_factory_applies_properties() {
    let driver = MockDriver::new();
    let mut factory = DataSourceFactory::unpooled(driver.clone());
    factory
        .set_properties([
            ("driver", "mock"),
            ("url", "mock:db"),
            ("username", "sa"),
            ("password", "secret"),
            ("auto_commit", "false"),
            ("default_transaction_isolation_level", "READ_COMMITTED"),
            ("default_network_timeout_ms", "1500"),
            ("driver.encoding", "UTF8"),
        ])
        .expect("set_properties");

    let source = factory.build_unpooled().expect("build");
    assert_eq!(source.url(), "mock:db");
    assert_eq!(source.username(), Some("sa"));
    assert_eq!(source.password(), Some("secret"));
    assert_eq!(source.auto_commit(), Some(false));
    assert_eq!(source.default_isolation_level(), Some(IsolationLevel::ReadCommitted));
    assert_eq!(source.default_network_timeout(), Some(Duration::from_millis(1500)));
    assert_eq!(source.driver_properties().get("encoding").map(String::as_str), Some("UTF8"));
    assert!(!source.driver_properties().contains_key("driver.encoding"));
}

#[test]
fn test_driver_properties_replace_configured_ones() {
    let driver = MockDriver::new();
    let mut factory = DataSourceFactory::unpooled(driver);
    factory
        .set_properties([("url", "mock:db"), ("driver.first", "1")])
        .expect("first batch");
    factory
        .set_properties([("driver.second", "2")])
        .expect("second batch");

    let properties = &factory.config().driver_properties;
    assert!(!properties.contains_key("first"));
    assert_eq!(properties.get("second").map(String::as_str), Some("2"));

    // A batch without driver keys leaves them alone
    factory.set_properties([("username", "sa")]).expect("third batch");
    assert_eq!(factory.config().driver_properties.len(), 1);
}

#[test]
fn test_unknown_property_is_rejected() {
    let driver = MockDriver::new();
    let mut factory = DataSourceFactory::unpooled(driver.clone());

    let err = factory
        .set_properties([("url", "mock:db"), ("colour", "blue")])
        .expect_err("unknown key");
    assert!(matches!(err, SqlmapError::UnknownProperty(ref key) if key == "colour"));
    assert_eq!(err.to_string(), "Unknown DataSource property: colour");

    // Pool settings mean nothing to an unpooled source
    let err = factory
        .set_property("max_active_connections", "4")
        .expect_err("pool key on unpooled factory");
    assert!(matches!(err, SqlmapError::UnknownProperty(_)));

    let mut pooled = DataSourceFactory::pooled(driver);
    let err = pooled.set_property("max_sessions", "4").expect_err("unknown pool key");
    assert!(matches!(err, SqlmapError::UnknownProperty(_)));
}

#[test]
fn test_invalid_values_are_rejected() {
    let driver = MockDriver::new();
    let mut factory = DataSourceFactory::pooled(driver.clone());

    let err = factory.set_property("time_to_wait_ms", "soon").expect_err("not a number");
    assert!(matches!(err, SqlmapError::Configuration(_)));
    assert_eq!(factory.config().pool.time_to_wait(), Duration::from_millis(20_000));

    assert!(matches!(
        factory.set_property("auto_commit", "maybe"),
        Err(SqlmapError::Configuration(_))
    ));
    assert!(matches!(
        factory.set_property("default_transaction_isolation_level", "snapshot"),
        Err(SqlmapError::Configuration(_))
    ));
    assert!(matches!(
        factory.set_property("max_active_connections", "0"),
        Err(SqlmapError::Configuration(_))
    ));
    assert!(matches!(
        factory.set_property("driver", "postgres"),
        Err(SqlmapError::Configuration(_))
    ));
    assert_eq!(factory.config().pool.max_active(), 10);
}

#[test]
fn test_pooled_factory_applies_pool_properties() {
    init_tracing();
    let driver = MockDriver::new();
    let mut factory = DataSourceFactory::pooled(driver.clone());
    factory
        .set_properties([
            ("url", "mock:db"),
            ("max_active_connections", "4"),
            ("max_idle_connections", "2"),
            ("max_checkout_time_ms", "1000"),
            ("time_to_wait_ms", "100"),
            ("max_local_bad_connection_tolerance", "1"),
            ("ping_query", "SELECT 1"),
            ("ping_enabled", "true"),
            ("ping_connections_not_used_for_ms", "500"),
        ])
        .expect("set_properties");

    let pool = factory.build_pooled().expect("build");
    let config = pool.config();
    assert_eq!(config.max_active(), 4);
    assert_eq!(config.max_idle(), 2);
    assert_eq!(config.max_checkout_time(), Duration::from_millis(1000));
    assert_eq!(config.time_to_wait(), Duration::from_millis(100));
    assert_eq!(config.local_bad_connection_tolerance(), 1);
    assert_eq!(config.ping_query(), "SELECT 1");
    assert!(config.ping_enabled());
    assert_eq!(config.ping_connections_not_used_for(), Duration::from_millis(500));

    let conn = pool.checkout().expect("checkout");
    assert_eq!(driver.count(), 1);
    drop(conn);
    assert_eq!(pool.pool_state().idle_connection_count, 1);
}

#[test]
fn test_data_source_matches_kind() {
    init_tracing();
    let driver = MockDriver::new();

    let mut unpooled = DataSourceFactory::unpooled(driver.clone());
    assert_eq!(unpooled.kind(), DataSourceKind::Unpooled);
    unpooled.set_property("url", "mock:db").expect("url");
    let source = unpooled.data_source().expect("unpooled");
    source.get_connection().expect("first").close().expect("close");
    source.get_connection().expect("second").close().expect("close");
    assert_eq!(driver.count(), 2);
    assert!(driver.connection(0).is_closed());

    let mut pooled = DataSourceFactory::pooled(driver.clone());
    assert_eq!(pooled.kind(), DataSourceKind::Pooled);
    pooled.set_property("url", "mock:db").expect("url");
    let source = pooled.data_source().expect("pooled");
    source.get_connection().expect("first").close().expect("close");
    source.get_connection().expect("second").close().expect("close");
    assert_eq!(driver.count(), 3);
    assert!(!driver.connection(2).is_closed());
}

#[test]
fn test_missing_url_is_a_configuration_error() {
    let factory = DataSourceFactory::unpooled(MockDriver::new());
    assert!(matches!(
        factory.build_unpooled(),
        Err(SqlmapError::Configuration(_))
    ));
}

#[test]
fn test_load_toml_document() {
    let mut factory = DataSourceFactory::pooled(MockDriver::new());
    factory
        .load_toml(indoc! {r#"
            url = "mock:db"
            username = "sa"
            auto_commit = false
            default_transaction_isolation_level = "serializable"
            default_network_timeout_ms = 2500

            [driver_properties]
            encoding = "UTF8"

            [pool]
            max_active_connections = 3
            ping_enabled = true
            ping_query = "SELECT 1"
        "#})
        .expect("load_toml");

    let config = factory.config();
    assert_eq!(config.url, "mock:db");
    assert_eq!(config.username.as_deref(), Some("sa"));
    assert_eq!(config.password, None);
    assert_eq!(config.auto_commit, Some(false));
    assert_eq!(
        config.default_transaction_isolation_level,
        Some(IsolationLevel::Serializable)
    );
    assert_eq!(config.default_network_timeout_ms, Some(2500));
    assert_eq!(config.driver_properties.get("encoding").map(String::as_str), Some("UTF8"));
    assert_eq!(config.pool.max_active(), 3);
    assert_eq!(config.pool.max_idle(), 5);
    assert!(config.pool.ping_enabled());

    let pool = factory.build_pooled().expect("build");
    assert_eq!(pool.unpooled().default_network_timeout(), Some(Duration::from_millis(2500)));
}

#[test]
fn test_invalid_pool_section_fails_to_build() {
    let config = DataSourceConfig::from_toml_str(indoc! {r#"
        url = "mock:db"

        [pool]
        max_active_connections = 0
    "#})
    .expect("parse");
    let factory = DataSourceFactory::pooled(MockDriver::new()).with_config(config);

    assert!(matches!(
        factory.build_pooled(),
        Err(SqlmapError::Configuration(_))
    ));
}

#[test]
fn test_malformed_toml_is_reported() {
    let result = DataSourceConfig::from_toml_str("url = ");
    assert!(matches!(result, Err(SqlmapError::Toml(_))));
}
