//! Bootstrapping containers from configuration files

#![cfg(feature = "config")]

use keystone_di::{ConfigBuilder, Container, ContainerConfig, DiError};
use serde_json::{json, Value};

#[test]
fn test_toml_config() {
    let config_str = r#"
scopes = ["request", "session"]
freeze = true

[singletons]
app_name = "keystone"
max_connections = 16
"#;

    let config = ContainerConfig::from_toml(config_str).unwrap();
    assert_eq!(config.scopes, vec!["request", "session"]);
    assert!(config.freeze);

    let container = Container::new();
    let scopes = config.apply(&container).unwrap();
    assert_eq!(scopes.len(), 2);
    assert_eq!(scopes[0].name(), "request");
    assert_eq!(container.scopes(), scopes);
    assert!(container.is_frozen());

    let name = container
        .get_as::<Value>(String::from("app_name"))
        .unwrap();
    assert_eq!(*name, json!("keystone"));
    let max = container
        .get_as::<Value>(String::from("max_connections"))
        .unwrap();
    assert_eq!(max.as_i64(), Some(16));
}

#[test]
fn test_json_config() {
    let config = ContainerConfig::from_json(
        r#"{ "scopes": ["request"], "singletons": { "retries": 3, "tags": ["a", "b"] } }"#,
    )
    .unwrap();

    let container = Container::new();
    config.apply(&container).unwrap();
    assert!(!container.is_frozen());

    let tags = container.get_as::<Value>(String::from("tags")).unwrap();
    assert_eq!(*tags, json!(["a", "b"]));
}

#[test]
fn test_apply_rejects_duplicates() {
    let container = Container::new();
    container.add_singleton(String::from("retries"), 1_i32).unwrap();

    let config = ConfigBuilder::new()
        .add_singleton("retries", 3)
        .add_singleton("timeout", 30)
        .build();

    assert!(matches!(
        config.apply(&container),
        Err(DiError::DuplicateDependency { .. })
    ));
    assert!(!container.contains(String::from("timeout")));
}

#[test]
fn test_apply_on_frozen_container() {
    let container = Container::new();
    container.freeze();

    let config = ConfigBuilder::new().add_scope("request").build();
    assert!(matches!(
        config.apply(&container),
        Err(DiError::FrozenWorld { .. })
    ));
}
