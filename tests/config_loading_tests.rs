//! Tests for loading client configuration from YAML files

use pulse::config::ClientConfig;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config_from_file() {
    let file = write_config(
        r#"
request:
  base_url: "https://api.example.com/api"
  retries: 2
  retry_delay_ms: 100
  cache_ttl_ms: 1000
realtime:
  ws_url: "wss://api.example.com/ws"
  heartbeat_interval_ms: 15000
  max_reconnect_attempts: 8
  feed_buffer_capacity: 20
notifications:
  error_ms: 10000
"#,
    );

    let config = ClientConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap();

    assert_eq!(config.request.retries, 2);
    assert_eq!(config.request.retry_delay(), Duration::from_millis(100));
    assert_eq!(config.request.cache_ttl(), Duration::from_secs(1));
    assert_eq!(config.realtime.endpoint_for("42"), "wss://api.example.com/ws/42");
    assert_eq!(config.realtime.heartbeat_interval(), Duration::from_secs(15));
    assert_eq!(config.realtime.max_reconnect_attempts, 8);
    assert_eq!(config.realtime.feed_buffer_capacity, 20);
    assert_eq!(config.notifications.error_ms, 10_000);
    assert_eq!(config.notifications.success_ms, 4_000);
}

#[test]
fn test_empty_file_yields_defaults() {
    let file = write_config("{}\n");
    let config = ClientConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config, ClientConfig::default());
}

#[test]
fn test_invalid_values_are_rejected() {
    let file = write_config(
        r#"
realtime:
  ws_url: "not a url"
notifications:
  capacity: 0
"#,
    );

    let err = ClientConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
fn test_missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");
    assert!(ClientConfig::from_yaml_file(path.to_str().unwrap()).is_err());
}

#[test]
fn test_malformed_yaml_is_error() {
    let file = write_config("request: [unclosed");
    assert!(ClientConfig::from_yaml_file(file.path().to_str().unwrap()).is_err());
}
