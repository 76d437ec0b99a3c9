//! Loading configuration from files on disk.

use cirrus_config::{ConfigError, ConfigLoader, LogFormat};
use std::io::Write;
use std::time::Duration;
use tempfile::Builder;

fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_toml_file() {
    let file = write_temp(
        ".toml",
        r#"
            [client]
            base_url = "https://account.blob.core.windows.net"
            user_agent = "photos/3.0"
            timeout_ms = 20000

            [client.retry]
            enabled = true
            max_retries = 2
            base_delay_ms = 100
            max_delay_ms = 400

            [transfer]
            max_chunk_size_bytes = 1048576
            max_concurrent_chunks = 2

            [logging]
            level = "debug"
            format = "pretty"
        "#,
    );

    let loader = ConfigLoader::new().with_file(file.path()).unwrap();
    assert!(loader.file_loaded());
    let config = loader.load().unwrap();

    let client = config.client_options();
    assert_eq!(client.user_agent, "photos/3.0");
    assert_eq!(client.default_timeout, Some(Duration::from_secs(20)));
    let retry = client.retry.unwrap();
    assert_eq!(retry.max_retries, 2);
    assert_eq!(retry.max_delay, Duration::from_millis(400));

    let transfer = config.transfer_options();
    assert_eq!(transfer.max_chunk_size_bytes, 1_048_576);
    assert_eq!(transfer.max_concurrent_chunks, 2);
    assert!(transfer.validate().is_ok());

    assert_eq!(config.log_config().format, LogFormat::Pretty);
}

#[test]
fn test_json_file_by_extension() {
    let file = write_temp(
        ".json",
        r#"{"transfer": {"blocking_wait_ms": 1000}, "logging": {"enabled": false}}"#,
    );

    let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
    assert_eq!(config.blocking_wait(), Duration::from_secs(1));
    assert!(!config.log_config().enabled);
}

#[test]
fn test_malformed_file() {
    let file = write_temp(".toml", "[transfer\nmax_concurrent_chunks = ");
    let result = ConfigLoader::new().with_optional_file(file.path());
    assert!(matches!(result, Err(ConfigError::TomlError(_))));
}

#[test]
fn test_invalid_values_fail_load() {
    let file = write_temp(
        ".toml",
        r#"
            [transfer]
            max_concurrent_chunks = 0
        "#,
    );

    let err = ConfigLoader::new()
        .with_file(file.path())
        .unwrap()
        .load()
        .unwrap_err();
    assert!(err.to_string().contains("transfer.max_concurrent_chunks"));
}
