use clap::Parser;
use docserve::config::{Args, Config, ConfigError, MAX_CONNECTIONS_LIMIT};
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:8080");
    assert_eq!(cfg.server.max_connections, 3);
    assert_eq!(cfg.static_files.root, PathBuf::from("./client"));
    assert_eq!(cfg.static_files.index_file, "index.html");
    assert_eq!(cfg.static_files.not_found_root, PathBuf::from("./notFoundHTML"));
    assert_eq!(cfg.static_files.not_found_file, "notFound.html");
}

#[test]
fn test_config_empty_yaml_uses_defaults() {
    let cfg = Config::from_yaml("").unwrap();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:8080");
}

#[test]
fn test_config_partial_yaml_keeps_other_defaults() {
    let yaml = r#"
server:
  max_connections: 8
  read_timeout_ms: 250
static_files:
  root: /srv/www
"#;
    let cfg = Config::from_yaml(yaml).unwrap();

    assert_eq!(cfg.server.max_connections, 8);
    assert_eq!(cfg.server.read_timeout(), Duration::from_millis(250));
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:8080");
    assert_eq!(cfg.static_files.root, PathBuf::from("/srv/www"));
    assert_eq!(cfg.static_files.not_found_file, "notFound.html");
}

#[test]
fn test_config_rejects_zero_connections() {
    let result = Config::from_yaml("server:\n  max_connections: 0\n");
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_config_rejects_malformed_yaml() {
    let result = Config::from_yaml("server: [unclosed");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_config_missing_file() {
    let result = Config::from_file("/nonexistent/docserve.yaml");
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}

#[test]
fn test_config_from_file() {
    let path = std::env::temp_dir().join(format!("docserve-config-{}.yaml", std::process::id()));
    std::fs::write(&path, "server:\n  listen_addr: \"127.0.0.1:9000\"\n").unwrap();

    let cfg = Config::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(cfg.server.listen_addr, "127.0.0.1:9000");
}

#[test]
fn test_config_rejects_connection_limit_above_cap() {
    let yaml = format!("server:\n  max_connections: {}\n", MAX_CONNECTIONS_LIMIT + 1);
    assert!(matches!(Config::from_yaml(&yaml), Err(ConfigError::Invalid(_))));

    let result = Config::from_yaml("server:\n  max_connections: 18446744073709551615\n");
    assert!(matches!(result, Err(ConfigError::Invalid(_))));

    let yaml = format!("server:\n  max_connections: {}\n", MAX_CONNECTIONS_LIMIT);
    assert!(Config::from_yaml(&yaml).is_ok());
}

#[test]
fn test_config_args_without_file() {
    let args = Args::try_parse_from(["docserve"]).unwrap();
    let cfg = Config::from_args(&args).unwrap();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:8080");
}

#[test]
fn test_config_args_port_override() {
    let path = std::env::temp_dir().join(format!("docserve-args-{}.yaml", std::process::id()));
    std::fs::write(&path, "server:\n  listen_addr: \"127.0.0.1:9000\"\n").unwrap();

    let args = Args::try_parse_from(["docserve", path.to_str().unwrap(), "3000"]).unwrap();
    let cfg = Config::from_args(&args).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(cfg.server.listen_addr, "127.0.0.1:3000");
}

#[test]
fn test_config_args_invalid_port() {
    let result = Args::try_parse_from(["docserve", "docserve.yaml", "http"]);
    assert!(result.is_err());

    let result = Args::try_parse_from(["docserve", "docserve.yaml", "70000"]);
    assert!(result.is_err());
}

#[test]
fn test_config_args_help_is_not_a_path() {
    let err = Args::try_parse_from(["docserve", "--help"]).unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
}

#[test]
fn test_config_port_override_needs_host_port_addr() {
    let mut cfg = Config::default();
    cfg.server.listen_addr = "localhost".to_string();
    assert!(matches!(cfg.server.with_port(3000), Err(ConfigError::Invalid(_))));

    cfg.server.listen_addr = "[::1]:8080".to_string();
    assert_eq!(cfg.server.with_port(3000).unwrap(), "[::1]:3000");
}
