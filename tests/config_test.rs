//! Tests for loading server configuration from TOML.

use std::fs;
use tempfile::TempDir;

use strictly_chess::{ChessRules, ServerConfig};

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("server.toml");
    fs::write(&path, content).expect("Failed to write TOML");
    path
}

#[test]
fn test_full_config_loads() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_config(
        &dir,
        r#"host = "0.0.0.0"
port = 9000
command_buffer = 8
event_capacity = 4
starting_fen = "8/P7/8/8/8/8/8/4K2k w - - 0 1"
"#,
    );

    let config = ServerConfig::from_file(&path).expect("Load failed");
    assert_eq!(config.host(), "0.0.0.0");
    assert_eq!(*config.port(), 9000);
    assert_eq!(*config.command_buffer(), 8);
    assert_eq!(*config.event_capacity(), 4);

    let fen = config.starting_fen().as_deref().expect("FEN missing");
    assert!(ChessRules::from_fen(fen).is_ok());
}

#[test]
fn test_missing_keys_take_defaults() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_config(&dir, "port = 4000\n");

    let config = ServerConfig::from_file(&path).expect("Load failed");
    assert_eq!(*config.port(), 4000);
    assert_eq!(config.host(), ServerConfig::default().host());
    assert_eq!(config.starting_fen(), &None);
}

#[test]
fn test_invalid_toml_fails() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_config(&dir, "port = \"not a number\"");

    let err = ServerConfig::from_file(&path).expect_err("Invalid config accepted");
    assert!(err.message.contains("Failed to parse config"));
}

#[test]
fn test_missing_file_fails() {
    let result = ServerConfig::from_file("/this/path/does/not/exist/server.toml");
    assert!(result.is_err());
}
