// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults_are_usable() {
    let config = Config::default();
    assert_eq!(config.ws_addr, "127.0.0.1:7787");
    assert_eq!(config.execute_timeout_ms, 300_000);
    assert!(config.state_dir.ends_with("kokino"));
}

#[test]
fn paths_derive_from_state_dir() {
    let config = Config {
        state_dir: PathBuf::from("/var/lib/kokino"),
        ..Default::default()
    };
    assert_eq!(config.db_path(), PathBuf::from("/var/lib/kokino/kokino.db"));
    assert_eq!(
        config.socket_path(),
        PathBuf::from("/var/lib/kokino/kokinod.sock")
    );
    assert_eq!(
        config.pid_path(),
        PathBuf::from("/var/lib/kokino/kokinod.pid")
    );
}

#[test]
fn file_values_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kokino.toml");
    std::fs::write(&path, "ws_addr = \"0.0.0.0:9000\"\nexecute_timeout_ms = 60000\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.ws_addr, "0.0.0.0:9000");
    assert_eq!(config.execute_timeout_ms, 60_000);
    // Unset keys keep defaults.
    assert_eq!(config.ticket_timeout_ms, 30_000);
}

#[test]
fn bad_file_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kokino.toml");
    std::fs::write(&path, "ws_addr = [not toml").unwrap();
    assert!(Config::from_file(&path).is_none());
}

#[test]
fn missing_file_is_none() {
    assert!(Config::from_file(Path::new("/definitely/not/here.toml")).is_none());
}
