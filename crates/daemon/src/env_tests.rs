// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
#[serial]
fn defaults_without_env() {
    std::env::remove_var("KOKINO_TICKET_SWEEP_MS");
    std::env::remove_var("KOKINO_HEARTBEAT_MS");
    assert_eq!(ticket_sweep_interval(), Duration::from_secs(1));
    assert_eq!(heartbeat_interval(), Duration::from_secs(30));
    assert_eq!(session_sweep_interval(), Duration::from_secs(3_600));
}

#[test]
#[serial]
fn env_overrides_win() {
    std::env::set_var("KOKINO_TICKET_SWEEP_MS", "250");
    assert_eq!(ticket_sweep_interval(), Duration::from_millis(250));
    std::env::remove_var("KOKINO_TICKET_SWEEP_MS");
}

#[test]
#[serial]
fn garbage_values_fall_back() {
    std::env::set_var("KOKINO_HEARTBEAT_MS", "soon");
    assert_eq!(heartbeat_interval(), Duration::from_secs(30));
    std::env::remove_var("KOKINO_HEARTBEAT_MS");
}
