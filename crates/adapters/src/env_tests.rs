// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn empty_env_resolves_to_overrides_only() {
    let env = ProcessEnv::empty().set("FOO", "1").set("BAR", "2");
    let resolved = env.resolve();
    assert_eq!(
        resolved,
        vec![
            ("FOO".to_string(), "1".to_string()),
            ("BAR".to_string(), "2".to_string())
        ]
    );
}

#[test]
fn overrides_win_over_base() {
    let env = ProcessEnv::from_base(vec![
        ("PATH".to_string(), "/usr/bin".to_string()),
        ("HOME".to_string(), "/root".to_string()),
    ])
    .set("PATH", "/opt/bin");

    let resolved = env.resolve();
    assert_eq!(resolved.len(), 2);
    assert!(resolved.contains(&("PATH".to_string(), "/opt/bin".to_string())));
}

#[test]
fn api_keys_are_scrubbed_from_base() {
    let env = ProcessEnv::from_base(vec![
        ("ANTHROPIC_API_KEY".to_string(), "sk-secret".to_string()),
        ("GEMINI_API_KEY".to_string(), "g-secret".to_string()),
        ("API_KEY".to_string(), "generic".to_string()),
        ("TERM".to_string(), "xterm".to_string()),
    ]);
    let resolved = env.resolve();
    assert_eq!(resolved, vec![("TERM".to_string(), "xterm".to_string())]);
}

#[test]
fn api_keys_are_scrubbed_from_overrides_too() {
    let env = ProcessEnv::empty().set("OPENAI_API_KEY", "nope").set("OK", "1");
    let resolved = env.resolve();
    assert_eq!(resolved, vec![("OK".to_string(), "1".to_string())]);
}

#[test]
fn non_key_vars_survive() {
    // Names that merely contain API are fine.
    let env = ProcessEnv::from_base(vec![(
        "API_KEYRING_PATH".to_string(),
        "/tmp/k".to_string(),
    )]);
    assert_eq!(env.resolve().len(), 1);
}

#[test]
fn defaults_for_tunables() {
    assert_eq!(monitor_sample_ms(), Duration::from_secs(2));
    assert_eq!(tmux_poll_ms(), Duration::from_millis(500));
    assert_eq!(mock_cli_bin(), "kokino-mock");
}
