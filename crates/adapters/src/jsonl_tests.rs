// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_result_with_session_and_usage() {
    let parser = JsonlParser::new();
    let out = parser
        .parse(
            r#"{"type":"status","status":"starting"}
{"type":"result","result":"done","session_id":"s-1","usage":{"input_tokens":10,"output_tokens":5}}"#,
        )
        .unwrap();

    assert_eq!(out.response, "done");
    assert_eq!(out.session_id.as_deref(), Some("s-1"));
    assert!(!out.fallback_raw);
    let usage = out.usage.unwrap();
    assert_eq!(usage.input_tokens, Some(10));
    assert_eq!(usage.output_tokens, Some(5));
    assert_eq!(out.events.len(), 2);
}

#[test]
fn last_result_wins() {
    let parser = JsonlParser::new();
    let out = parser
        .parse(
            r#"{"type":"result","result":"first"}
{"type":"result","result":"second","session_id":"s-2"}"#,
        )
        .unwrap();
    assert_eq!(out.response, "second");
    assert_eq!(out.session_id.as_deref(), Some("s-2"));
}

#[test]
fn fallback_to_raw_stdout_without_result() {
    let parser = JsonlParser::new();
    let out = parser
        .parse("{\"type\":\"status\",\"status\":\"working\"}\nplain trailing text\n")
        .unwrap();
    assert!(out.fallback_raw);
    assert_eq!(
        out.response,
        "{\"type\":\"status\",\"status\":\"working\"}\nplain trailing text"
    );
    // The status event still parsed; the stray line is an issue.
    assert_eq!(out.events.len(), 1);
    assert_eq!(out.errors.len(), 1);
}

#[test]
fn tool_use_and_tool_result_decode() {
    let parser = JsonlParser::new();
    let out = parser
        .parse(
            r#"{"type":"tool_use","tool_name":"Read","tool_input":{"path":"/tmp/x"},"tool_use_id":"tu-1"}
{"type":"tool_result","tool_use_id":"tu-1","content":"file contents"}
{"type":"result","result":"ok"}"#,
        )
        .unwrap();

    assert_eq!(
        out.events[0],
        CliEvent::ToolUse {
            tool_name: "Read".to_string(),
            tool_input: Some(serde_json::json!({"path":"/tmp/x"})),
            tool_use_id: Some("tu-1".to_string()),
        }
    );
    assert_eq!(
        out.events[1],
        CliEvent::ToolResult {
            tool_use_id: "tu-1".to_string(),
            content: "file contents".to_string(),
        }
    );
}

#[test]
fn missing_required_field_is_an_issue_in_lenient_mode() {
    let parser = JsonlParser::new();
    let out = parser
        .parse("{\"type\":\"tool_result\",\"content\":\"no id\"}\n{\"type\":\"result\",\"result\":\"ok\"}")
        .unwrap();
    assert_eq!(out.errors.len(), 1);
    assert!(out.errors[0].reason.contains("tool_use_id"));
    assert_eq!(out.errors[0].line_no, 1);
    assert_eq!(out.response, "ok");
}

#[test]
fn malformed_json_is_an_issue_with_prefix() {
    let parser = JsonlParser::new();
    let long_line = format!("{{garbage {}", "x".repeat(200));
    let out = parser.parse(&long_line).unwrap();
    assert_eq!(out.errors.len(), 1);
    assert!(out.errors[0].prefix.ends_with("..."));
    assert!(out.errors[0].prefix.len() <= 84);
}

#[test]
fn strict_mode_aborts_on_first_anomaly() {
    let parser = JsonlParser::strict();
    let err = parser
        .parse("not json at all\n{\"type\":\"result\",\"result\":\"ok\"}")
        .unwrap_err();
    assert_eq!(err.line_no, 1);
    assert!(err.reason.contains("malformed json"));
}

#[test]
fn unknown_kind_is_recorded_raw() {
    let parser = JsonlParser::new();
    let out = parser
        .parse("{\"type\":\"telepathy\",\"thought\":42}\n{\"type\":\"result\",\"result\":\"ok\"}")
        .unwrap();
    assert_eq!(out.unknown_events.len(), 1);
    assert_eq!(out.unknown_events[0]["thought"], 42);
    assert!(matches!(
        &out.events[0],
        CliEvent::Unknown { kind, .. } if kind == "telepathy"
    ));
}

#[test]
fn registered_schema_validates_new_kind() {
    let mut parser = JsonlParser::new();
    parser.register_schema("progress", EventSchema::required(&["percent"]));

    let out = parser
        .parse("{\"type\":\"progress\",\"percent\":40}\n{\"type\":\"progress\"}\n{\"type\":\"result\",\"result\":\"ok\"}")
        .unwrap();

    // Validated event kept (raw, no typed variant), missing field flagged.
    assert_eq!(out.unknown_events.len(), 0);
    assert!(matches!(
        &out.events[0],
        CliEvent::Unknown { kind, .. } if kind == "progress"
    ));
    assert_eq!(out.errors.len(), 1);
    assert!(out.errors[0].reason.contains("percent"));
}

#[test]
fn empty_lines_are_skipped() {
    let parser = JsonlParser::new();
    let out = parser
        .parse("\n\n{\"type\":\"result\",\"result\":\"ok\"}\n\n")
        .unwrap();
    assert!(out.errors.is_empty());
    assert_eq!(out.response, "ok");
}

#[test]
fn non_string_result_is_stringified() {
    let parser = JsonlParser::new();
    let out = parser
        .parse("{\"type\":\"result\",\"result\":{\"answer\":42}}")
        .unwrap();
    assert_eq!(out.response, "{\"answer\":42}");
}

#[test]
fn empty_stdout_falls_back_to_empty_response() {
    let parser = JsonlParser::new();
    let out = parser.parse("").unwrap();
    assert!(out.fallback_raw);
    assert_eq!(out.response, "");
    assert!(out.events.is_empty());
}
