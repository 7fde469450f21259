// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema-validated decode of the CLI's newline-delimited JSON output.
//!
//! Each line is one JSON object with a `type` tag. Known kinds carry a
//! required-field schema; new kinds can be registered at runtime without
//! recompiling. Lenient mode records anomalies and keeps going; strict
//! mode aborts on the first one.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Truncation length for malformed-line prefixes in parse issues.
const ISSUE_PREFIX_LEN: usize = 80;

/// Required/optional field names for one event kind.
#[derive(Debug, Clone, Default)]
pub struct EventSchema {
    pub required: Vec<&'static str>,
    pub optional: Vec<&'static str>,
}

impl EventSchema {
    pub fn required(fields: &[&'static str]) -> Self {
        Self {
            required: fields.to_vec(),
            optional: Vec::new(),
        }
    }

    pub fn with_optional(mut self, fields: &[&'static str]) -> Self {
        self.optional = fields.to_vec();
        self
    }
}

/// Runtime-extensible registry of event schemas keyed by `type`.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<String, EventSchema>,
}

impl SchemaRegistry {
    /// The built-in CLI event kinds.
    pub fn builtin() -> Self {
        let mut schemas = HashMap::new();
        schemas.insert(
            "result".to_string(),
            EventSchema::required(&["result"]).with_optional(&["session_id", "usage"]),
        );
        schemas.insert(
            "tool_use".to_string(),
            EventSchema::required(&["tool_name"]).with_optional(&["tool_input", "tool_use_id"]),
        );
        schemas.insert(
            "tool_result".to_string(),
            EventSchema::required(&["tool_use_id", "content"]),
        );
        schemas.insert(
            "error".to_string(),
            EventSchema::required(&["error"]).with_optional(&["code"]),
        );
        schemas.insert(
            "status".to_string(),
            EventSchema::required(&["status"]).with_optional(&["message"]),
        );
        schemas.insert("thinking".to_string(), EventSchema::required(&["content"]));
        Self { schemas }
    }

    /// Register (or replace) a schema for a kind.
    pub fn register(&mut self, kind: impl Into<String>, schema: EventSchema) {
        self.schemas.insert(kind.into(), schema);
    }

    pub fn get(&self, kind: &str) -> Option<&EventSchema> {
        self.schemas.get(kind)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Token accounting from a `result` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One decoded CLI event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CliEvent {
    Result {
        result: String,
        session_id: Option<String>,
        usage: Option<Usage>,
    },
    ToolUse {
        tool_name: String,
        tool_input: Option<serde_json::Value>,
        tool_use_id: Option<String>,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    Error {
        error: String,
        code: Option<String>,
    },
    Status {
        status: String,
        message: Option<String>,
    },
    Thinking {
        content: String,
    },
    /// A registered-at-runtime or unrecognized kind, kept raw.
    Unknown {
        #[serde(rename = "unknown_kind")]
        kind: String,
        raw: serde_json::Value,
    },
}

/// One anomaly recorded during a lenient parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseIssue {
    pub line_no: usize,
    /// First bytes of the offending line.
    pub prefix: String,
    pub reason: String,
}

/// Strict-mode abort on the first anomaly.
#[derive(Debug, Error)]
#[error("jsonl parse aborted at line {line_no}: {reason}")]
pub struct ParseAbort {
    pub line_no: usize,
    pub reason: String,
}

/// The decoded stream plus extraction results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseOutput {
    /// Final response text: the last `result` event, or raw stdout fallback.
    pub response: String,
    pub session_id: Option<String>,
    pub events: Vec<CliEvent>,
    pub usage: Option<Usage>,
    pub errors: Vec<ParseIssue>,
    pub unknown_events: Vec<serde_json::Value>,
    /// True when no `result` event arrived and `response` is raw stdout.
    pub fallback_raw: bool,
}

/// Newline-delimited JSON parser for CLI stdout.
#[derive(Debug, Clone)]
pub struct JsonlParser {
    registry: SchemaRegistry,
    strict: bool,
}

impl JsonlParser {
    /// Lenient parser with the built-in schemas.
    pub fn new() -> Self {
        Self {
            registry: SchemaRegistry::builtin(),
            strict: false,
        }
    }

    /// Strict parser: the first anomaly aborts.
    pub fn strict() -> Self {
        Self {
            registry: SchemaRegistry::builtin(),
            strict: true,
        }
    }

    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register an additional event schema at runtime.
    pub fn register_schema(&mut self, kind: impl Into<String>, schema: EventSchema) {
        self.registry.register(kind, schema);
    }

    /// Parse a full stdout buffer.
    pub fn parse(&self, stdout: &str) -> Result<ParseOutput, ParseAbort> {
        let mut out = ParseOutput::default();

        for (idx, line) in stdout.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let value: serde_json::Value = match serde_json::from_str(trimmed) {
                Ok(v) => v,
                Err(e) => {
                    self.anomaly(&mut out, line_no, trimmed, format!("malformed json: {}", e))?;
                    continue;
                }
            };

            let Some(kind) = value.get("type").and_then(|t| t.as_str()).map(String::from)
            else {
                self.anomaly(&mut out, line_no, trimmed, "missing type tag".to_string())?;
                continue;
            };

            match self.registry.get(&kind) {
                Some(schema) => {
                    if let Some(missing) = first_missing(schema, &value) {
                        self.anomaly(
                            &mut out,
                            line_no,
                            trimmed,
                            format!("{} event missing required field {}", kind, missing),
                        )?;
                        continue;
                    }
                    let event = decode_event(&kind, &value);
                    if let CliEvent::Result {
                        result,
                        session_id,
                        usage,
                    } = &event
                    {
                        out.response = result.clone();
                        if session_id.is_some() {
                            out.session_id = session_id.clone();
                        }
                        if usage.is_some() {
                            out.usage = usage.clone();
                        }
                    }
                    out.events.push(event);
                }
                None => {
                    tracing::debug!(kind = %kind, line_no, "unknown jsonl event kind");
                    out.unknown_events.push(value.clone());
                    out.events.push(CliEvent::Unknown { kind, raw: value });
                }
            }
        }

        // No result event: best-effort response from raw stdout.
        if !out
            .events
            .iter()
            .any(|e| matches!(e, CliEvent::Result { .. }))
        {
            out.response = stdout.trim().to_string();
            out.fallback_raw = true;
        }

        Ok(out)
    }

    fn anomaly(
        &self,
        out: &mut ParseOutput,
        line_no: usize,
        line: &str,
        reason: String,
    ) -> Result<(), ParseAbort> {
        if self.strict {
            return Err(ParseAbort { line_no, reason });
        }
        out.errors.push(ParseIssue {
            line_no,
            prefix: truncate(line, ISSUE_PREFIX_LEN),
            reason,
        });
        Ok(())
    }
}

impl Default for JsonlParser {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// First required field missing from `value`, if any.
fn first_missing<'a>(schema: &'a EventSchema, value: &serde_json::Value) -> Option<&'a str> {
    schema
        .required
        .iter()
        .find(|field| value.get(**field).is_none())
        .copied()
}

fn get_str(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(String::from)
}

/// Build the typed event for a schema-validated line.
fn decode_event(kind: &str, value: &serde_json::Value) -> CliEvent {
    match kind {
        "result" => CliEvent::Result {
            result: stringify(value.get("result")),
            session_id: get_str(value, "session_id"),
            usage: value
                .get("usage")
                .and_then(|u| serde_json::from_value(u.clone()).ok()),
        },
        "tool_use" => CliEvent::ToolUse {
            tool_name: stringify(value.get("tool_name")),
            tool_input: value.get("tool_input").cloned(),
            tool_use_id: get_str(value, "tool_use_id"),
        },
        "tool_result" => CliEvent::ToolResult {
            tool_use_id: stringify(value.get("tool_use_id")),
            content: stringify(value.get("content")),
        },
        "error" => CliEvent::Error {
            error: stringify(value.get("error")),
            code: get_str(value, "code"),
        },
        "status" => CliEvent::Status {
            status: stringify(value.get("status")),
            message: get_str(value, "message"),
        },
        "thinking" => CliEvent::Thinking {
            content: stringify(value.get("content")),
        },
        // Registered-at-runtime kinds have no typed variant.
        other => CliEvent::Unknown {
            kind: other.to_string(),
            raw: value.clone(),
        },
    }
}

/// Field as text: strings verbatim, everything else compact JSON.
fn stringify(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
