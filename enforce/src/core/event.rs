//! Typed hook events decoded from host payloads.
//!
//! Hosts spell the same field several ways. Decoding probes each alternative in
//! a fixed precedence order (the `*_FIELDS` constants) and produces one
//! normalized [`HookEvent`].

use std::path::PathBuf;

use serde_json::Value;

/// Host event names for the four recognized lifecycle events.
pub const TURN_START_EVENT: &str = "UserPromptSubmit";
pub const PRE_TOOL_EVENT: &str = "PreToolUse";
pub const SUBAGENT_STOP_EVENT: &str = "SubagentStop";
pub const TURN_END_EVENT: &str = "Stop";

type FieldPath = &'static [&'static str];

pub const EVENT_NAME_FIELDS: &[FieldPath] = &[
    &["hookEventName"],
    &["hook_event_name"],
    &["hookSpecificOutput", "hookEventName"],
    &["hook_specific_output", "hookEventName"],
];
pub const SESSION_ID_FIELDS: &[FieldPath] = &[&["session_id"], &["sessionId"], &["session", "id"]];
pub const TOOL_NAME_FIELDS: &[FieldPath] = &[&["tool_name"], &["toolName"], &["tool", "name"]];
pub const TOOL_INPUT_FIELDS: &[FieldPath] = &[&["tool_input"], &["toolInput"], &["tool", "input"]];
pub const PROMPT_FIELDS: &[FieldPath] = &[
    &["prompt"],
    &["user_prompt"],
    &["userPrompt"],
    &["message"],
    &["input"],
];
pub const CWD_FIELDS: &[FieldPath] = &[&["cwd"], &["workspace", "current_dir"], &["workspace_dir"]];
pub const AGENT_TYPE_FIELDS: &[FieldPath] = &[&["agent_type"], &["subagent_type"], &["agentType"]];

/// Kind of lifecycle event, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    TurnStart,
    PreToolCall,
    SubagentCompletion,
    TurnEnd,
    Unrecognized,
}

impl EventKind {
    pub fn host_name(self) -> &'static str {
        match self {
            Self::TurnStart => TURN_START_EVENT,
            Self::PreToolCall => PRE_TOOL_EVENT,
            Self::SubagentCompletion => SUBAGENT_STOP_EVENT,
            Self::TurnEnd => TURN_END_EVENT,
            Self::Unrecognized => "unknown",
        }
    }
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    TurnStart {
        prompt: Option<String>,
    },
    PreToolCall {
        tool_name: Option<String>,
        tool_input: Value,
    },
    SubagentCompletion {
        agent_type: Option<String>,
    },
    TurnEnd {
        stop_hook_active: bool,
    },
    Unrecognized {
        name: Option<String>,
    },
}

/// One normalized lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub struct HookEvent {
    pub session_id: Option<String>,
    pub cwd: Option<PathBuf>,
    pub payload: EventPayload,
}

impl HookEvent {
    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::TurnStart { .. } => EventKind::TurnStart,
            EventPayload::PreToolCall { .. } => EventKind::PreToolCall,
            EventPayload::SubagentCompletion { .. } => EventKind::SubagentCompletion,
            EventPayload::TurnEnd { .. } => EventKind::TurnEnd,
            EventPayload::Unrecognized { .. } => EventKind::Unrecognized,
        }
    }

    /// Decode a host payload. Never fails: unknown shapes become
    /// [`EventPayload::Unrecognized`] and missing fields become `None`.
    pub fn decode(raw: &Value) -> Self {
        let name = first_string(raw, EVENT_NAME_FIELDS);
        let payload = match name.as_deref() {
            Some(TURN_START_EVENT) => EventPayload::TurnStart {
                prompt: extract_prompt(raw),
            },
            Some(PRE_TOOL_EVENT) => EventPayload::PreToolCall {
                tool_name: first_string(raw, TOOL_NAME_FIELDS),
                tool_input: first_value(raw, TOOL_INPUT_FIELDS)
                    .cloned()
                    .unwrap_or(Value::Null),
            },
            Some(SUBAGENT_STOP_EVENT) => EventPayload::SubagentCompletion {
                agent_type: first_string(raw, AGENT_TYPE_FIELDS),
            },
            Some(TURN_END_EVENT) => EventPayload::TurnEnd {
                stop_hook_active: raw
                    .get("stop_hook_active")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            _ => EventPayload::Unrecognized { name },
        };
        Self {
            session_id: first_string(raw, SESSION_ID_FIELDS),
            cwd: first_string(raw, CWD_FIELDS).map(PathBuf::from),
            payload,
        }
    }
}

/// Prompt text for a turn-start payload.
///
/// Direct fields win in [`PROMPT_FIELDS`] order; otherwise the `messages`
/// history is scanned from most to least recent for string content.
pub fn extract_prompt(raw: &Value) -> Option<String> {
    if let Some(prompt) = first_string(raw, PROMPT_FIELDS) {
        return Some(prompt);
    }
    raw.get("messages")?
        .as_array()?
        .iter()
        .rev()
        .find_map(message_text)
}

fn message_text(message: &Value) -> Option<String> {
    match message.get("content")? {
        Value::String(text) => non_empty(text),
        Value::Array(parts) => parts
            .iter()
            .rev()
            .find_map(|part| part.get("text").and_then(Value::as_str).and_then(non_empty)),
        _ => None,
    }
}

fn first_value<'a>(raw: &'a Value, paths: &[FieldPath]) -> Option<&'a Value> {
    paths.iter().find_map(|path| {
        path.iter()
            .try_fold(raw, |node, key| node.get(key))
            .filter(|value| !value.is_null())
    })
}

fn first_string(raw: &Value, paths: &[FieldPath]) -> Option<String> {
    paths.iter().find_map(|path| {
        path.iter()
            .try_fold(raw, |node, key| node.get(key))
            .and_then(Value::as_str)
            .and_then(non_empty)
    })
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
