//! Terminal decisions and their host JSON encoding.

use std::fmt;

use serde_json::{Value, json};

use crate::core::event::{EventKind, PRE_TOOL_EVENT};

/// Stable machine-readable reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    UnmappedCommand,
    ToolBeforeDelegation,
    MissingDelegation,
    DelegateMismatch,
    ArtifactBaseMissing,
    ArtifactMissing,
    ArtifactAnyMissing,
    MalformedPayload,
    MissingSessionId,
    MissingToolField,
    StateCorrupt,
    StorageFailure,
    PolicyFault,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnmappedCommand => "USER_UNMAPPED_COMMAND",
            Self::ToolBeforeDelegation => "USER_TOOL_BEFORE_DELEGATION",
            Self::MissingDelegation => "USER_MISSING_DELEGATION",
            Self::DelegateMismatch => "USER_DELEGATE_MISMATCH",
            Self::ArtifactBaseMissing => "ARTIFACT_BASE_MISSING",
            Self::ArtifactMissing => "USER_ARTIFACT_MISSING",
            Self::ArtifactAnyMissing => "USER_ARTIFACT_ANY_MISSING",
            Self::MalformedPayload => "SYS_MALFORMED_PAYLOAD",
            Self::MissingSessionId => "SYS_MISSING_SESSION_ID",
            Self::MissingToolField => "SYS_MISSING_TOOL_FIELD",
            Self::StateCorrupt => "SYS_STATE_CORRUPT",
            Self::StorageFailure => "SYS_STORAGE_FAILURE",
            Self::PolicyFault => "SYS_POLICY_FAULT",
        }
    }

    /// True for codes caused by the system rather than the workflow.
    pub fn is_system(self) -> bool {
        self.as_str().starts_with("SYS_")
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coded, human-readable explanation attached to a deny or block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub code: ReasonCode,
    pub message: String,
}

impl Verdict {
    pub fn new(code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Host-facing reason string: `[CODE] message`.
    pub fn reason(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

/// Exactly one outcome per handled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Per-call tool denial (pre-tool-call events only).
    Deny(Verdict),
    /// Stop the host from proceeding (turn-start, turn-end, delegate completion).
    Block(Verdict),
}

impl Decision {
    /// Route a verdict to the response channel `kind` supports.
    pub fn reject(kind: EventKind, verdict: Verdict) -> Self {
        match kind {
            EventKind::PreToolCall => Self::Deny(verdict),
            _ => Self::Block(verdict),
        }
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            Self::Allow => None,
            Self::Deny(verdict) | Self::Block(verdict) => Some(verdict),
        }
    }

    pub fn map_message(self, f: impl FnOnce(&str) -> String) -> Self {
        match self {
            Self::Allow => Self::Allow,
            Self::Deny(verdict) => Self::Deny(Verdict::new(verdict.code, f(&verdict.message))),
            Self::Block(verdict) => Self::Block(Verdict::new(verdict.code, f(&verdict.message))),
        }
    }

    /// JSON object the host interprets.
    pub fn to_response(&self) -> Value {
        match self {
            Self::Allow => json!({}),
            Self::Deny(verdict) => json!({
                "hookSpecificOutput": {
                    "hookEventName": PRE_TOOL_EVENT,
                    "permissionDecision": "deny",
                    "permissionDecisionReason": verdict.reason(),
                }
            }),
            Self::Block(verdict) => json!({
                "decision": "block",
                "reason": verdict.reason(),
            }),
        }
    }
}
