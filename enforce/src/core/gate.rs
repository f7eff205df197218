//! Delegation gates.
//!
//! Pure checks between a turn record and its policy rule:
//! - before delegation, only `allowed_pre_tools` may run;
//! - at turn end, the recorded delegate must exist and equal the required one.

use serde_json::Value;

use crate::core::policy::{DELEGATE_FIELD, DELEGATE_TOOL, PolicyRule};
use crate::core::state::TurnState;

/// Outcome of gating one pre-tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreToolGate {
    /// No gating applies to this call.
    Open,
    /// The call is the first qualifying delegation and must name its delegate.
    Delegation,
    /// The call comes before the required delegation and is not allowed.
    Deny { required: String },
}

/// Gate one tool call against the rule of the active command.
pub fn gate_pre_tool(state: &TurnState, rule: &PolicyRule, tool: &str) -> PreToolGate {
    let Some(required) = rule.enforced_subagent() else {
        return PreToolGate::Open;
    };
    if state.is_delegated() {
        return PreToolGate::Open;
    }
    if !rule.allows_before_delegation(tool) {
        return PreToolGate::Deny {
            required: required.to_string(),
        };
    }
    if tool == DELEGATE_TOOL {
        return PreToolGate::Delegation;
    }
    PreToolGate::Open
}

/// Delegate named by a delegate-tool input, if present and non-empty.
pub fn delegate_target(tool_input: &Value) -> Option<&str> {
    tool_input
        .get(DELEGATE_FIELD)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|target| !target.is_empty())
}

/// Why a turn's delegation does not satisfy its rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegationGap {
    Missing { required: String },
    Mismatch { required: String, actual: String },
}

/// Check delegate presence, then delegate match. Sentinel rules always pass.
pub fn delegation_gap(state: &TurnState, rule: &PolicyRule) -> Option<DelegationGap> {
    let required = rule.enforced_subagent()?;
    match state.delegated_subagent.as_deref() {
        None => Some(DelegationGap::Missing {
            required: required.to_string(),
        }),
        Some(actual) if actual != required => Some(DelegationGap::Mismatch {
            required: required.to_string(),
            actual: actual.to_string(),
        }),
        Some(_) => None,
    }
}
