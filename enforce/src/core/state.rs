//! Per-session turn state.

use serde::{Deserialize, Serialize};

use crate::core::policy::RequiredSubagent;

/// Persisted governance facts for one in-progress turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnState {
    /// Owning session (also the storage key).
    pub session_id: String,
    /// True while a governed turn is open.
    pub active: bool,
    /// Detected governed command, lowercase.
    #[serde(default)]
    pub command: Option<String>,
    /// Delegate the policy demanded when the turn started.
    #[serde(default)]
    pub required_subagent: RequiredSubagent,
    /// Wall-clock start of the turn; lower bound for artifact freshness.
    pub turn_start_ms: i64,
    /// Advisory parallel count claimed in the prompt.
    #[serde(default)]
    pub expected_parallel_count: Option<u32>,
    /// Delegate-invocation tool calls observed so far.
    #[serde(default)]
    pub task_call_count: u32,
    #[serde(default)]
    pub delegated_subagent: Option<String>,
    #[serde(default)]
    pub delegated_at_ms: Option<i64>,
    #[serde(default)]
    pub subagent_completed: bool,
    #[serde(default)]
    pub subagent_completed_at_ms: Option<i64>,
}

/// Position of a turn in the enforcement lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Governed command detected; delegate not yet invoked.
    Pending,
    /// First qualifying delegation observed.
    Delegated,
    /// A delegate signaled completion.
    SubagentDone,
}

impl TurnState {
    /// Open a governed turn.
    pub fn begin(
        session_id: &str,
        command: &str,
        required_subagent: RequiredSubagent,
        turn_start_ms: i64,
        expected_parallel_count: Option<u32>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            active: true,
            command: Some(command.to_string()),
            required_subagent,
            turn_start_ms,
            expected_parallel_count,
            task_call_count: 0,
            delegated_subagent: None,
            delegated_at_ms: None,
            subagent_completed: false,
            subagent_completed_at_ms: None,
        }
    }

    /// Governed command of an active, well-formed record.
    ///
    /// `None` means the record violates the `active => command` invariant (or is
    /// inactive) and should be discarded.
    pub fn active_command(&self) -> Option<&str> {
        if !self.active {
            return None;
        }
        self.command
            .as_deref()
            .map(str::trim)
            .filter(|command| !command.is_empty())
    }

    pub fn phase(&self) -> TurnPhase {
        if self.subagent_completed {
            TurnPhase::SubagentDone
        } else if self.delegated_subagent.is_some() {
            TurnPhase::Delegated
        } else {
            TurnPhase::Pending
        }
    }

    pub fn is_delegated(&self) -> bool {
        self.delegated_subagent.is_some()
    }

    /// Record the first delegation. Later calls leave the record untouched and
    /// return `false`.
    pub fn record_delegation(&mut self, subagent: &str, now_ms: i64) -> bool {
        if self.delegated_subagent.is_some() {
            return false;
        }
        self.delegated_subagent = Some(subagent.to_string());
        self.delegated_at_ms = Some(now_ms);
        true
    }

    pub fn record_task_call(&mut self) {
        self.task_call_count = self.task_call_count.saturating_add(1);
    }

    pub fn record_completion(&mut self, now_ms: i64) {
        self.subagent_completed = true;
        self.subagent_completed_at_ms = Some(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> TurnState {
        TurnState::begin(
            "sess-1",
            "/gsd:quick",
            RequiredSubagent::Named("gsd-planner".to_string()),
            1_000,
            Some(3),
        )
    }

    #[test]
    fn phases_follow_recorded_facts() {
        let mut state = pending();
        assert_eq!(state.phase(), TurnPhase::Pending);
        assert!(state.record_delegation("gsd-planner", 2_000));
        assert_eq!(state.phase(), TurnPhase::Delegated);
        state.record_completion(3_000);
        assert_eq!(state.phase(), TurnPhase::SubagentDone);
        assert_eq!(state.turn_start_ms, 1_000);
    }

    #[test]
    fn delegation_is_recorded_once() {
        let mut state = pending();
        assert!(state.record_delegation("gsd-planner", 2_000));
        assert!(!state.record_delegation("gsd-executor", 3_000));
        assert_eq!(state.delegated_subagent.as_deref(), Some("gsd-planner"));
        assert_eq!(state.delegated_at_ms, Some(2_000));
    }

    #[test]
    fn inactive_or_commandless_records_have_no_active_command() {
        let mut state = pending();
        assert_eq!(state.active_command(), Some("/gsd:quick"));

        state.command = Some("  ".to_string());
        assert_eq!(state.active_command(), None);

        let mut inactive = pending();
        inactive.active = false;
        assert_eq!(inactive.active_command(), None);
    }

    #[test]
    fn missing_optional_fields_decode_with_defaults() {
        let state: TurnState = serde_json::from_value(serde_json::json!({
            "session_id": "sess-1",
            "active": true,
            "command": "/gsd:quick",
            "turn_start_ms": 5
        }))
        .expect("decode");
        assert_eq!(state.required_subagent, RequiredSubagent::Unspecified);
        assert_eq!(state.task_call_count, 0);
        assert!(!state.subagent_completed);
    }
}
