//! Event dispatcher: one decoded event in, one decision out.
//!
//! Turn lifecycle per session:
//!
//! ```text
//! Absent ──turn-start(/gsd:*)──▶ Pending ──Task(subagent_type)──▶ Delegated
//!                                                                    │
//!                                   Closed ◀──turn-end(ok)── SubagentDone
//! ```
//!
//! Turn-end may close from Pending or Delegated too; its checks decide.
//! Workflow violations come back as [`Decision`] values; conditions that make
//! enforcement unreliable come back as [`SystemFault`].

use std::path::Path;

use minijinja::context;
use tracing::{debug, instrument, warn};

use crate::core::claims::extract_parallel_claim;
use crate::core::command::detect_command;
use crate::core::decision::{Decision, ReasonCode, Verdict};
use crate::core::event::{
    EventPayload, HookEvent, PRE_TOOL_EVENT, SUBAGENT_STOP_EVENT, TURN_END_EVENT,
    TURN_START_EVENT,
};
use crate::core::fault::SystemFault;
use crate::core::gate::{DelegationGap, PreToolGate, delegate_target, delegation_gap, gate_pre_tool};
use crate::core::policy::{DELEGATE_FIELD, DELEGATE_TOOL, PolicyRule, RequiredSubagent};
use crate::core::state::TurnState;
use crate::io::artifacts::{ArtifactGap, ArtifactScan, DEFAULT_MAX_SCAN_FILES, verify_artifacts};
use crate::io::clock::Clock;
use crate::io::policy_source::{PROJECT_CONFIG_PATH, PolicyContext};
use crate::io::state_store::StateStore;
use crate::messages::{MessageKey, Messages};

/// Everything needed to decide one event.
pub struct Enforcer<'a, S: StateStore, C: Clock> {
    policy: &'a PolicyContext,
    store: &'a S,
    clock: &'a C,
    messages: &'a Messages,
    workspace: &'a Path,
    max_scan_files: usize,
}

impl<'a, S: StateStore, C: Clock> Enforcer<'a, S, C> {
    pub fn new(
        policy: &'a PolicyContext,
        store: &'a S,
        clock: &'a C,
        messages: &'a Messages,
        workspace: &'a Path,
    ) -> Self {
        Self {
            policy,
            store,
            clock,
            messages,
            workspace,
            max_scan_files: DEFAULT_MAX_SCAN_FILES,
        }
    }

    pub fn with_max_scan_files(mut self, max_scan_files: usize) -> Self {
        self.max_scan_files = max_scan_files;
        self
    }

    /// Decide `event`. Unrecognized events are allowed here; the hook entry
    /// point rejects them before dispatch.
    #[instrument(skip_all, fields(event = event.kind().host_name(), session = event.session_id.as_deref()))]
    pub fn handle(&self, event: &HookEvent) -> Result<Decision, SystemFault> {
        let session = event.session_id.as_deref();
        match &event.payload {
            EventPayload::TurnStart { prompt } => self.turn_start(session, prompt.as_deref()),
            EventPayload::PreToolCall {
                tool_name,
                tool_input,
            } => self.pre_tool(session, tool_name.as_deref(), tool_input),
            EventPayload::SubagentCompletion { agent_type } => {
                self.subagent_completion(session, agent_type.as_deref())
            }
            EventPayload::TurnEnd { stop_hook_active } => self.turn_end(session, *stop_hook_active),
            EventPayload::Unrecognized { name } => {
                debug!(?name, "unrecognized event");
                Ok(Decision::Allow)
            }
        }
    }

    fn turn_start(
        &self,
        session: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<Decision, SystemFault> {
        if let Some(session) = session {
            self.store.clear(session)?;
        }
        let Some(command) = prompt.and_then(detect_command) else {
            debug!("no governed command in prompt");
            return Ok(Decision::Allow);
        };
        let session = session.ok_or(SystemFault::MissingSessionId {
            event: TURN_START_EVENT,
        })?;

        let required = self
            .policy
            .rule(&command)
            .map(|rule| rule.required_subagent.clone())
            .unwrap_or(RequiredSubagent::Unspecified);
        let claim = prompt.and_then(extract_parallel_claim);
        let state = TurnState::begin(session, &command, required, self.clock.now_ms(), claim);
        debug!(
            command = %command,
            required = %state.required_subagent,
            expected_parallel_count = ?claim,
            "governed turn started"
        );
        self.store.write(session, &state)?;
        Ok(Decision::Allow)
    }

    fn pre_tool(
        &self,
        session: Option<&str>,
        tool: Option<&str>,
        tool_input: &serde_json::Value,
    ) -> Result<Decision, SystemFault> {
        let Some(session) = session else {
            debug!("pre-tool event without session; nothing to gate");
            return Ok(Decision::Allow);
        };
        let Some(mut state) = self.load_active(session)? else {
            return Ok(Decision::Allow);
        };
        let Some((command, rule)) = self.active_rule(&state) else {
            debug!(command = ?state.command, "unmapped command; pre-tool gating skipped");
            return Ok(Decision::Allow);
        };
        let Some(tool) = tool else {
            if rule.enforced_subagent().is_none() || state.is_delegated() {
                debug!("pre-tool event without tool name outside a pending turn");
                return Ok(Decision::Allow);
            }
            return Err(SystemFault::MalformedPayload(format!(
                "{PRE_TOOL_EVENT} event has no tool name"
            )));
        };

        match gate_pre_tool(&state, rule, tool) {
            PreToolGate::Deny { required } => {
                debug!(tool, required = %required, "tool denied before delegation");
                let message = self.messages.render(
                    MessageKey::ToolBeforeDelegation,
                    context! { command, required, tool },
                );
                return Ok(Decision::Deny(Verdict::new(
                    ReasonCode::ToolBeforeDelegation,
                    message,
                )));
            }
            PreToolGate::Delegation => {
                let target =
                    delegate_target(tool_input).ok_or_else(|| SystemFault::MissingToolField {
                        tool: tool.to_string(),
                        field: DELEGATE_FIELD,
                    })?;
                state.record_delegation(target, self.clock.now_ms());
                debug!(subagent = target, "delegation recorded");
            }
            PreToolGate::Open => {}
        }

        if tool == DELEGATE_TOOL {
            state.record_task_call();
            self.store.write(session, &state)?;
        }
        Ok(Decision::Allow)
    }

    fn subagent_completion(
        &self,
        session: Option<&str>,
        agent_type: Option<&str>,
    ) -> Result<Decision, SystemFault> {
        let session = session.ok_or(SystemFault::MissingSessionId {
            event: SUBAGENT_STOP_EVENT,
        })?;
        let Some(mut state) = self.load_active(session)? else {
            return Ok(Decision::Allow);
        };
        state.record_completion(self.clock.now_ms());
        debug!(
            agent_type,
            delegated = ?state.delegated_subagent,
            "subagent completed"
        );
        self.store.write(session, &state)?;
        Ok(Decision::Allow)
    }

    fn turn_end(
        &self,
        session: Option<&str>,
        stop_hook_active: bool,
    ) -> Result<Decision, SystemFault> {
        let session = session.ok_or(SystemFault::MissingSessionId {
            event: TURN_END_EVENT,
        })?;
        let Some(state) = self.load_active(session)? else {
            return Ok(Decision::Allow);
        };
        debug!(stop_hook_active, phase = ?state.phase(), "checking turn end");

        let Some((command, rule)) = self.active_rule(&state) else {
            let command = state.active_command().unwrap_or_default();
            let message = self.messages.render(
                MessageKey::UnmappedCommand,
                context! { command, config_path => PROJECT_CONFIG_PATH },
            );
            return Ok(Decision::Block(Verdict::new(
                ReasonCode::UnmappedCommand,
                message,
            )));
        };

        if let Some(gap) = delegation_gap(&state, rule) {
            return Ok(Decision::Block(self.delegation_verdict(command, gap)));
        }

        let scan = ArtifactScan {
            workspace: self.workspace,
            turn_start_ms: state.turn_start_ms,
            max_files: self.max_scan_files,
        };
        if let Some(gap) = verify_artifacts(&rule.expected_artifacts, &scan)? {
            return Ok(Decision::Block(self.artifact_verdict(command, gap)));
        }

        if let Some(expected) = state
            .expected_parallel_count
            .filter(|expected| *expected > state.task_call_count)
        {
            warn!(
                command,
                expected,
                observed = state.task_call_count,
                "prompt claimed more parallel delegations than were made"
            );
        }
        self.store.clear(session)?;
        debug!(command, "turn closed");
        Ok(Decision::Allow)
    }

    /// Stored record if it describes an active governed turn. Records that
    /// are inactive or lack a command are discarded.
    fn load_active(&self, session: &str) -> Result<Option<TurnState>, SystemFault> {
        let Some(state) = self.store.read(session)? else {
            debug!("no turn state");
            return Ok(None);
        };
        if state.active_command().is_none() {
            debug!(active = state.active, command = ?state.command, "discarding stale turn state");
            self.store.clear(session)?;
            return Ok(None);
        }
        Ok(Some(state))
    }

    /// Live policy rule for the record's command.
    fn active_rule<'s>(&self, state: &'s TurnState) -> Option<(&'s str, &'a PolicyRule)> {
        let command = state.active_command()?;
        let rule = self.policy.rule(command)?;
        Some((command, rule))
    }

    fn delegation_verdict(&self, command: &str, gap: DelegationGap) -> Verdict {
        match gap {
            DelegationGap::Missing { required } => Verdict::new(
                ReasonCode::MissingDelegation,
                self.messages
                    .render(MessageKey::MissingDelegation, context! { command, required }),
            ),
            DelegationGap::Mismatch { required, actual } => Verdict::new(
                ReasonCode::DelegateMismatch,
                self.messages.render(
                    MessageKey::DelegateMismatch,
                    context! { command, required, actual },
                ),
            ),
        }
    }

    fn artifact_verdict(&self, command: &str, gap: ArtifactGap) -> Verdict {
        match gap {
            ArtifactGap::BaseMissing { base_dir } => Verdict::new(
                ReasonCode::ArtifactBaseMissing,
                self.messages.render(
                    MessageKey::ArtifactBaseMissing,
                    context! { command, base_dir },
                ),
            ),
            ArtifactGap::MissingAll { base_dir, pattern } => Verdict::new(
                ReasonCode::ArtifactMissing,
                self.messages.render(
                    MessageKey::ArtifactMissing,
                    context! { command, base_dir, pattern },
                ),
            ),
            ArtifactGap::MissingAny { base_dir, patterns } => Verdict::new(
                ReasonCode::ArtifactAnyMissing,
                self.messages.render(
                    MessageKey::ArtifactAnyMissing,
                    context! { command, base_dir, patterns },
                ),
            ),
        }
    }
}
