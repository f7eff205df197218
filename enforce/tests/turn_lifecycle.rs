//! Lifecycle tests driving the dispatcher over full turns with the file store.
//!
//! Each test plays the host's event sequence for one or more sessions and
//! checks decisions plus what remains on disk afterwards.

use std::fs;

use gsd_enforce::core::decision::{Decision, ReasonCode};
use gsd_enforce::core::event::HookEvent;
use gsd_enforce::core::fault::SystemFault;
use gsd_enforce::dispatch::Enforcer;
use gsd_enforce::io::policy_source::{PolicySource, load_policy};
use gsd_enforce::io::state_store::{FileStateStore, StateStore};
use gsd_enforce::messages::Messages;
use gsd_enforce::test_support::{
    FixedClock, Workspace, pre_tool, subagent_stop, task_call, turn_end, turn_start,
};
use serde_json::{Value, json};
use tempfile::TempDir;

struct Session {
    ws: Workspace,
    state_dir: TempDir,
    clock: FixedClock,
    messages: Messages,
}

impl Session {
    fn new() -> Self {
        let ws = Workspace::new().expect("workspace");
        let clock = FixedClock::new(ws.turn_start_ms());
        Self {
            ws,
            state_dir: tempfile::tempdir().expect("state dir"),
            clock,
            messages: Messages::default(),
        }
    }

    fn store(&self) -> FileStateStore {
        FileStateStore::new(self.state_dir.path())
    }

    /// Policy is reloaded per event, as the hook does.
    fn send(&self, payload: Value) -> Result<Decision, SystemFault> {
        let policy = load_policy(self.ws.root());
        let store = self.store();
        self.clock.advance(1_000);
        Enforcer::new(&policy, &store, &self.clock, &self.messages, self.ws.root())
            .handle(&HookEvent::decode(&payload))
    }

    fn decide(&self, payload: Value) -> Decision {
        self.send(payload).expect("decision")
    }

    fn code(&self, payload: Value) -> Option<ReasonCode> {
        self.decide(payload).verdict().map(|verdict| verdict.code)
    }

    fn record_count(&self) -> usize {
        fs::read_dir(self.state_dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Full `/gsd:quick` turn:
/// 1. prompt opens the turn
/// 2. Bash before delegation is denied
/// 3. Task → gsd-planner delegates; later tools pass
/// 4. turn-end blocks until PLAN and SUMMARY exist, then closes the turn
#[test]
fn quick_turn_from_prompt_to_close() {
    let s = Session::new();
    assert_eq!(
        s.decide(turn_start("sess", "/gsd:quick add a dark mode toggle")),
        Decision::Allow
    );
    assert_eq!(s.record_count(), 1);

    assert_eq!(
        s.code(pre_tool("sess", "Bash", json!({ "command": "npm test" }))),
        Some(ReasonCode::ToolBeforeDelegation)
    );
    assert_eq!(s.decide(task_call("sess", "gsd-planner")), Decision::Allow);
    assert_eq!(
        s.decide(pre_tool("sess", "Bash", json!({ "command": "npm test" }))),
        Decision::Allow
    );
    assert_eq!(s.decide(subagent_stop("sess", "gsd-planner")), Decision::Allow);

    s.ws.write_fresh(".planning/quick/004-dark-mode/004-PLAN.md").expect("plan");
    assert_eq!(s.code(turn_end("sess")), Some(ReasonCode::ArtifactMissing));

    s.ws.write_fresh(".planning/quick/004-dark-mode/004-SUMMARY.md").expect("summary");
    assert_eq!(s.decide(turn_end("sess")), Decision::Allow);
    assert_eq!(s.store().read("sess").expect("read"), None);
    assert_eq!(s.record_count(), 0);

    // Closed turn: a second stop is a no-op.
    assert_eq!(s.decide(turn_end("sess")), Decision::Allow);
}

#[test]
fn sessions_are_isolated() {
    let s = Session::new();
    s.decide(turn_start("a", "/gsd:execute-phase 2"));
    s.decide(turn_start("b", "/gsd:plan-phase 3"));

    s.decide(task_call("a", "gsd-executor"));
    assert_eq!(
        s.code(pre_tool("b", "Write", json!({ "file_path": "x" }))),
        Some(ReasonCode::ToolBeforeDelegation)
    );
    assert_eq!(
        s.decide(pre_tool("a", "Write", json!({ "file_path": "x" }))),
        Decision::Allow
    );

    let a = s.store().read("a").expect("read").expect("a");
    let b = s.store().read("b").expect("read").expect("b");
    assert_eq!(a.command.as_deref(), Some("/gsd:execute-phase"));
    assert!(a.is_delegated());
    assert_eq!(b.command.as_deref(), Some("/gsd:plan-phase"));
    assert!(!b.is_delegated());
}

#[test]
fn project_override_replaces_builtin_rule() {
    let s = Session::new();
    s.ws.write_config(&json!({
        "command_mapping": {
            "/gsd:quick": {
                "required_subagent": "gsd-quick-runner",
                "allowed_pre_tools": ["Task", "Read"],
                "expected_artifacts": [
                    { "base_dir": ".planning/quick", "required_any": ["**/*-SUMMARY.md"] }
                ]
            }
        }
    }))
    .expect("config");
    assert!(matches!(
        load_policy(s.ws.root()).source,
        PolicySource::ProjectOverride { .. }
    ));

    s.decide(turn_start("sess", "/gsd:quick fix typo"));
    assert_eq!(
        s.decide(pre_tool("sess", "Read", json!({ "file_path": "a" }))),
        Decision::Allow
    );
    s.decide(task_call("sess", "gsd-planner"));
    assert_eq!(s.code(turn_end("sess")), Some(ReasonCode::DelegateMismatch));

    s.decide(turn_start("sess", "/gsd:quick fix typo again"));
    s.decide(task_call("sess", "gsd-quick-runner"));
    s.ws.write_fresh(".planning/quick/005-typo/005-SUMMARY.md").expect("summary");
    assert_eq!(s.decide(turn_end("sess")), Decision::Allow);
}

#[test]
fn invalid_override_keeps_builtin_rules() {
    let s = Session::new();
    s.ws.write_config(&json!({
        "command_mapping": { "/gsd:quick": { "required_subagent": "" } }
    }))
    .expect("config");
    assert!(matches!(
        load_policy(s.ws.root()).source,
        PolicySource::RejectedOverride { .. }
    ));

    s.decide(turn_start("sess", "/gsd:quick anything"));
    s.decide(task_call("sess", "gsd-planner"));
    assert_eq!(s.code(turn_end("sess")), Some(ReasonCode::ArtifactBaseMissing));
}

#[test]
fn corrupt_record_on_disk_is_state_fault() {
    let s = Session::new();
    s.decide(turn_start("sess", "/gsd:quick anything"));
    let path = s.store().path_for("sess");
    fs::write(&path, "\"just a string\"").expect("corrupt");

    let err = s.send(pre_tool("sess", "Bash", json!({}))).expect_err("fault");
    assert_eq!(err.code(), ReasonCode::StateCorrupt);

    // A new prompt discards the corrupt record.
    assert_eq!(s.decide(turn_start("sess", "plain chat")), Decision::Allow);
    assert!(!path.exists());
}

#[test]
fn parallel_claim_is_recorded_and_does_not_block() {
    let s = Session::new();
    s.decide(turn_start("sess", "/gsd:map-codebase 同时启动 4 个并行代理"));
    let state = s.store().read("sess").expect("read").expect("state");
    assert_eq!(state.expected_parallel_count, Some(4));

    s.decide(task_call("sess", "gsd-codebase-mapper"));
    s.decide(task_call("sess", "gsd-codebase-mapper"));
    s.ws.write_fresh(".planning/codebase/STACK.md").expect("stack");
    assert_eq!(s.decide(turn_end("sess")), Decision::Allow);
}
