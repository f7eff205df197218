//! Test-only helpers: in-memory store, fixed clock, workspaces, and payloads.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};
use tempfile::TempDir;

use crate::core::state::TurnState;
use crate::io::clock::Clock;
use crate::io::state_store::{StateStore, StoreError, decode_record};

/// How far before "now" a workspace's turn starts.
const TURN_LEAD: Duration = Duration::from_secs(60);
/// Fixed mtime for files that predate every turn.
const STALE_MTIME: Duration = Duration::from_secs(1_000);

/// In-memory [`StateStore`] that stores serialized records, so corrupt-record
/// handling matches the file adapter.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: RefCell<BTreeMap<String, String>>,
    fail_writes: Cell<bool>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw text for `session_id`, bypassing serialization.
    pub fn put_raw(&self, session_id: &str, raw: &str) {
        self.records
            .borrow_mut()
            .insert(session_id.to_string(), raw.to_string());
    }

    /// Make every subsequent write and clear fail with an I/O error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.records.borrow().contains_key(session_id)
    }

    fn check_writable(&self, action: &'static str, session_id: &str) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            return Err(StoreError::Io {
                action,
                path: PathBuf::from(format!("memory://{session_id}")),
                source: io::Error::other("injected failure"),
            });
        }
        Ok(())
    }
}

impl StateStore for MemoryStateStore {
    fn read(&self, session_id: &str) -> Result<Option<TurnState>, StoreError> {
        let records = self.records.borrow();
        let Some(raw) = records.get(session_id) else {
            return Ok(None);
        };
        let path = PathBuf::from(format!("memory://{session_id}"));
        decode_record(session_id, &path, raw).map(Some)
    }

    fn write(&self, session_id: &str, state: &TurnState) -> Result<(), StoreError> {
        self.check_writable("write turn state", session_id)?;
        let raw = serde_json::to_string(state)?;
        self.records
            .borrow_mut()
            .insert(session_id.to_string(), raw);
        Ok(())
    }

    fn clear(&self, session_id: &str) -> Result<(), StoreError> {
        self.check_writable("remove turn state", session_id)?;
        self.records.borrow_mut().remove(session_id);
        Ok(())
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now_ms: Cell<i64>,
}

impl FixedClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: Cell::new(now_ms),
        }
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.set(self.now_ms.get() + delta_ms);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.get()
    }
}

/// Temporary project directory with controllable artifact mtimes.
///
/// `turn_start_ms` lies a minute before creation, so files written with
/// [`Workspace::write_fresh`] count as produced during the turn and files
/// written with [`Workspace::write_stale`] never do. No `.planning` directory
/// exists until something is written under it.
pub struct Workspace {
    dir: TempDir,
    turn_start_ms: i64,
}

impl Workspace {
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let turn_start = SystemTime::now() - TURN_LEAD;
        Ok(Self {
            dir,
            turn_start_ms: system_time_ms(turn_start),
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn turn_start_ms(&self) -> i64 {
        self.turn_start_ms
    }

    /// Write `relative` with a current mtime.
    pub fn write_fresh(&self, relative: &str) -> io::Result<PathBuf> {
        self.write_with_mtime(relative, SystemTime::now())
    }

    /// Write `relative` with an mtime long before any turn.
    pub fn write_stale(&self, relative: &str) -> io::Result<PathBuf> {
        self.write_with_mtime(relative, UNIX_EPOCH + STALE_MTIME)
    }

    /// Write `.planning/config.json`.
    pub fn write_config(&self, config: &Value) -> io::Result<PathBuf> {
        let path = self.write_fresh(".planning/config.json")?;
        fs::write(&path, config.to_string())?;
        Ok(path)
    }

    fn write_with_mtime(&self, relative: &str, mtime: SystemTime) -> io::Result<PathBuf> {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, format!("# {relative}\n"))?;
        File::options().write(true).open(&path)?.set_modified(mtime)?;
        Ok(path)
    }
}

fn system_time_ms(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// `UserPromptSubmit` payload.
pub fn turn_start(session_id: &str, prompt: &str) -> Value {
    json!({
        "hook_event_name": "UserPromptSubmit",
        "session_id": session_id,
        "prompt": prompt,
    })
}

/// `PreToolUse` payload for an arbitrary tool.
pub fn pre_tool(session_id: &str, tool: &str, input: Value) -> Value {
    json!({
        "hook_event_name": "PreToolUse",
        "session_id": session_id,
        "tool_name": tool,
        "tool_input": input,
    })
}

/// `PreToolUse` payload delegating to `subagent` via `Task`.
pub fn task_call(session_id: &str, subagent: &str) -> Value {
    pre_tool(
        session_id,
        "Task",
        json!({ "subagent_type": subagent, "prompt": "do the work" }),
    )
}

/// `SubagentStop` payload.
pub fn subagent_stop(session_id: &str, agent_type: &str) -> Value {
    json!({
        "hook_event_name": "SubagentStop",
        "session_id": session_id,
        "agent_type": agent_type,
    })
}

/// `Stop` payload.
pub fn turn_end(session_id: &str) -> Value {
    json!({
        "hook_event_name": "Stop",
        "session_id": session_id,
        "stop_hook_active": false,
    })
}

/// Attach a workspace directory to a payload.
pub fn with_cwd(mut payload: Value, cwd: &Path) -> Value {
    if let Some(object) = payload.as_object_mut() {
        object.insert("cwd".to_string(), json!(cwd.to_string_lossy()));
    }
    payload
}
