//! Hook entry point: read one event from stdin, write one decision to stdout.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::context;
use serde_json::Value;
use tracing::debug;

use crate::core::decision::{Decision, Verdict};
use crate::core::event::{EventKind, EventPayload, HookEvent};
use crate::core::fault::SystemFault;
use crate::core::redact::Redactor;
use crate::dispatch::Enforcer;
use crate::exit_codes;
use crate::io::clock::SystemClock;
use crate::io::policy_source::load_policy;
use crate::io::settings::Settings;
use crate::io::state_store::FileStateStore;
use crate::messages::{MessageKey, Messages};

const DIAGNOSTIC_PREFIX: &str = "[gsd-enforce]";

/// Handle one hook invocation and return the process exit code.
///
/// Every recognized event produces exactly one JSON line on `output` and exit
/// code 0, including system faults (which also print a diagnostic to stderr).
/// Input that cannot be interpreted as an event produces no JSON and
/// [`exit_codes::REJECTED`].
pub fn run_hook(mut input: impl Read, mut output: impl Write, settings: &Settings) -> i32 {
    let redactor = Redactor::new(
        settings.home_dir.as_deref(),
        Some(std::env::temp_dir().as_path()),
    );
    let event = match read_event(&mut input) {
        Ok(event) => event,
        Err(err) => {
            diagnose(&redactor, &format!("{err:#}"));
            return exit_codes::REJECTED;
        }
    };
    if let EventPayload::Unrecognized { name } = &event.payload {
        let name = name.as_deref().unwrap_or("<missing>");
        diagnose(&redactor, &format!("unrecognized hook event `{name}`"));
        return exit_codes::REJECTED;
    }

    let decision =
        decide(&event, settings, &redactor).map_message(|message| redactor.redact(message));
    debug!(kind = ?event.kind(), ?decision, "hook decision");
    let emitted = writeln!(output, "{}", decision.to_response()).and_then(|()| output.flush());
    match emitted {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            diagnose(&redactor, &format!("write hook response: {err}"));
            exit_codes::INVALID
        }
    }
}

/// Read and decode stdin. Empty or unparsable input is an error.
fn read_event(input: &mut impl Read) -> Result<HookEvent> {
    let mut raw = String::new();
    input.read_to_string(&mut raw).context("read stdin")?;
    if raw.trim().is_empty() {
        anyhow::bail!("empty stdin (expected JSON hook payload)");
    }
    let value: Value = serde_json::from_str(&raw).context("failed to parse JSON")?;
    Ok(HookEvent::decode(&value))
}

/// Dispatch a recognized event, folding system faults into the decision.
fn decide(event: &HookEvent, settings: &Settings, redactor: &Redactor) -> Decision {
    let messages = Messages::new(settings.locale);
    let workspace = resolve_workspace(event, settings);
    let policy = load_policy(&workspace);
    let store = FileStateStore::new(&settings.state_dir);
    let enforcer = Enforcer::new(&policy, &store, &SystemClock, &messages, &workspace)
        .with_max_scan_files(settings.max_scan_files);

    match enforcer.handle(event) {
        Ok(decision) => decision,
        Err(fault) => fault_decision(event.kind(), &fault, &messages, redactor),
    }
}

fn fault_decision(
    kind: EventKind,
    fault: &SystemFault,
    messages: &Messages,
    redactor: &Redactor,
) -> Decision {
    let detail = redactor.redact(&fault.to_string());
    eprintln!("{}", fault_diagnostic(fault, &detail));
    let message = messages.render(MessageKey::SystemFault, context! { detail });
    Decision::reject(kind, Verdict::new(fault.code(), message))
}

fn fault_diagnostic(fault: &SystemFault, detail: &str) -> String {
    format!("{DIAGNOSTIC_PREFIX} [{}] {detail}", fault.code())
}

/// Event directory, then the configured project dir, then the process dir.
fn resolve_workspace(event: &HookEvent, settings: &Settings) -> PathBuf {
    event
        .cwd
        .clone()
        .or_else(|| settings.project_dir.clone())
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| Path::new(".").to_path_buf())
}

fn diagnose(redactor: &Redactor, detail: &str) {
    eprintln!(
        "{DIAGNOSTIC_PREFIX} {}",
        redactor.redact(&format!("GSD enforcement hook error: {detail}"))
    );
}
