//! Turn-scoped policy enforcement for `/gsd:*` workflow commands.
//!
//! The binary runs as a host lifecycle hook: each invocation receives one
//! event as JSON on stdin and answers with one decision on stdout. A prompt
//! that names a governed command opens a turn; until the turn delegates to
//! the command's required subagent only allowed tools may run, and the turn
//! cannot end until the delegate is correct and the expected artifacts were
//! written during the turn.
//!
//! - **[`core`]**: Pure, deterministic logic (command detection, policy,
//!   gates, decisions). No I/O.
//! - **[`io`]**: Side effects (turn state files, artifact scans, project
//!   config, environment settings, clock).
//!
//! [`dispatch`] runs the per-event state machine over both; [`hook`] adapts
//! it to stdin/stdout.

pub mod core;
pub mod dispatch;
pub mod exit_codes;
pub mod hook;
pub mod io;
pub mod logging;
pub mod messages;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
