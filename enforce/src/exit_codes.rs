//! Stable exit codes for the `gsd-enforce` binary.

/// Event handled (any decision emitted) or subcommand succeeded.
pub const OK: i32 = 0;
/// Subcommand failed: bad arguments, unreadable state, or other errors.
pub const INVALID: i32 = 1;
/// Hook input rejected without a decision: empty stdin, unparsable JSON, or
/// an unrecognized event.
pub const REJECTED: i32 = 2;
