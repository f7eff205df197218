//! Deterministic, pure enforcement logic.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data (decoded events, turn records, policy rules) and return deterministic
//! outputs suitable for tests.

pub mod claims;
pub mod command;
pub mod decision;
pub mod event;
pub mod fault;
pub mod gate;
pub mod glob;
pub mod policy;
pub mod redact;
pub mod state;
