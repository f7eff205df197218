//! I/O for enforcement: turn state files, artifact scans, policy overrides,
//! and process settings.

pub mod artifacts;
pub mod clock;
pub mod policy_source;
pub mod settings;
pub mod state_store;
