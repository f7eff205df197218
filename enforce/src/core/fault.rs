//! System faults: conditions where enforcement cannot establish ground truth.
//!
//! Workflow violations are not faults; they are [`Decision`] values. A
//! `SystemFault` always surfaces as a deny/block plus a stderr diagnostic.
//!
//! [`Decision`]: crate::core::decision::Decision

use thiserror::Error;

use crate::core::decision::ReasonCode;

#[derive(Debug, Error)]
pub enum SystemFault {
    #[error("malformed hook payload: {0}")]
    MalformedPayload(String),

    #[error("missing session identifier on {event} event")]
    MissingSessionId { event: &'static str },

    #[error("{tool} call is missing required field `{field}`")]
    MissingToolField { tool: String, field: &'static str },

    #[error("turn state for session `{session_id}` is corrupt: {detail}")]
    StateCorrupt { session_id: String, detail: String },

    #[error("turn state store failed: {0}")]
    Storage(String),

    #[error("policy fault: {0}")]
    Policy(String),
}

impl SystemFault {
    pub fn code(&self) -> ReasonCode {
        match self {
            Self::MalformedPayload(_) => ReasonCode::MalformedPayload,
            Self::MissingSessionId { .. } => ReasonCode::MissingSessionId,
            Self::MissingToolField { .. } => ReasonCode::MissingToolField,
            Self::StateCorrupt { .. } => ReasonCode::StateCorrupt,
            Self::Storage(_) => ReasonCode::StorageFailure,
            Self::Policy(_) => ReasonCode::PolicyFault,
        }
    }
}
