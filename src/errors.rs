//! Typed error hierarchy for the migration assistant.
//!
//! Storage code returns `anyhow::Result` with context; the domain signals
//! callers need to branch on travel inside it as `TrackerError` and are
//! recovered with `downcast_ref` (see [`is_not_found`]).

use thiserror::Error;

/// Errors from the status tracker and the check runner.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Step {id} not found")]
    StepNotFound { id: i64 },

    #[error("Migration process {key} not found")]
    ProcessNotFound { key: String },

    #[error("No executions found for step {step_id}")]
    NoExecutions { step_id: i64 },

    #[error("Unknown check '{slug}'")]
    UnknownCheck { slug: String },

    #[error("Step {slug} not found in phase {phase}")]
    StepNotInPhase { slug: String, phase: String },

    #[error("No executor configured for check '{slug}'")]
    NoExecutor { slug: String },

    #[error("Invalid status '{value}'")]
    InvalidStatus { value: String },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl TrackerError {
    /// True for the "missing resource" family of signals.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StepNotFound { .. }
                | Self::ProcessNotFound { .. }
                | Self::NoExecutions { .. }
                | Self::UnknownCheck { .. }
                | Self::StepNotInPhase { .. }
        )
    }
}

/// True when `err` carries a not-found `TrackerError` anywhere in its chain.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|e| e.downcast_ref::<TrackerError>())
        .any(TrackerError::is_not_found)
}
