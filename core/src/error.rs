use crate::phase::Phase;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GameError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Phase violation: {operation} is not allowed during {phase:?}")]
    PhaseViolation { operation: String, phase: Phase },

    #[error("Insufficient data: {what}")]
    InsufficientData { what: String },

    #[error("Computation in progress for {key}, retry later")]
    ComputationInProgress { key: String },

    #[error("Persistence failure while committing {key}: {source}")]
    PersistenceFailure {
        key: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Arithmetic invariant violated: {detail}")]
    ArithmeticInvariantViolation { detail: String },

    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GameError {
    pub fn phase_violation(operation: impl Into<String>, phase: Phase) -> Self {
        Self::PhaseViolation { operation: operation.into(), phase }
    }

    pub fn insufficient(what: impl Into<String>) -> Self {
        Self::InsufficientData { what: what.into() }
    }

    pub fn invariant(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        log::error!("arithmetic invariant violated: {detail}");
        Self::ArithmeticInvariantViolation { detail }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidCommand { reason: reason.into() }
    }

    /// True for errors the caller should surface and retry later,
    /// as opposed to defects.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ComputationInProgress { .. } | Self::PersistenceFailure { .. })
    }
}

pub type GameResult<T> = Result<T, GameError>;
