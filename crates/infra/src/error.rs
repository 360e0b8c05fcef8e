//! Engine and collaborator error model.

use std::time::Duration;

use thiserror::Error;

use reimburse_core::DomainError;

/// Failure reported by a collaborator (persistence, blob storage, identity).
///
/// These are **infrastructure errors** as opposed to domain errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id} already exists")]
    Duplicate { kind: &'static str, id: String },

    /// The caller-supplied timeout elapsed before the collaborator answered.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: String, after: Duration },

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Error surfaced by engine operations.
///
/// Every variant carries a stable machine-readable [`code`](EngineError::code).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("malformed payload: {0}")]
    Format(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The requested action is not in the transition table for the current status.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The record changed between read and update; re-fetch and retry.
    #[error("stale state: expected '{expected}', found '{actual}'")]
    StaleState { expected: String, actual: String },

    /// A collaborator timed out. Nothing is retried automatically.
    #[error("retryable: {0}")]
    Retryable(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    /// A saga step failed and so did its compensating action.
    #[error("compensation failed: {compensation} (after: {cause})")]
    CompensationFailed { cause: String, compensation: String },
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::Format(_) => "format_error",
            EngineError::Permission(_) => "permission_error",
            EngineError::NotFound(_) => "not_found",
            EngineError::InvalidTransition(_) => "invalid_transition",
            EngineError::StaleState { .. } => "stale_state",
            EngineError::Retryable(_) => "retryable",
            EngineError::Persistence(_) => "persistence_error",
            EngineError::CompensationFailed { .. } => "compensation_failed",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn not_found(kind: &str, id: impl core::fmt::Display) -> Self {
        Self::NotFound(format!("{kind} {id}"))
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => EngineError::Validation(msg),
            DomainError::Format(msg) => EngineError::Format(msg),
            DomainError::Permission(msg) => EngineError::Permission(msg),
            DomainError::InvariantViolation(msg) => EngineError::InvalidTransition(msg),
            DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::NotFound => EngineError::NotFound("record".to_string()),
            DomainError::Conflict(msg) => EngineError::StaleState {
                expected: msg,
                actual: "changed".to_string(),
            },
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { kind, id } => EngineError::NotFound(format!("{kind} {id}")),
            StoreError::Timeout { .. } => EngineError::Retryable(value.to_string()),
            StoreError::Duplicate { .. } | StoreError::Backend(_) => {
                EngineError::Persistence(value.to_string())
            }
        }
    }
}

impl From<reimburse_auth::AuthzError> for EngineError {
    fn from(value: reimburse_auth::AuthzError) -> Self {
        EngineError::Permission(value.to_string())
    }
}
