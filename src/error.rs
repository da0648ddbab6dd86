//! Error types for the idea-refinement workflow.
//!
//! `WorkflowError` covers the four abort-classes that end a run early.
//! Everything else — a single provider call timing out, a malformed JSON
//! response, a rate limit on one batch — is recorded as a [`crate::state::FailureNote`]
//! on the affected candidate and the run continues.

use thiserror::Error;

/// Errors that abort the whole workflow run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("phase '{phase}' exceeded its global deadline")]
    Timeout { phase: &'static str },

    #[error("run was cancelled")]
    Cancelled,

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

/// Errors from a single provider-bound batch call. Recoverable: the caller
/// decides whether to retry, fall back to a partial result, or record a
/// [`crate::state::FailureNote`] and move on.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("permanent provider error: {0}")]
    Permanent(String),

    #[error("response could not be parsed: {0}")]
    Parse(String),

    #[error("batch call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl BatchError {
    /// Transient errors and timeouts are worth retrying; permanent and parse
    /// errors are not (retrying a malformed response yields the same response).
    pub fn is_retriable(&self) -> bool {
        matches!(self, BatchError::Transient(_) | BatchError::Timeout(_))
    }
}

/// Errors surfaced by a [`crate::provider::ModelProvider`] implementation.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("provider returned status {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("response body was not valid JSON: {0}")]
    InvalidResponse(String),
}

impl From<ProviderError> for BatchError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Request(msg) => BatchError::Transient(msg),
            ProviderError::BadStatus { status, body } if status >= 500 => {
                BatchError::Transient(format!("{status}: {body}"))
            }
            ProviderError::BadStatus { status, body } => {
                BatchError::Permanent(format!("{status}: {body}"))
            }
            ProviderError::InvalidResponse(msg) => BatchError::Parse(msg),
        }
    }
}
