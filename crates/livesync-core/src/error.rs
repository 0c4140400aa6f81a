//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A remote view session was requested without an origin
    #[error("remote view session request is missing an origin")]
    MissingOrigin,

    /// Direction value not understood
    #[error("Invalid direction: {value} (expected both, to-browser or to-editor)")]
    InvalidDirection { value: String },

    /// Required field absent from incoming data
    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
