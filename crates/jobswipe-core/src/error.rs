//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Owner type string was neither user nor company
    #[error("Invalid owner type: {value} (expected user or company)")]
    InvalidOwnerType { value: String },

    /// Identifier could not be parsed as a UUID
    #[error("Invalid {field}: {value} (expected UUID)")]
    InvalidIdentifier { field: String, value: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
