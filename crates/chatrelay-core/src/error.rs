//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
///
/// Session transitions never fail; this covers conversions at the edges
/// of the domain, such as building an [`Identity`](crate::Identity) from
/// a partial sign-in payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required identity field was absent or empty
    #[error("Missing {field} in user info")]
    MissingField { field: &'static str },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
