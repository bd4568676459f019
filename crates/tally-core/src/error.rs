//! # Error Types
//!
//! Errors raised by pure domain code. Storage and engine errors live in
//! `tally-db` (`DbError`) and `tally-sync` (`SyncError`); a rejected payload
//! travels as `ValidationError` → `SyncError::Validation` → CLI / UI.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A category name outside the closed enumeration.
    ///
    /// ## When This Occurs
    /// - CLI argument or config value with a typo ("Fod")
    /// - A server payload using a category this client does not know
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before a record ever reaches the sync engine. The engine itself
/// assumes well-formed input and does not re-check.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., NaN amount, unparseable date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
