//! # Error Types
//!
//! Domain-specific error types for kirana-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kirana-core errors (this file)                                        │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  kirana-db errors (separate crate)                                     │
//! │  └── DbError          - Local store operation failures                 │
//! │                                                                         │
//! │  kirana-sync errors (separate crate)                                   │
//! │  └── SyncError        - Remote delivery / listener failures            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError / SyncError → UI shell    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product id, customer id, etc.)
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or domain logic failures.
/// They should be caught and translated to user-friendly messages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A mutation-log collection name that the engine does not know.
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// A mutation-log action that the engine does not know.
    #[error("Unknown mutation action: {0}")]
    UnknownAction(String),

    /// A mutation payload could not be encoded for transmission.
    #[error("Payload encoding failed: {0}")]
    PayloadEncoding(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when user input doesn't meet requirements. Used for early
/// validation before any local write happens.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// The cart has no items.
    #[error("Cart is empty")]
    EmptyCart,

    /// The cart has exceeded the maximum allowed items.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// A line-item total does not equal qty × price.
    #[error("Line total mismatch for {product_id}: expected {expected}, got {got}")]
    LineTotalMismatch {
        product_id: String,
        expected: i64,
        got: i64,
    },

    /// Credit payment requires an attributed customer.
    #[error("Credit payment requires a customer")]
    CreditWithoutCustomer,
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::UnknownCollection("invoices".to_string());
        assert_eq!(err.to_string(), "Unknown collection: invoices");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::EmptyCart;
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
