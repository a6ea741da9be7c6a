//! # Error Types
//!
//! Domain-specific error types for cartsync-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  cartsync-core errors (this file)                                      │
//! │  ├── CoreError        - Cart rule violations                           │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  cartsync-store errors (separate crate)                                │
//! │  └── StoreError       - Local persistence failures                     │
//! │                                                                         │
//! │  cartsync-engine errors                                                │
//! │  └── EngineError      - What subscribers see                           │
//! │                                                                         │
//! │  Flow: CoreError / ValidationError → EngineError → Subscriber          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Cart rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The product has no line in the current cart.
    #[error("Product {0} is not in the cart")]
    ItemNotFound(String),

    /// Item quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },
}

/// Input validation errors.
///
/// Raised before any storage or network work starts, so a rejected call
/// never touches published state.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g. characters that cannot appear in a URL path).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
