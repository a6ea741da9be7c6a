//! # Validation Module
//!
//! Input rules shared by the guest and remote backends.
//!
//! ## Where Validation Sits
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Storefront UI                                                │
//! │  └── Quantity steppers, disabled buttons                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: SyncEngine                                                   │
//! │  └── THIS MODULE: product id + quantity rules                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Shop API                                                     │
//! │  └── Stock, pricing, ownership                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use cartsync_core::validation::{validate_product_id, validate_quantity};
//!
//! validate_product_id("64f1c0ffee").unwrap();
//! validate_quantity(5).unwrap();
//! assert!(validate_quantity(1000).is_err());
//! ```

use crate::error::ValidationError;
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum product id length accepted by the engine.
pub const MAX_PRODUCT_ID_LEN: usize = 128;

/// Validates a product id.
///
/// ## Rules
/// - Must not be empty or whitespace
/// - At most 128 characters
/// - No `/`, `?`, `#` or whitespace: ids are placed in URL paths
///
/// ## Example
/// ```rust
/// use cartsync_core::validation::validate_product_id;
///
/// assert!(validate_product_id("64f1c0ffee").is_ok());
/// assert!(validate_product_id("").is_err());
/// assert!(validate_product_id("a/b").is_err());
/// ```
pub fn validate_product_id(product_id: &str) -> ValidationResult<()> {
    if product_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "product_id".to_string(),
        });
    }

    if product_id.len() > MAX_PRODUCT_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "product_id".to_string(),
            max: MAX_PRODUCT_ID_LEN,
        });
    }

    if product_id
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "product_id".to_string(),
            reason: "must not contain whitespace, '/', '?' or '#'".to_string(),
        });
    }

    Ok(())
}

/// Validates a quantity value.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// Note that `update_quantity` treats `qty < 1` as a silent no-op before it
/// ever gets here; this rule only rejects the ceiling for that path.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a unit price in cents.
///
/// Zero is allowed (free items); negative prices are not.
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}
