//! # Error Types
//!
//! Domain-specific error types for storefront-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  storefront-core errors (this file)                                    │
//! │  ├── CoreError        - Business rule failures                         │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── ErrorKind        - Taxonomy every layer reports against           │
//! │                                                                         │
//! │  storefront-engine errors                                              │
//! │  └── EngineError      - CoreError or StoreError                        │
//! │                                                                         │
//! │  storefront-db errors                                                  │
//! │  └── DbError          - SQLite failures (converted to StoreError)      │
//! │                                                                         │
//! │  CLI errors (in app)                                                   │
//! │  └── ApiError         - What the caller sees (serialized)              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → ApiError → Caller   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (cart id, product id, stock)
//! 3. Errors are enum variants, never String
//! 4. Every variant maps onto exactly one [`ErrorKind`]

use serde::Serialize;
use thiserror::Error;

use crate::types::FailedLine;

// =============================================================================
// Error Kind
// =============================================================================

/// The failure taxonomy surfaced to callers.
///
/// `Conflict` and `Store` are never produced by this crate; they exist so the
/// engine and the application can classify persistence failures on the same
/// scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed input shape or value.
    Validation,
    /// Cart, product, line or ticket absent.
    NotFound,
    /// Requested quantity exceeds current stock.
    InsufficientStock,
    /// Checkout attempted on a cart with zero lines.
    EmptyCart,
    /// Checkout found no line it could purchase.
    NoPurchasableItems,
    /// Caller lacks the admin capability.
    Forbidden,
    /// Concurrent modification detected by the store.
    Conflict,
    /// Persistence backend failure.
    Store,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations. They are local,
/// recoverable conditions and should be translated to caller-facing messages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Cart cannot be found.
    #[error("Cart not found: {0}")]
    CartNotFound(String),

    /// Product cannot be found in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// The cart has no line for the given product.
    #[error("Product {product_id} is not in cart {cart_id}")]
    LineNotFound { cart_id: String, product_id: String },

    /// Ticket cannot be found.
    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    /// Product exists but is deactivated.
    #[error("Product {0} is not available for sale")]
    ProductUnavailable(String),

    /// Requested quantity exceeds the stock visible right now.
    ///
    /// ## User Workflow
    /// ```text
    /// Add to Cart (qty: 5)
    ///      │
    ///      ▼
    /// Check stock: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id, available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Caller shows: "Only 3 in stock"
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Checkout on a cart without lines.
    #[error("Cart {0} is empty")]
    EmptyCart(String),

    /// Checkout could not purchase a single line.
    ///
    /// The cart is left untouched; `failed` explains every line.
    #[error("Cart {cart_id} has no purchasable items ({} lines failed)", .failed.len())]
    NoPurchasableItems {
        cart_id: String,
        failed: Vec<FailedLine>,
    },

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Admin-only operation invoked without the capability.
    #[error("Operation '{action}' requires admin rights")]
    Forbidden { action: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::CartNotFound(_)
            | CoreError::ProductNotFound(_)
            | CoreError::LineNotFound { .. }
            | CoreError::TicketNotFound(_) => ErrorKind::NotFound,
            CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            CoreError::EmptyCart(_) => ErrorKind::EmptyCart,
            CoreError::NoPurchasableItems { .. } => ErrorKind::NoPurchasableItems,
            CoreError::Forbidden { .. } => ErrorKind::Forbidden,
            CoreError::ProductUnavailable(_)
            | CoreError::CartTooLarge { .. }
            | CoreError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Creates a Forbidden error for an admin action.
    pub fn forbidden(action: impl Into<String>) -> Self {
        CoreError::Forbidden {
            action: action.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before any store is consulted.
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

    /// Invalid format (e.g., invalid code or id).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., duplicate product code).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
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
    use crate::types::FailureReason;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for p-1: available 3, requested 5"
        );
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
    }

    #[test]
    fn test_no_purchasable_items_message_counts_failures() {
        let err = CoreError::NoPurchasableItems {
            cart_id: "c-1".to_string(),
            failed: vec![FailedLine {
                product_id: "p-1".to_string(),
                quantity: 2,
                reason: FailureReason::ProductMissing,
            }],
        };
        assert_eq!(err.to_string(), "Cart c-1 has no purchasable items (1 lines failed)");
        assert_eq!(err.kind(), ErrorKind::NoPurchasableItems);
    }

    #[test]
    fn test_not_found_kinds() {
        assert_eq!(CoreError::CartNotFound("c".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            CoreError::LineNotFound {
                cart_id: "c".into(),
                product_id: "p".into()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(CoreError::EmptyCart("c".into()).kind(), ErrorKind::EmptyCart);
        assert_eq!(CoreError::forbidden("delete_product").kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "code".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.kind(), ErrorKind::Validation);
    }
}
