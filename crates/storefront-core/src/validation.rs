//! # Validation Module
//!
//! Input validation for the storefront.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller boundary (storefront-cli)                             │
//! │  └── Shape validation (JSON deserialization)                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engines (storefront-engine)                                  │
//! │  └── THIS MODULE: value rules, before any store is touched             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (price range, stock >= 0, quantity >= 1)                    │
//! │  └── UNIQUE (products.code)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use storefront_core::validation::{validate_product_code, validate_quantity};
//!
//! assert!(validate_product_code("MATE-01").is_ok());
//! assert!(validate_quantity(5).is_ok());
//! ```

use crate::error::ValidationError;
use crate::MAX_PRICE_CENTS;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn require_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a product code.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, numbers, hyphens and underscores only
///
/// Case is not checked here; codes are upper-cased on the way in.
///
/// ## Example
/// ```rust
/// use storefront_core::validation::validate_product_code;
///
/// assert!(validate_product_code("mate-01").is_ok());
/// assert!(validate_product_code("").is_err());
/// assert!(validate_product_code("has space").is_err());
/// ```
pub fn validate_product_code(code: &str) -> ValidationResult<()> {
    require_text("code", code, 50)?;

    if !code
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a product title (1..=200 characters).
pub fn validate_product_title(title: &str) -> ValidationResult<()> {
    require_text("title", title, 200)
}

/// Validates a product description (1..=2000 characters).
pub fn validate_description(description: &str) -> ValidationResult<()> {
    require_text("description", description, 2000)
}

/// Validates a category name (1..=100 characters).
pub fn validate_category(category: &str) -> ValidationResult<()> {
    require_text("category", category, 100)
}

/// Validates a purchaser reference (e-mail or user id).
pub fn validate_purchaser(purchaser: &str) -> ValidationResult<()> {
    require_text("purchaser", purchaser, 254)
}

/// Validates a search query.
///
/// ## Rules
/// - Can be empty (no filtering)
/// - Maximum 100 characters
///
/// ## Returns
/// The trimmed query string.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "search".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// Only positivity is checked here. The upper bound is the product's stock,
/// which the engine checks against the store.
///
/// ## Flow
/// ```text
/// add_line(cart, product, qty)
///      │
///      ▼
/// validate_quantity(qty) ← THIS FUNCTION
///      │
///      ├── qty <= 0?  → MustBePositive
///      └── OK → stock check
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates a price in cents (0..=MAX_PRICE_CENTS).
///
/// ## Example
/// ```rust
/// use storefront_core::validation::validate_price_cents;
/// use storefront_core::MAX_PRICE_CENTS;
///
/// assert!(validate_price_cents(1099).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// assert!(validate_price_cents(MAX_PRICE_CENTS + 1).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a stock level. Zero is allowed; negative never is.
pub fn validate_stock(stock: i64) -> ValidationResult<()> {
    if stock < 0 {
        return Err(ValidationError::OutOfRange {
            field: "stock".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates an entity id (product or cart).
///
/// Ids are opaque to the engine: any non-empty string of at most 64
/// characters without whitespace is accepted, so UUIDs and seeded
/// human-readable ids both pass.
///
/// ## Example
/// ```rust
/// use storefront_core::validation::validate_id;
///
/// assert!(validate_id("product_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_id("product_id", "").is_err());
/// assert!(validate_id("product_id", "a b").is_err());
/// ```
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > 64 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 64,
        });
    }

    if id.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
