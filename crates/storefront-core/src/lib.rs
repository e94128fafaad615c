//! # storefront-core: Pure Domain Logic for the Storefront
//!
//! This crate is the **heart** of the storefront backend. It holds the
//! domain types and every rule that can be decided without touching a store.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storefront Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Caller boundary (storefront-cli)                │   │
//! │  │        add_line, set_line_quantity, purchase, create_product    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            storefront-engine (CartEngine, CheckoutEngine)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ storefront-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   cart    │  │ validation│  │   │
//! │  │   │  Product  │  │   Money   │  │   Cart    │  │   rules   │  │   │
//! │  │   │  Purchase │  │  totals   │  │ CartLine  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Catalog and purchase types (Product, PurchaseResult, etc.)
//! - [`cart`] - Cart document and its line rules
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types and the error kind taxonomy
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use storefront_core::money::Money;
//!
//! let price = Money::from_cents(1099); // $10.99
//! let line_total = price.multiply_quantity(3);
//! assert_eq!(line_total.cents(), 3297);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartLine, CartOwner, CartView, CartViewLine};
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of distinct lines allowed in a single cart.
///
/// ## Business Reason
/// Prevents runaway carts and keeps checkout batches a reasonable size.
pub const MAX_CART_LINES: usize = 100;

/// Highest unit price a product may carry, in cents ($1,000,000,000.00).
///
/// Checkout reserves `quantity × MAX_PRICE_CENTS` of headroom per line before
/// decrementing, so totals at decrement-time prices always fit in an `i64`.
pub const MAX_PRICE_CENTS: i64 = 100_000_000_000;

/// Owner marker stored for carts created without a signed-in user.
pub const GUEST_OWNER: &str = "guest";
