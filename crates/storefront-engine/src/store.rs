//! # Store Ports
//!
//! The only contracts the engines have with persistence.
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │  CatalogStore    │   │    CartStore     │   │  PurchaseSink    │
//! │  find_product    │   │  find_cart       │   │  record_purchase │
//! │  decrement_...   │   │  save_cart (CAS) │   └──────────────────┘
//! │  current_stock   │   │  delete_cart     │
//! └────────┬─────────┘   │  list_carts      │
//!          │             └──────────────────┘
//! ┌────────▼─────────┐
//! │ CatalogAdminStore│   insert / update / delete / find_by_code / list
//! └──────────────────┘
//! ```
//!
//! Implementations: `memory` (this crate) and `storefront-db` (SQLite).

use async_trait::async_trait;
use storefront_core::{Cart, Product, ProductQuery, PurchaseResult};

use crate::error::StoreResult;

/// Read access to products plus the atomic stock decrement.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Loads a product fresh from the store.
    async fn find_product(&self, id: &str) -> StoreResult<Option<Product>>;

    /// Atomically takes `quantity` units if, and only if, at least that many
    /// are in stock.
    ///
    /// Returns the product as it stands after the decrement, or `None` when
    /// the product is missing or the stock was short. A read-then-write pair
    /// is not an acceptable implementation.
    async fn decrement_stock_if_available(
        &self,
        id: &str,
        quantity: i64,
    ) -> StoreResult<Option<Product>>;

    /// Current stock, `None` when the product is missing.
    async fn current_stock(&self, id: &str) -> StoreResult<Option<i64>>;
}

/// Catalog writes, used by the admin-only catalog service.
#[async_trait]
pub trait CatalogAdminStore: CatalogStore {
    /// Inserts a new product. Fails with `StoreError::Duplicate` on a taken code.
    async fn insert_product(&self, product: &Product) -> StoreResult<()>;

    /// Overwrites an existing product. Returns false if it does not exist.
    async fn update_product(&self, product: &Product) -> StoreResult<bool>;

    /// Hard delete. Returns false if it did not exist.
    async fn delete_product(&self, id: &str) -> StoreResult<bool>;

    /// Looks a product up by its (upper-case) code.
    async fn find_by_code(&self, code: &str) -> StoreResult<Option<Product>>;

    /// One page of products plus the total matching count.
    async fn list_products(&self, query: &ProductQuery) -> StoreResult<(Vec<Product>, u64)>;
}

/// Cart persistence with optimistic versioning.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn find_cart(&self, id: &str) -> StoreResult<Option<Cart>>;

    /// Saves `cart` if the stored version still equals `cart.version`.
    ///
    /// A cart with version 0 is inserted and must not exist yet. Returns the
    /// new version; fails with `StoreError::Conflict` when the check fails.
    async fn save_cart(&self, cart: &Cart) -> StoreResult<i64>;

    /// Returns false if the cart did not exist.
    async fn delete_cart(&self, id: &str) -> StoreResult<bool>;

    /// Every cart, oldest first.
    async fn list_carts(&self) -> StoreResult<Vec<Cart>>;
}

/// Receives finished purchases (ticket persistence, notification).
#[async_trait]
pub trait PurchaseSink: Send + Sync {
    async fn record_purchase(&self, result: &PurchaseResult) -> StoreResult<()>;
}
