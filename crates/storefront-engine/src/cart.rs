//! # Cart Engine
//!
//! Keeps cart contents consistent with the stock visible at mutation time.
//!
//! ## Operation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_line(cart_id, product_id, qty)                                     │
//! │       │                                                                 │
//! │       ├── validate ids + qty ──────────────► Validation                 │
//! │       ├── CartStore::find_cart ────────────► NotFound                   │
//! │       ├── CatalogStore::find_product ──────► NotFound                   │
//! │       ├── stock >= existing + qty? ────────► InsufficientStock          │
//! │       ├── Cart::add_quantity (merge)                                    │
//! │       ├── CartStore::save_cart (version) ──► Conflict                   │
//! │       └── observer.notify(CartUpdated)                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock checks here are advisory. Nothing is reserved; checkout re-checks
//! with an atomic decrement.

use std::collections::HashMap;
use std::sync::Arc;

use storefront_core::cart::check_lines;
use storefront_core::validation::{validate_id, validate_quantity};
use storefront_core::{Cart, CartLine, CartOwner, CartView, CoreError, Product};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::events::{EventObserver, NoopObserver, StorefrontEvent};
use crate::store::{CartStore, CatalogStore};

/// Stock-aware cart mutations and reads.
#[derive(Clone)]
pub struct CartEngine {
    catalog: Arc<dyn CatalogStore>,
    carts: Arc<dyn CartStore>,
    observer: Arc<dyn EventObserver>,
}

impl CartEngine {
    pub fn new(catalog: Arc<dyn CatalogStore>, carts: Arc<dyn CartStore>) -> Self {
        CartEngine {
            catalog,
            carts,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Replaces the event observer.
    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observer = observer;
        self
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Creates a cart, optionally pre-populated.
    ///
    /// Initial lines get the same checks as [`CartEngine::replace_all_lines`];
    /// duplicates are merged.
    pub async fn create_cart(
        &self,
        owner: CartOwner,
        initial_lines: Vec<CartLine>,
    ) -> EngineResult<Cart> {
        let lines = self.validate_lines(initial_lines).await?;

        let mut cart = Cart::new(Uuid::new_v4().to_string(), owner);
        cart.lines = lines;
        cart.version = self.carts.save_cart(&cart).await?;

        info!(cart_id = %cart.id, owner = %cart.owner.as_str(), lines = cart.line_count(), "Cart created");
        self.observer.notify(StorefrontEvent::CartCreated {
            cart_id: cart.id.clone(),
            owner: cart.owner.as_str().to_string(),
        });

        Ok(cart)
    }

    /// Adds `quantity` units of a product, merging onto an existing line.
    pub async fn add_line(&self, cart_id: &str, product_id: &str, quantity: i64) -> EngineResult<Cart> {
        validate_id("cart_id", cart_id)?;
        validate_id("product_id", product_id)?;
        validate_quantity(quantity)?;

        let mut cart = self.load_cart(cart_id).await?;
        let product = self.load_product(product_id).await?;

        let combined = cart.quantity_of(product_id).saturating_add(quantity);
        product.ensure_sellable(combined)?;

        cart.add_quantity(product_id, quantity)?;
        self.commit(&mut cart).await?;

        debug!(cart_id = %cart_id, product_id = %product_id, quantity = %combined, "Line added");
        Ok(cart)
    }

    /// Replaces one line's quantity.
    pub async fn set_line_quantity(
        &self,
        cart_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> EngineResult<Cart> {
        validate_id("cart_id", cart_id)?;
        validate_id("product_id", product_id)?;
        validate_quantity(quantity)?;

        let mut cart = self.load_cart(cart_id).await?;
        if cart.line(product_id).is_none() {
            return Err(CoreError::LineNotFound {
                cart_id: cart_id.to_string(),
                product_id: product_id.to_string(),
            }
            .into());
        }

        let product = self.load_product(product_id).await?;
        product.ensure_sellable(quantity)?;

        cart.set_quantity(product_id, quantity)?;
        self.commit(&mut cart).await?;

        debug!(cart_id = %cart_id, product_id = %product_id, quantity = %quantity, "Line quantity set");
        Ok(cart)
    }

    /// Removes one line. A second call for the same product fails `NotFound`.
    pub async fn remove_line(&self, cart_id: &str, product_id: &str) -> EngineResult<Cart> {
        validate_id("cart_id", cart_id)?;
        validate_id("product_id", product_id)?;

        let mut cart = self.load_cart(cart_id).await?;
        cart.remove_line(product_id)?;
        self.commit(&mut cart).await?;

        debug!(cart_id = %cart_id, product_id = %product_id, "Line removed");
        Ok(cart)
    }

    /// Replaces every line, all-or-nothing.
    ///
    /// Every line is checked against the catalog before the store is touched.
    pub async fn replace_all_lines(&self, cart_id: &str, lines: Vec<CartLine>) -> EngineResult<Cart> {
        validate_id("cart_id", cart_id)?;

        let mut cart = self.load_cart(cart_id).await?;
        let lines = self.validate_lines(lines).await?;

        cart.replace_lines(lines)?;
        self.commit(&mut cart).await?;

        debug!(cart_id = %cart_id, lines = cart.line_count(), "Cart lines replaced");
        Ok(cart)
    }

    /// Empties the cart but keeps the record.
    pub async fn clear_cart(&self, cart_id: &str) -> EngineResult<Cart> {
        validate_id("cart_id", cart_id)?;

        let mut cart = self.load_cart(cart_id).await?;
        cart.clear();
        cart.version = self.carts.save_cart(&cart).await?;

        info!(cart_id = %cart_id, "Cart cleared");
        self.observer.notify(StorefrontEvent::CartCleared {
            cart_id: cart.id.clone(),
        });
        Ok(cart)
    }

    /// Removes the cart record entirely.
    pub async fn delete_cart(&self, cart_id: &str) -> EngineResult<()> {
        validate_id("cart_id", cart_id)?;

        if !self.carts.delete_cart(cart_id).await? {
            return Err(CoreError::CartNotFound(cart_id.to_string()).into());
        }

        info!(cart_id = %cart_id, "Cart deleted");
        self.observer.notify(StorefrontEvent::CartDeleted {
            cart_id: cart_id.to_string(),
        });
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_cart(&self, cart_id: &str) -> EngineResult<Cart> {
        validate_id("cart_id", cart_id)?;
        self.load_cart(cart_id).await
    }

    /// The cart joined with current product details.
    pub async fn cart_view(&self, cart_id: &str) -> EngineResult<CartView> {
        let cart = self.get_cart(cart_id).await?;

        let mut products: HashMap<String, Product> = HashMap::with_capacity(cart.line_count());
        for line in &cart.lines {
            if let Some(product) = self.catalog.find_product(&line.product_id).await? {
                products.insert(line.product_id.clone(), product);
            }
        }

        Ok(CartView::build(&cart, |id| products.get(id)))
    }

    pub async fn list_carts(&self) -> EngineResult<Vec<Cart>> {
        Ok(self.carts.list_carts().await?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load_cart(&self, cart_id: &str) -> EngineResult<Cart> {
        self.carts
            .find_cart(cart_id)
            .await?
            .ok_or_else(|| CoreError::CartNotFound(cart_id.to_string()).into())
    }

    async fn load_product(&self, product_id: &str) -> EngineResult<Product> {
        self.catalog
            .find_product(product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()).into())
    }

    /// Checks id format, limits, existence and stock for a whole line set.
    async fn validate_lines(&self, lines: Vec<CartLine>) -> EngineResult<Vec<CartLine>> {
        for line in &lines {
            validate_id("product_id", &line.product_id)?;
        }

        let merged = check_lines(lines)?;

        for line in &merged {
            let product = self.load_product(&line.product_id).await?;
            product.ensure_sellable(line.quantity)?;
        }

        Ok(merged)
    }

    async fn commit(&self, cart: &mut Cart) -> EngineResult<()> {
        cart.version = self.carts.save_cart(cart).await?;

        self.observer.notify(StorefrontEvent::CartUpdated {
            cart_id: cart.id.clone(),
            version: cart.version,
            line_count: cart.line_count(),
        });
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
