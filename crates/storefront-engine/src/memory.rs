//! In-memory store implementations.
//!
//! Same contracts as the SQLite repositories, used by engine tests and
//! anywhere a throwaway storefront is enough. Every method takes the lock
//! once, so the conditional decrement and the version check are atomic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use storefront_core::{Cart, PriceSort, Product, ProductQuery, PurchaseResult};
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::store::{CartStore, CatalogAdminStore, CatalogStore, PurchaseSink};

// =============================================================================
// Catalog
// =============================================================================

/// Products kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<Vec<Product>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-loaded with `products`.
    pub fn with_products(products: Vec<Product>) -> Self {
        InMemoryCatalog {
            products: Arc::new(RwLock::new(products)),
        }
    }

    /// Sets stock directly, bypassing the engines (simulates an admin edit).
    pub async fn set_stock(&self, id: &str, stock: i64) {
        if let Some(p) = self.products.write().await.iter_mut().find(|p| p.id == id) {
            p.stock = stock;
        }
    }

    /// Removes a product directly, bypassing the engines.
    pub async fn remove(&self, id: &str) {
        self.products.write().await.retain(|p| p.id != id);
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn find_product(&self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.products.read().await.iter().find(|p| p.id == id).cloned())
    }

    async fn decrement_stock_if_available(
        &self,
        id: &str,
        quantity: i64,
    ) -> StoreResult<Option<Product>> {
        let mut products = self.products.write().await;

        match products.iter_mut().find(|p| p.id == id) {
            Some(p) if p.stock >= quantity => {
                p.stock -= quantity;
                p.updated_at = chrono::Utc::now();
                Ok(Some(p.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn current_stock(&self, id: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .products
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.stock))
    }
}

#[async_trait]
impl CatalogAdminStore for InMemoryCatalog {
    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        let mut products = self.products.write().await;

        if products.iter().any(|p| p.code == product.code) {
            return Err(StoreError::Duplicate {
                field: "code".to_string(),
                value: product.code.clone(),
            });
        }
        if products.iter().any(|p| p.id == product.id) {
            return Err(StoreError::Duplicate {
                field: "id".to_string(),
                value: product.id.clone(),
            });
        }

        products.push(product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> StoreResult<bool> {
        let mut products = self.products.write().await;

        if products
            .iter()
            .any(|p| p.code == product.code && p.id != product.id)
        {
            return Err(StoreError::Duplicate {
                field: "code".to_string(),
                value: product.code.clone(),
            });
        }

        match products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => {
                *existing = product.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_product(&self, id: &str) -> StoreResult<bool> {
        let mut products = self.products.write().await;
        let before = products.len();
        products.retain(|p| p.id != id);
        Ok(products.len() < before)
    }

    async fn find_by_code(&self, code: &str) -> StoreResult<Option<Product>> {
        Ok(self
            .products
            .read()
            .await
            .iter()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn list_products(&self, query: &ProductQuery) -> StoreResult<(Vec<Product>, u64)> {
        let products = self.products.read().await;

        let mut matching: Vec<Product> =
            products.iter().filter(|p| query.matches(p)).cloned().collect();

        match query.sort {
            Some(PriceSort::Asc) => matching.sort_by_key(|p| p.price_cents),
            Some(PriceSort::Desc) => matching.sort_by_key(|p| std::cmp::Reverse(p.price_cents)),
            None => {}
        }

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .collect();

        Ok((page, total))
    }
}

// =============================================================================
// Carts
// =============================================================================

/// Carts keyed by id, with optional injected save conflicts for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStore {
    carts: Arc<RwLock<HashMap<String, Cart>>>,
    forced_conflicts: Arc<AtomicUsize>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` saves fail with `StoreError::Conflict`.
    pub fn force_conflicts(&self, n: usize) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    pub async fn cart_count(&self) -> usize {
        self.carts.read().await.len()
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn find_cart(&self, id: &str) -> StoreResult<Option<Cart>> {
        Ok(self.carts.read().await.get(id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> StoreResult<i64> {
        let mut carts = self.carts.write().await;

        if self.take_forced_conflict() {
            return Err(StoreError::Conflict(format!("cart {}", cart.id)));
        }

        let stored_version = carts.get(&cart.id).map(|c| c.version);
        let matches = match stored_version {
            None => cart.version == 0,
            Some(v) => v == cart.version,
        };
        if !matches {
            return Err(StoreError::Conflict(format!(
                "cart {} expected version {}, found {:?}",
                cart.id, cart.version, stored_version
            )));
        }

        let mut stored = cart.clone();
        stored.version = cart.version + 1;
        let version = stored.version;
        carts.insert(cart.id.clone(), stored);
        Ok(version)
    }

    async fn delete_cart(&self, id: &str) -> StoreResult<bool> {
        Ok(self.carts.write().await.remove(id).is_some())
    }

    async fn list_carts(&self) -> StoreResult<Vec<Cart>> {
        let mut carts: Vec<Cart> = self.carts.read().await.values().cloned().collect();
        carts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(carts)
    }
}

// =============================================================================
// Tickets
// =============================================================================

/// Collects recorded purchases; can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTicketSink {
    tickets: Arc<RwLock<Vec<PurchaseResult>>>,
    fail: Arc<AtomicBool>,
}

impl InMemoryTicketSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn tickets(&self) -> Vec<PurchaseResult> {
        self.tickets.read().await.clone()
    }
}

#[async_trait]
impl PurchaseSink for InMemoryTicketSink {
    async fn record_purchase(&self, result: &PurchaseResult) -> StoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("ticket sink offline".to_string()));
        }
        self.tickets.write().await.push(result.clone());
        Ok(())
    }
}
