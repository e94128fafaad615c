//! # Checkout Engine
//!
//! Turns a cart into a purchase ticket while honouring current stock.
//!
//! ## Purchase Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  purchase(cart_id, purchaser)                                           │
//! │                                                                         │
//! │  1. load cart ─────────────────────────────► NotFound / EmptyCart       │
//! │  2. PARTITION (read only)                                               │
//! │     for line in cart order:                                             │
//! │       find_product ── missing ──────────────► failed (ProductMissing)   │
//! │                    ── inactive ─────────────► failed (Unavailable)      │
//! │                    ── stock < qty ──────────► failed (InsufficientStock)│
//! │                    ── no total headroom ────► failed (AmountTooLarge)   │
//! │                    ── ok ───────────────────► purchasable               │
//! │     purchasable empty ─────────────────────► NoPurchasableItems         │
//! │  3. COMMIT (per line, independent)                                      │
//! │       decrement_stock_if_available ── None ─► failed (StockChanged)     │
//! │                                    ── Some ─► purchased @ current price │
//! │     purchased empty ───────────────────────► NoPurchasableItems         │
//! │  4. ticket ──► PurchaseSink (fire and forget)                           │
//! │  5. purchased quantities leave the cart (version-checked, retried)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Decrements are never rolled back. Once a line's stock is taken the line is
//! purchased, whatever happens to the later steps. Nothing after the first
//! decrement can fail: the partition reserves `quantity × MAX_PRICE_CENTS`
//! per line, so the ticket total fits at any price the catalog accepts.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use storefront_core::validation::{validate_id, validate_purchaser};
use storefront_core::{
    Cart, CartLine, CoreError, FailedLine, FailureReason, Money, Product, PurchaseResult,
    PurchasedLine, MAX_PRICE_CENTS,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{EngineResult, StoreError};
use crate::events::{EventObserver, NoopObserver, StorefrontEvent};
use crate::store::{CartStore, CatalogStore, PurchaseSink};

/// How many times the cart clean-up is retried after a version conflict.
pub const DEFAULT_SAVE_RETRIES: usize = 3;

/// What a successful checkout hands back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOutcome {
    /// The purchase ticket.
    pub ticket: PurchaseResult,
    /// The cart after clean-up: only failed lines remain.
    ///
    /// `None` if the cart disappeared or could not be saved; the purchase
    /// itself still stands.
    pub cart: Option<Cart>,
}

/// Validate-then-commit checkout.
#[derive(Clone)]
pub struct CheckoutEngine {
    catalog: Arc<dyn CatalogStore>,
    carts: Arc<dyn CartStore>,
    sink: Arc<dyn PurchaseSink>,
    observer: Arc<dyn EventObserver>,
    save_retries: usize,
}

impl CheckoutEngine {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        carts: Arc<dyn CartStore>,
        sink: Arc<dyn PurchaseSink>,
    ) -> Self {
        CheckoutEngine {
            catalog,
            carts,
            sink,
            observer: Arc::new(NoopObserver),
            save_retries: DEFAULT_SAVE_RETRIES,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_save_retries(mut self, retries: usize) -> Self {
        self.save_retries = retries;
        self
    }

    /// Purchases every line the current stock allows.
    ///
    /// ## Errors
    /// - `CartNotFound`, `EmptyCart` before anything is read from the catalog
    /// - `NoPurchasableItems` when no line could be decremented; the cart
    ///   and all stock levels are then unchanged by this call
    pub async fn purchase(&self, cart_id: &str, purchaser: &str) -> EngineResult<CheckoutOutcome> {
        validate_id("cart_id", cart_id)?;
        validate_purchaser(purchaser)?;

        let cart = self
            .carts
            .find_cart(cart_id)
            .await?
            .ok_or_else(|| CoreError::CartNotFound(cart_id.to_string()))?;

        if cart.is_empty() {
            return Err(CoreError::EmptyCart(cart_id.to_string()).into());
        }

        debug!(cart_id = %cart_id, lines = cart.line_count(), "Checkout started");

        // Phase 1: partition against fresh catalog reads.
        let mut failed: Vec<(usize, FailedLine)> = Vec::new();
        let mut purchasable: Vec<(usize, &CartLine)> = Vec::new();
        let mut headroom = Money::zero();

        for (position, line) in cart.lines.iter().enumerate() {
            let product = self.catalog.find_product(&line.product_id).await?;
            let product = match classify(line, product.as_ref()) {
                Ok(product) => product,
                Err(reason) => {
                    failed.push((position, failed_line(line, reason)));
                    continue;
                }
            };

            match line_headroom(line, product).and_then(|h| headroom.checked_add(h)) {
                Some(total) => {
                    headroom = total;
                    purchasable.push((position, line));
                }
                None => {
                    warn!(
                        cart_id = %cart_id,
                        product_id = %line.product_id,
                        quantity = line.quantity,
                        "Line amount exceeds the purchase limit"
                    );
                    failed.push((position, failed_line(line, FailureReason::AmountTooLarge)));
                }
            }
        }

        if purchasable.is_empty() {
            info!(cart_id = %cart_id, failed = failed.len(), "Nothing purchasable");
            return Err(no_purchasable(cart_id, failed));
        }

        // Phase 2: independent conditional decrements.
        let mut purchased: Vec<PurchasedLine> = Vec::with_capacity(purchasable.len());

        for (position, line) in purchasable {
            match self
                .catalog
                .decrement_stock_if_available(&line.product_id, line.quantity)
                .await?
            {
                Some(product) => {
                    self.observer.notify(StorefrontEvent::StockChanged {
                        product_id: product.id.clone(),
                        stock: product.stock,
                    });
                    purchased.push(PurchasedLine::from_product(&product, line.quantity));
                }
                None => {
                    let reason = match self.catalog.current_stock(&line.product_id).await? {
                        Some(available) => FailureReason::StockChanged { available },
                        None => FailureReason::ProductMissing,
                    };
                    warn!(
                        cart_id = %cart_id,
                        product_id = %line.product_id,
                        %reason,
                        "Stock decrement lost a race"
                    );
                    failed.push((position, failed_line(line, reason)));
                }
            }
        }

        if purchased.is_empty() {
            info!(cart_id = %cart_id, "Every decrement lost its race");
            return Err(no_purchasable(cart_id, failed));
        }

        failed.sort_by_key(|(position, _)| *position);
        let failed: Vec<FailedLine> = failed.into_iter().map(|(_, f)| f).collect();

        let ticket = PurchaseResult::new(
            Uuid::new_v4().to_string(),
            cart_id.to_string(),
            purchaser.to_string(),
            purchased,
            failed,
            Utc::now(),
        );

        if let Err(e) = self.sink.record_purchase(&ticket).await {
            warn!(ticket_code = %ticket.ticket_code, error = %e, "Failed to record purchase");
        }

        let cart = self.settle_cart(cart, &ticket).await;

        info!(
            ticket_code = %ticket.ticket_code,
            cart_id = %cart_id,
            total = %ticket.total(),
            purchased = ticket.purchased.len(),
            failed = ticket.failed.len(),
            "Purchase completed"
        );
        self.observer.notify(StorefrontEvent::PurchaseCompleted {
            ticket_code: ticket.ticket_code.clone(),
            cart_id: cart_id.to_string(),
            total_cents: ticket.total_cents,
            purchased_lines: ticket.purchased.len(),
            failed_lines: ticket.failed.len(),
        });

        Ok(CheckoutOutcome { ticket, cart })
    }

    /// Takes purchased quantities out of the cart, reloading after a conflict.
    async fn settle_cart(&self, mut cart: Cart, ticket: &PurchaseResult) -> Option<Cart> {
        let mut attempt = 0;

        loop {
            cart.deduct_purchased(&ticket.purchased);

            match self.carts.save_cart(&cart).await {
                Ok(version) => {
                    cart.version = version;
                    self.observer.notify(StorefrontEvent::CartUpdated {
                        cart_id: cart.id.clone(),
                        version,
                        line_count: cart.line_count(),
                    });
                    return Some(cart);
                }
                Err(StoreError::Conflict(detail)) if attempt < self.save_retries => {
                    attempt += 1;
                    debug!(cart_id = %cart.id, attempt, %detail, "Cart changed during checkout, reloading");

                    match self.carts.find_cart(&cart.id).await {
                        Ok(Some(fresh)) => cart = fresh,
                        Ok(None) => {
                            warn!(cart_id = %cart.id, "Cart deleted during checkout");
                            return None;
                        }
                        Err(e) => {
                            error!(cart_id = %cart.id, error = %e, "Failed to reload cart");
                            return None;
                        }
                    }
                }
                Err(e) => {
                    error!(cart_id = %cart.id, error = %e, "Failed to update cart after purchase");
                    return None;
                }
            }
        }
    }
}

/// Decides whether a line can be purchased right now.
fn classify<'a>(
    line: &CartLine,
    product: Option<&'a Product>,
) -> Result<&'a Product, FailureReason> {
    match product {
        None => Err(FailureReason::ProductMissing),
        Some(p) if !p.is_active => Err(FailureReason::ProductUnavailable),
        Some(p) if !p.has_stock_for(line.quantity) => {
            Err(FailureReason::InsufficientStock { available: p.stock })
        }
        Some(p) => Ok(p),
    }
}

/// Largest amount `line` can add to the ticket, whatever the price at
/// decrement time.
fn line_headroom(line: &CartLine, product: &Product) -> Option<Money> {
    let ceiling = Money::from_cents(product.price_cents.max(MAX_PRICE_CENTS));
    ceiling.checked_multiply_quantity(line.quantity)
}

fn failed_line(line: &CartLine, reason: FailureReason) -> FailedLine {
    FailedLine {
        product_id: line.product_id.clone(),
        quantity: line.quantity,
        reason,
    }
}

fn no_purchasable(cart_id: &str, mut failed: Vec<(usize, FailedLine)>) -> crate::error::EngineError {
    failed.sort_by_key(|(position, _)| *position);
    CoreError::NoPurchasableItems {
        cart_id: cart_id.to_string(),
        failed: failed.into_iter().map(|(_, f)| f).collect(),
    }
    .into()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartEngine;
    use crate::error::EngineError;
    use crate::memory::{InMemoryCartStore, InMemoryCatalog, InMemoryTicketSink};
    use crate::error::StoreResult;
    use crate::store::CatalogAdminStore;
    use crate::testing::product;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use storefront_core::{CartOwner, ErrorKind};

    struct Fixture {
        carts_engine: CartEngine,
        checkout: CheckoutEngine,
        catalog: InMemoryCatalog,
        carts: InMemoryCartStore,
        sink: InMemoryTicketSink,
    }

    fn fixture(products: Vec<Product>) -> Fixture {
        let catalog = InMemoryCatalog::with_products(products);
        let carts = InMemoryCartStore::new();
        let sink = InMemoryTicketSink::new();
        Fixture {
            carts_engine: CartEngine::new(Arc::new(catalog.clone()), Arc::new(carts.clone())),
            checkout: CheckoutEngine::new(
                Arc::new(catalog.clone()),
                Arc::new(carts.clone()),
                Arc::new(sink.clone()),
            ),
            catalog,
            carts,
            sink,
        }
    }

    async fn cart_with(f: &Fixture, lines: &[(&str, i64)]) -> Cart {
        let cart = f
            .carts_engine
            .create_cart(CartOwner::Guest, vec![])
            .await
            .unwrap();
        for (id, qty) in lines {
            f.carts_engine.add_line(&cart.id, id, *qty).await.unwrap();
        }
        f.carts_engine.get_cart(&cart.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_full_purchase_empties_cart() {
        let f = fixture(vec![product("a", 250, 5), product("b", 1000, 2)]);
        let cart = cart_with(&f, &[("a", 2), ("b", 1)]).await;

        let outcome = f.checkout.purchase(&cart.id, "buyer@example.com").await.unwrap();

        assert_eq!(outcome.ticket.total_cents, 1500);
        assert_eq!(outcome.ticket.purchased.len(), 2);
        assert!(outcome.ticket.failed.is_empty());
        assert!(outcome.cart.unwrap().is_empty());
        assert_eq!(f.catalog.current_stock("a").await.unwrap(), Some(3));
        assert_eq!(f.sink.tickets().await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_cart_fails() {
        let f = fixture(vec![product("a", 250, 5)]);
        let cart = cart_with(&f, &[]).await;

        let err = f.checkout.purchase(&cart.id, "buyer").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyCart);
        assert_eq!(f.catalog.current_stock("a").await.unwrap(), Some(5));
        assert!(f.sink.tickets().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_cart_fails_not_found() {
        let f = fixture(vec![]);
        let err = f.checkout.purchase("nope", "buyer").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_deleted_and_inactive_products_fail_per_line() {
        let f = fixture(vec![
            product("a", 100, 5),
            product("b", 100, 5),
            product("c", 100, 5),
        ]);
        let cart = cart_with(&f, &[("a", 1), ("b", 1), ("c", 1)]).await;

        f.catalog.remove("a").await;
        let mut c = f.catalog.find_product("c").await.unwrap().unwrap();
        c.is_active = false;
        CatalogAdminStore::update_product(&f.catalog, &c)
            .await
            .unwrap();

        let outcome = f.checkout.purchase(&cart.id, "buyer").await.unwrap();
        assert_eq!(outcome.ticket.purchased.len(), 1);
        assert_eq!(outcome.ticket.purchased[0].product_id, "b");
        assert_eq!(
            outcome
                .ticket
                .failed
                .iter()
                .map(|l| (l.product_id.as_str(), l.reason.clone()))
                .collect::<Vec<_>>(),
            vec![
                ("a", FailureReason::ProductMissing),
                ("c", FailureReason::ProductUnavailable)
            ]
        );

        let remaining = outcome.cart.unwrap();
        assert_eq!(
            remaining.lines,
            vec![CartLine::new("a", 1), CartLine::new("c", 1)]
        );
    }

    #[tokio::test]
    async fn test_nothing_purchasable_leaves_everything_untouched() {
        let f = fixture(vec![product("a", 100, 5)]);
        let cart = cart_with(&f, &[("a", 5)]).await;
        f.catalog.set_stock("a", 4).await;

        let err = f.checkout.purchase(&cart.id, "buyer").await.unwrap_err();
        match err {
            EngineError::Core(CoreError::NoPurchasableItems { failed, .. }) => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].reason, FailureReason::InsufficientStock { available: 4 });
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert_eq!(f.catalog.current_stock("a").await.unwrap(), Some(4));
        let stored = f.carts_engine.get_cart(&cart.id).await.unwrap();
        assert_eq!(stored, cart);
        assert!(f.sink.tickets().await.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_fail_checkout() {
        let f = fixture(vec![product("a", 100, 5)]);
        let cart = cart_with(&f, &[("a", 1)]).await;
        f.sink.set_fail(true);

        let outcome = f.checkout.purchase(&cart.id, "buyer").await.unwrap();
        assert_eq!(outcome.ticket.total_cents, 100);
        assert_eq!(f.catalog.current_stock("a").await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_cart_conflict_is_retried() {
        let f = fixture(vec![product("a", 100, 5), product("b", 100, 0)]);
        let cart = cart_with(&f, &[("a", 1)]).await;
        // Simulate a line added for "b" out of band so it fails at checkout.
        let mut raw = f.carts_engine.get_cart(&cart.id).await.unwrap();
        raw.lines.push(CartLine::new("b", 1));
        raw.version = f.carts.save_cart(&raw).await.unwrap();

        f.carts.force_conflicts(2);
        let outcome = f.checkout.purchase(&cart.id, "buyer").await.unwrap();

        let remaining = outcome.cart.unwrap();
        assert_eq!(remaining.lines, vec![CartLine::new("b", 1)]);
        assert_eq!(
            f.carts_engine.get_cart(&cart.id).await.unwrap().lines,
            vec![CartLine::new("b", 1)]
        );
    }

    #[tokio::test]
    async fn test_cart_conflicts_exhausted_still_returns_ticket() {
        let f = fixture(vec![product("a", 100, 5)]);
        let checkout = f.checkout.clone().with_save_retries(1);
        let cart = cart_with(&f, &[("a", 1)]).await;

        f.carts.force_conflicts(5);
        let outcome = checkout.purchase(&cart.id, "buyer").await.unwrap();
        assert!(outcome.cart.is_none());
        assert_eq!(outcome.ticket.purchased.len(), 1);
        assert_eq!(f.catalog.current_stock("a").await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_total_uses_price_at_decrement_time() {
        let f = fixture(vec![product("a", 100, 5)]);
        let cart = cart_with(&f, &[("a", 2)]).await;

        let mut a = f.catalog.find_product("a").await.unwrap().unwrap();
        a.price_cents = 175;
        CatalogAdminStore::update_product(&f.catalog, &a)
            .await
            .unwrap();

        let outcome = f.checkout.purchase(&cart.id, "buyer").await.unwrap();
        assert_eq!(outcome.ticket.total_cents, 350);
        assert_eq!(outcome.ticket.purchased[0].unit_price_cents, 175);
    }

    #[tokio::test]
    async fn test_line_total_overflow_fails_line_before_decrement() {
        let f = fixture(vec![product("gold", i64::MAX / 2, 10), product("a", 100, 5)]);
        let cart = cart_with(&f, &[("gold", 3), ("a", 1)]).await;

        let outcome = f.checkout.purchase(&cart.id, "buyer").await.unwrap();

        assert_eq!(outcome.ticket.total_cents, 100);
        assert_eq!(outcome.ticket.purchased.len(), 1);
        assert_eq!(outcome.ticket.failed.len(), 1);
        assert_eq!(outcome.ticket.failed[0].product_id, "gold");
        assert_eq!(outcome.ticket.failed[0].reason, FailureReason::AmountTooLarge);

        assert_eq!(f.catalog.current_stock("gold").await.unwrap(), Some(10));
        assert_eq!(f.catalog.current_stock("a").await.unwrap(), Some(4));
        assert_eq!(outcome.cart.unwrap().lines, vec![CartLine::new("gold", 3)]);
        assert_eq!(f.sink.tickets().await.len(), 1);
    }

    #[tokio::test]
    async fn test_only_overflowing_lines_is_nothing_purchasable() {
        let f = fixture(vec![product("gold", i64::MAX / 2, 10)]);
        let cart = cart_with(&f, &[("gold", 3)]).await;

        let err = f.checkout.purchase(&cart.id, "buyer").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoPurchasableItems);
        assert_eq!(f.catalog.current_stock("gold").await.unwrap(), Some(10));
        assert_eq!(f.carts_engine.get_cart(&cart.id).await.unwrap(), cart);
        assert!(f.sink.tickets().await.is_empty());
    }

    #[tokio::test]
    async fn test_price_at_the_ceiling_totals_exactly() {
        let f = fixture(vec![product("a", 100, 5_000)]);
        let cart = cart_with(&f, &[("a", 1_200)]).await;

        let mut a = f.catalog.find_product("a").await.unwrap().unwrap();
        a.price_cents = MAX_PRICE_CENTS;
        CatalogAdminStore::update_product(&f.catalog, &a).await.unwrap();

        let outcome = f.checkout.purchase(&cart.id, "buyer").await.unwrap();
        assert_eq!(outcome.ticket.total_cents, MAX_PRICE_CENTS * 1_200);
        assert_eq!(f.catalog.current_stock("a").await.unwrap(), Some(3_800));
    }

    /// Cart store that adds units to one line behind the engine's back on
    /// the first save, as a concurrent `add_line` would.
    struct RacingCartStore {
        inner: InMemoryCartStore,
        product_id: String,
        extra: i64,
        raced: AtomicBool,
    }

    #[async_trait]
    impl CartStore for RacingCartStore {
        async fn find_cart(&self, id: &str) -> StoreResult<Option<Cart>> {
            self.inner.find_cart(id).await
        }

        async fn save_cart(&self, cart: &Cart) -> StoreResult<i64> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                if let Some(mut stored) = self.inner.find_cart(&cart.id).await? {
                    for line in stored.lines.iter_mut() {
                        if line.product_id == self.product_id {
                            line.quantity += self.extra;
                        }
                    }
                    self.inner.save_cart(&stored).await?;
                }
            }
            self.inner.save_cart(cart).await
        }

        async fn delete_cart(&self, id: &str) -> StoreResult<bool> {
            self.inner.delete_cart(id).await
        }

        async fn list_carts(&self) -> StoreResult<Vec<Cart>> {
            self.inner.list_carts().await
        }
    }

    #[tokio::test]
    async fn test_units_added_during_checkout_stay_in_cart() {
        let f = fixture(vec![product("a", 100, 10), product("b", 100, 10)]);
        let cart = cart_with(&f, &[("a", 2), ("b", 1)]).await;

        let racing = RacingCartStore {
            inner: f.carts.clone(),
            product_id: "a".to_string(),
            extra: 3,
            raced: AtomicBool::new(false),
        };
        let checkout = CheckoutEngine::new(
            Arc::new(f.catalog.clone()),
            Arc::new(racing),
            Arc::new(f.sink.clone()),
        );

        let outcome = checkout.purchase(&cart.id, "buyer").await.unwrap();
        assert_eq!(outcome.ticket.purchased.len(), 2);
        assert_eq!(f.catalog.current_stock("a").await.unwrap(), Some(8));

        let expected = vec![CartLine::new("a", 3)];
        assert_eq!(outcome.cart.unwrap().lines, expected);
        assert_eq!(f.carts_engine.get_cart(&cart.id).await.unwrap().lines, expected);
    }

    #[test]
    fn test_classify() {
        let line = CartLine::new("a", 3);
        let mut p = product("a", 100, 2);
        assert_eq!(
            classify(&line, Some(&p)),
            Err(FailureReason::InsufficientStock { available: 2 })
        );
        p.stock = 3;
        assert_eq!(classify(&line, Some(&p)).map(|p| p.id.as_str()), Ok("a"));
        assert_eq!(classify(&line, None), Err(FailureReason::ProductMissing));
    }
}
