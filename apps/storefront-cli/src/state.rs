//! # Application State
//!
//! One set of engines wired to one database and one event feed.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database ─┬─ products() ──► Arc<ProductRepository> ─┬─► CartEngine     │
//! │            │                                         ├─► CheckoutEngine │
//! │            │                                         └─► CatalogService │
//! │            ├─ carts()    ──► Arc<CartRepository> ────┬─► CartEngine     │
//! │            │                                         └─► CheckoutEngine │
//! │            └─ tickets()  ──► Arc<TicketRepository> ──┬─► CheckoutEngine │
//! │                                                      └─► ticket lookups │
//! │                                                                         │
//! │  Arc<BroadcastObserver> shared by all three engines                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use storefront_db::{Database, TicketRepository};
use storefront_engine::{BroadcastObserver, CartEngine, CatalogService, CheckoutEngine};

use crate::config::StorefrontConfig;

pub struct AppState {
    pub db: Database,
    pub carts: CartEngine,
    pub checkout: CheckoutEngine,
    pub catalog: CatalogService,
    pub tickets: Arc<TicketRepository>,
    pub events: Arc<BroadcastObserver>,
    pub config: StorefrontConfig,
}

impl AppState {
    pub fn new(db: Database, config: StorefrontConfig) -> Self {
        let products = Arc::new(db.products());
        let cart_store = Arc::new(db.carts());
        let tickets = Arc::new(db.tickets());
        let events = Arc::new(BroadcastObserver::new(config.event_buffer));

        AppState {
            carts: CartEngine::new(products.clone(), cart_store.clone())
                .with_observer(events.clone()),
            checkout: CheckoutEngine::new(products.clone(), cart_store, tickets.clone())
                .with_observer(events.clone()),
            catalog: CatalogService::new(products).with_observer(events.clone()),
            tickets,
            events,
            config,
            db,
        }
    }

    /// Whether `token` grants catalog administration.
    pub fn is_admin(&self, token: Option<&str>) -> bool {
        self.config.is_admin(token)
    }
}
