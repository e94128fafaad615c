//! # Event Hook
//!
//! Engines call an [`EventObserver`] after a mutation has been committed.
//! The observer decides the transport; [`BroadcastObserver`] fans events out
//! on a tokio broadcast channel for any number of live subscribers.
//!
//! ```text
//! CartEngine ─┐
//! Checkout   ─┼──► EventObserver::notify ──► broadcast::Sender ──► Receiver 1
//! Catalog    ─┘                                                 ──► Receiver n
//! ```

use serde::Serialize;
use storefront_core::Product;
use tokio::sync::broadcast;
use tracing::trace;

/// Default capacity of the broadcast channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// A committed change to a cart, a product or the stock level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorefrontEvent {
    #[serde(rename_all = "camelCase")]
    CartCreated { cart_id: String, owner: String },

    #[serde(rename_all = "camelCase")]
    CartUpdated {
        cart_id: String,
        version: i64,
        line_count: usize,
    },

    #[serde(rename_all = "camelCase")]
    CartCleared { cart_id: String },

    #[serde(rename_all = "camelCase")]
    CartDeleted { cart_id: String },

    #[serde(rename_all = "camelCase")]
    StockChanged { product_id: String, stock: i64 },

    #[serde(rename_all = "camelCase")]
    PurchaseCompleted {
        ticket_code: String,
        cart_id: String,
        total_cents: i64,
        purchased_lines: usize,
        failed_lines: usize,
    },

    ProductCreated { product: Product },

    ProductUpdated { product: Product },

    #[serde(rename_all = "camelCase")]
    ProductDeleted { product_id: String },
}

/// Receives events after commit. Must not block.
pub trait EventObserver: Send + Sync {
    fn notify(&self, event: StorefrontEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl EventObserver for NoopObserver {
    fn notify(&self, _event: StorefrontEvent) {}
}

/// Publishes events on a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    sender: broadcast::Sender<StorefrontEvent>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        BroadcastObserver { sender }
    }

    /// A new receiver that sees every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StorefrontEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastObserver {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl EventObserver for BroadcastObserver {
    fn notify(&self, event: StorefrontEvent) {
        // No receivers is not an error: nobody is watching the feed.
        if self.sender.send(event).is_err() {
            trace!("event dropped, no subscribers");
        }
    }
}
