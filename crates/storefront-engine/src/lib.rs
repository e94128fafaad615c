//! # storefront-engine: Cart and Checkout Workflows
//!
//! Business workflows over abstract stores. Nothing in this crate knows
//! which database (if any) sits behind the ports.
//!
//! ## Components
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌──────────────┐   ┌────────────────┐   ┌────────────────┐           │
//! │   │  CartEngine  │   │ CheckoutEngine │   │ CatalogService │           │
//! │   └──────┬───────┘   └───────┬────────┘   └───────┬────────┘           │
//! │          │                   │                    │                     │
//! │          ▼                   ▼                    ▼                     │
//! │   ┌─────────────────────────────────────────────────────────────┐      │
//! │   │  store ports: CatalogStore, CartStore, PurchaseSink, ...    │      │
//! │   └─────────────────────────────────────────────────────────────┘      │
//! │          │                                                              │
//! │          ▼                                                              │
//! │   memory (tests)  |  storefront-db (SQLite)                            │
//! │                                                                         │
//! │   After every commit: EventObserver::notify(StorefrontEvent)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//! - [`store`] - Port traits
//! - [`cart`] - Stock-aware cart mutation
//! - [`checkout`] - Partition, conditional decrement, ticket
//! - [`catalog`] - Admin product operations and listing
//! - [`events`] - Observer hook and broadcast fan-out
//! - [`memory`] - In-memory store implementations
//! - [`error`] - `StoreError` and `EngineError`

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod error;
pub mod events;
pub mod memory;
pub mod store;

#[cfg(test)]
mod testing;

pub use cart::CartEngine;
pub use catalog::CatalogService;
pub use checkout::{CheckoutEngine, CheckoutOutcome};
pub use error::{EngineError, EngineResult, StoreError, StoreResult};
pub use events::{BroadcastObserver, EventObserver, NoopObserver, StorefrontEvent};
pub use store::{CartStore, CatalogAdminStore, CatalogStore, PurchaseSink};
