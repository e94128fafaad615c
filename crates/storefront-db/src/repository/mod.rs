//! # Repository Module
//!
//! SQLite implementations of the engine's store ports.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Engine port          Repository            Tables                     │
//! │  ───────────          ──────────            ──────                     │
//! │  CatalogStore    ┐                                                     │
//! │  CatalogAdminStore ─▶ ProductRepository ──▶ products                   │
//! │  CartStore       ──▶  CartRepository    ──▶ carts, cart_lines          │
//! │  PurchaseSink    ──▶  TicketRepository  ──▶ tickets, ticket_lines      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each repository has inherent methods returning [`DbResult`](crate::DbResult)
//! and a thin `#[async_trait]` impl that maps errors into `StoreError`.

pub mod cart;
pub mod product;
pub mod ticket;
