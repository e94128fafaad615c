//! # storefront-db: SQLite Store for the Storefront
//!
//! Implements the store ports of `storefront-engine` on SQLite with sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storefront Data Flow                             │
//! │                                                                         │
//! │  CartEngine / CheckoutEngine / CatalogService                          │
//! │       │  (Arc<dyn CatalogStore>, Arc<dyn CartStore>, ...)              │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  storefront-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ ProductRepo    │   │ 001_init.sql │  │   │
//! │  │   │ SqlitePool    │◄───│ CartRepo       │   │              │  │   │
//! │  │   │               │    │ TicketRepo     │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (STOREFRONT_DB_PATH)                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Product, cart and ticket repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storefront_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("storefront.db")).await?;
//! let products = Arc::new(db.products());
//! let engine = CartEngine::new(products.clone(), Arc::new(db.carts()));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::cart::CartRepository;
pub use repository::product::ProductRepository;
pub use repository::ticket::TicketRepository;
