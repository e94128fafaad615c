//! # Domain Types
//!
//! Catalog and purchase types used throughout the storefront.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │ PurchaseResult  │   │   FailedLine    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  ticket_code    │   │  product_id     │       │
//! │  │  code (unique)  │   │  purchaser      │   │  quantity       │       │
//! │  │  price_cents    │   │  total_cents    │   │  reason         │       │
//! │  │  stock          │   │  purchased[]    │   └─────────────────┘       │
//! │  └─────────────────┘   │  failed[]       │                             │
//! │                        └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Products have:
//! - `id`: UUID v4 - immutable, used by carts and tickets
//! - `code`: business identifier, upper-case, unique, editable by admins

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::validation::{
    validate_category, validate_description, validate_price_cents, validate_product_code,
    validate_product_title, validate_search_query, validate_stock,
};

/// Largest page a catalog listing may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

// =============================================================================
// Product
// =============================================================================

/// A product in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Business code, stored upper-case, unique across the catalog.
    pub code: String,

    /// Display title.
    pub title: String,

    /// Long description.
    pub description: String,

    /// Price in cents (smallest currency unit). Never negative.
    pub price_cents: i64,

    /// Units available. Never negative.
    pub stock: i64,

    /// Category used for filtering.
    pub category: String,

    /// Whether the product can be sold.
    pub is_active: bool,

    /// Image URLs.
    pub thumbnails: Vec<String>,

    /// When the product was created.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// When the product was last updated.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Checks if `quantity` units could be taken from current stock.
    #[inline]
    pub fn has_stock_for(&self, quantity: i64) -> bool {
        self.stock >= quantity
    }

    /// Advisory check used by cart mutations.
    ///
    /// ## Returns
    /// - `Err(ProductUnavailable)` when the product is deactivated
    /// - `Err(InsufficientStock)` when `quantity` exceeds current stock
    pub fn ensure_sellable(&self, quantity: i64) -> CoreResult<()> {
        if !self.is_active {
            return Err(CoreError::ProductUnavailable(self.id.clone()));
        }

        if !self.has_stock_for(quantity) {
            return Err(CoreError::InsufficientStock {
                product_id: self.id.clone(),
                available: self.stock,
                requested: quantity,
            });
        }

        Ok(())
    }
}

/// Input for creating a product (admin only).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub code: String,
    pub price_cents: i64,
    pub stock: i64,
    pub category: String,
    #[serde(default)]
    pub thumbnails: Vec<String>,
    /// Defaults to active when omitted.
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl NewProduct {
    /// Validates every field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_product_title(&self.title)?;
        validate_description(&self.description)?;
        validate_product_code(&self.code)?;
        validate_price_cents(self.price_cents)?;
        validate_stock(self.stock)?;
        validate_category(&self.category)?;
        Ok(())
    }

    /// Builds the product record with the given identity.
    ///
    /// The code is normalised to upper-case so uniqueness is case-insensitive.
    pub fn into_product(self, id: String, now: DateTime<Utc>) -> Product {
        Product {
            id,
            code: normalize_code(&self.code),
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            price_cents: self.price_cents,
            stock: self.stock,
            category: self.category.trim().to_string(),
            is_active: self.is_active.unwrap_or(true),
            thumbnails: self.thumbnails,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial product update (admin only). `None` keeps the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProductUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
    pub price_cents: Option<i64>,
    pub stock: Option<i64>,
    pub category: Option<String>,
    pub thumbnails: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

impl ProductUpdate {
    /// Validates the fields that are present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            validate_product_title(title)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        if let Some(code) = &self.code {
            validate_product_code(code)?;
        }
        if let Some(price) = self.price_cents {
            validate_price_cents(price)?;
        }
        if let Some(stock) = self.stock {
            validate_stock(stock)?;
        }
        if let Some(category) = &self.category {
            validate_category(category)?;
        }
        Ok(())
    }

    /// Returns the normalised new code, if the update changes it.
    pub fn normalized_code(&self) -> Option<String> {
        self.code.as_deref().map(normalize_code)
    }

    /// Applies the update onto `product`.
    pub fn apply(self, product: &mut Product, now: DateTime<Utc>) {
        if let Some(code) = self.normalized_code() {
            product.code = code;
        }
        if let Some(title) = self.title {
            product.title = title.trim().to_string();
        }
        if let Some(description) = self.description {
            product.description = description.trim().to_string();
        }
        if let Some(price) = self.price_cents {
            product.price_cents = price;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(category) = self.category {
            product.category = category.trim().to_string();
        }
        if let Some(thumbnails) = self.thumbnails {
            product.thumbnails = thumbnails;
        }
        if let Some(active) = self.is_active {
            product.is_active = active;
        }
        product.updated_at = now;
    }
}

/// Upper-cases and trims a product code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

// =============================================================================
// Catalog Listing
// =============================================================================

/// Sort order for catalog listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PriceSort {
    Asc,
    Desc,
}

/// Filters and paging for catalog listings.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct ProductQuery {
    /// Free text matched against title, description and category.
    pub search: Option<String>,
    /// Exact category.
    pub category: Option<String>,
    /// Active flag filter.
    pub is_active: Option<bool>,
    /// Price ordering; insertion order when absent.
    pub sort: Option<PriceSort>,
    /// 1-based page.
    pub page: u32,
    /// Page size.
    pub limit: u32,
}

impl Default for ProductQuery {
    fn default() -> Self {
        ProductQuery {
            search: None,
            category: None,
            is_active: None,
            sort: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl ProductQuery {
    /// Validates paging bounds and the search text.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page == 0 {
            return Err(ValidationError::MustBePositive {
                field: "page".to_string(),
            });
        }

        if self.limit == 0 || self.limit > MAX_PAGE_LIMIT {
            return Err(ValidationError::OutOfRange {
                field: "limit".to_string(),
                min: 1,
                max: MAX_PAGE_LIMIT as i64,
            });
        }

        if let Some(search) = &self.search {
            validate_search_query(search)?;
        }

        Ok(())
    }

    /// Rows to skip for the requested page.
    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1) * self.limit
    }

    /// Checks whether a product passes the filters (used by in-memory stores).
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(category) = &self.category {
            if &product.category != category {
                return false;
            }
        }

        if let Some(active) = self.is_active {
            if product.is_active != active {
                return false;
            }
        }

        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                product.title.to_lowercase().contains(&term)
                    || product.description.to_lowercase().contains(&term)
                    || product.category.to_lowercase().contains(&term)
            }
            _ => true,
        }
    }
}

/// One page of a catalog listing.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total_docs: u64,
    pub total_pages: u32,
    pub page: u32,
    pub limit: u32,
    pub has_prev_page: bool,
    pub has_next_page: bool,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
}

impl ProductPage {
    /// Builds the paging metadata around one page of products.
    pub fn new(products: Vec<Product>, total_docs: u64, page: u32, limit: u32) -> Self {
        let limit = limit.max(1);
        let total_pages = (total_docs.div_ceil(limit as u64) as u32).max(1);
        let has_prev_page = page > 1;
        let has_next_page = page < total_pages;

        ProductPage {
            products,
            total_docs,
            total_pages,
            page,
            limit,
            has_prev_page,
            has_next_page,
            prev_page: has_prev_page.then(|| page - 1),
            next_page: has_next_page.then(|| page + 1),
        }
    }
}

// =============================================================================
// Purchase
// =============================================================================

/// Why a cart line could not be purchased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export)]
pub enum FailureReason {
    /// Stock was already short when the cart was validated.
    InsufficientStock { available: i64 },
    /// Another checkout took the stock between validation and decrement.
    StockChanged { available: i64 },
    /// The product was deleted from the catalog.
    ProductMissing,
    /// The product was deactivated.
    ProductUnavailable,
    /// The line's amount could not be represented in the ticket total.
    AmountTooLarge,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::InsufficientStock { available } => {
                write!(f, "insufficient stock: {} available", available)
            }
            FailureReason::StockChanged { available } => {
                write!(f, "stock changed during checkout: {} available", available)
            }
            FailureReason::ProductMissing => write!(f, "product no longer exists in the catalog"),
            FailureReason::ProductUnavailable => write!(f, "product is no longer available"),
            FailureReason::AmountTooLarge => write!(f, "amount exceeds the purchase limit"),
        }
    }
}

/// A cart line left behind by checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FailedLine {
    pub product_id: String,
    pub quantity: i64,
    pub reason: FailureReason,
}

impl FailedLine {
    /// Human-readable reason, e.g. "insufficient stock: 3 available".
    pub fn message(&self) -> String {
        self.reason.to_string()
    }
}

/// A cart line that was charged.
/// Uses the snapshot pattern: title and price are frozen at decrement time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PurchasedLine {
    pub product_id: String,
    pub title: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
}

impl PurchasedLine {
    /// Snapshots `product` for `quantity` units.
    ///
    /// The line total saturates; checkout reserves headroom so it never does.
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        PurchasedLine {
            product_id: product.id.clone(),
            title: product.title.clone(),
            unit_price_cents: product.price_cents,
            quantity,
            line_total_cents: product.price().multiply_quantity(quantity).cents(),
        }
    }

    /// Returns the line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

/// The outcome of a checkout; persisted as the purchase ticket.
///
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PurchaseResult {
    /// Unique ticket code.
    pub ticket_code: String,
    /// Cart the purchase came from.
    pub cart_id: String,
    /// Purchaser reference (e-mail or user id).
    pub purchaser: String,
    /// Sum of price × quantity over purchased lines.
    pub total_cents: i64,
    pub purchased: Vec<PurchasedLine>,
    pub failed: Vec<FailedLine>,
    #[ts(as = "String")]
    pub purchased_at: DateTime<Utc>,
}

impl PurchaseResult {
    /// Builds a ticket, deriving the total from `purchased`.
    pub fn new(
        ticket_code: String,
        cart_id: String,
        purchaser: String,
        purchased: Vec<PurchasedLine>,
        failed: Vec<FailedLine>,
        purchased_at: DateTime<Utc>,
    ) -> Self {
        let total: Money = purchased.iter().map(PurchasedLine::line_total).sum();

        PurchaseResult {
            ticket_code,
            cart_id,
            purchaser,
            total_cents: total.cents(),
            purchased,
            failed,
            purchased_at,
        }
    }

    /// Returns the total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// True when some lines stayed in the cart.
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
